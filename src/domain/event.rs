use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind discriminant for [`MarketEvent`], used in stats and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LimitUp,
    Breakout,
    Momentum,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LimitUp => "limit_up",
            Self::Breakout => "breakout",
            Self::Momentum => "momentum",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected price-dislocation event. Immutable once produced; one per
/// detection, discarded after the pipeline finishes with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketEvent {
    LimitUp {
        code: String,
        name: String,
        price: Decimal,
        change_pct: Decimal,
        /// When the security hit the band.
        limit_time: DateTime<Utc>,
        /// Amount locked on the buy side sealing the board.
        seal_amount: Decimal,
    },
    Breakout {
        code: String,
        name: String,
        price: Decimal,
        change_pct: Decimal,
        /// Reference high the price broke through.
        ref_high: Decimal,
    },
    Momentum {
        code: String,
        name: String,
        price: Decimal,
        change_pct: Decimal,
        /// Observation window that produced the move.
        window_secs: i64,
    },
}

impl MarketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LimitUp { .. } => EventKind::LimitUp,
            Self::Breakout { .. } => EventKind::Breakout,
            Self::Momentum { .. } => EventKind::Momentum,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::LimitUp { code, .. }
            | Self::Breakout { code, .. }
            | Self::Momentum { code, .. } => code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::LimitUp { name, .. }
            | Self::Breakout { name, .. }
            | Self::Momentum { name, .. } => name,
        }
    }

    pub fn price(&self) -> Decimal {
        match self {
            Self::LimitUp { price, .. }
            | Self::Breakout { price, .. }
            | Self::Momentum { price, .. } => *price,
        }
    }

    pub fn change_pct(&self) -> Decimal {
        match self {
            Self::LimitUp { change_pct, .. }
            | Self::Breakout { change_pct, .. }
            | Self::Momentum { change_pct, .. } => *change_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_accessors() {
        let event = MarketEvent::LimitUp {
            code: "300750".to_string(),
            name: "CATL".to_string(),
            price: dec!(210.50),
            change_pct: dec!(19.99),
            limit_time: Utc::now(),
            seal_amount: dec!(120000000),
        };
        assert_eq!(event.kind(), EventKind::LimitUp);
        assert_eq!(event.code(), "300750");
        assert_eq!(event.price(), dec!(210.50));
        assert_eq!(event.change_pct(), dec!(19.99));
    }
}
