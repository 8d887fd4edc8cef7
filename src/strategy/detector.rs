//! Event detectors.
//!
//! A detector turns a quote snapshot into an optional [`MarketEvent`]. The
//! dislocation band math (10%/20%/30% limit bands per board) is owned by the
//! quote source; detectors read the precomputed flag and auxiliary fields.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{MarketEvent, Quote};
use crate::error::Result;
use crate::strategy::registry::StrategyParams;

/// Pluggable event detector.
pub trait EventDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure detection from a single quote snapshot.
    fn detect(&self, quote: &Quote) -> Option<MarketEvent>;

    /// Secondary gate, independent of detection: an event that detects can
    /// still be dropped here (e.g. the change has faded below threshold).
    fn is_valid(&self, event: &MarketEvent) -> bool;
}

// ============================================================================
// Limit-up
// ============================================================================

/// Fires on quotes the source has flagged as limit-up.
pub struct LimitUpDetector {
    /// Minimum percentage change for validity, default 9.5.
    min_change_pct: Decimal,
}

impl LimitUpDetector {
    pub const DEFAULT_MIN_CHANGE_PCT: Decimal = dec!(9.5);

    pub fn new(min_change_pct: Decimal) -> Self {
        Self { min_change_pct }
    }

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self::new(
            params
                .decimal("min_change_pct")?
                .unwrap_or(Self::DEFAULT_MIN_CHANGE_PCT),
        ))
    }
}

impl Default for LimitUpDetector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_CHANGE_PCT)
    }
}

impl EventDetector for LimitUpDetector {
    fn name(&self) -> &'static str {
        "limit_up"
    }

    fn detect(&self, quote: &Quote) -> Option<MarketEvent> {
        if !quote.is_limit_up {
            return None;
        }
        Some(MarketEvent::LimitUp {
            code: quote.code.clone(),
            name: quote.name.clone(),
            price: quote.price,
            change_pct: quote.change_pct,
            limit_time: quote.timestamp,
            // The quote feed does not expose the buy-queue seal size; traded
            // amount stands in until it does.
            seal_amount: quote.amount,
        })
    }

    fn is_valid(&self, event: &MarketEvent) -> bool {
        event.change_pct() >= self.min_change_pct
    }
}

// ============================================================================
// Breakout
// ============================================================================

/// Fires on sharp single-day advances that have not yet sealed the board.
pub struct BreakoutDetector {
    min_change_pct: Decimal,
}

impl BreakoutDetector {
    pub const DEFAULT_MIN_CHANGE_PCT: Decimal = dec!(6.0);

    pub fn new(min_change_pct: Decimal) -> Self {
        Self { min_change_pct }
    }

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self::new(
            params
                .decimal("min_change_pct")?
                .unwrap_or(Self::DEFAULT_MIN_CHANGE_PCT),
        ))
    }
}

impl EventDetector for BreakoutDetector {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn detect(&self, quote: &Quote) -> Option<MarketEvent> {
        if quote.is_limit_up || quote.change_pct < self.min_change_pct {
            return None;
        }
        Some(MarketEvent::Breakout {
            code: quote.code.clone(),
            name: quote.name.clone(),
            price: quote.price,
            change_pct: quote.change_pct,
            ref_high: quote.price,
        })
    }

    fn is_valid(&self, event: &MarketEvent) -> bool {
        event.change_pct() >= self.min_change_pct
    }
}

// ============================================================================
// Momentum
// ============================================================================

/// Fires on fast moves inside a short observation window.
pub struct MomentumDetector {
    min_change_pct: Decimal,
    window_secs: i64,
}

impl MomentumDetector {
    pub const DEFAULT_MIN_CHANGE_PCT: Decimal = dec!(3.0);
    pub const DEFAULT_WINDOW_SECS: i64 = 300;

    pub fn new(min_change_pct: Decimal, window_secs: i64) -> Self {
        Self {
            min_change_pct,
            window_secs,
        }
    }

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self::new(
            params
                .decimal("min_change_pct")?
                .unwrap_or(Self::DEFAULT_MIN_CHANGE_PCT),
            params
                .integer("window_secs")?
                .unwrap_or(Self::DEFAULT_WINDOW_SECS),
        ))
    }
}

impl EventDetector for MomentumDetector {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn detect(&self, quote: &Quote) -> Option<MarketEvent> {
        if quote.change_pct < self.min_change_pct {
            return None;
        }
        Some(MarketEvent::Momentum {
            code: quote.code.clone(),
            name: quote.name.clone(),
            price: quote.price,
            change_pct: quote.change_pct,
            window_secs: self.window_secs,
        })
    }

    fn is_valid(&self, event: &MarketEvent) -> bool {
        event.change_pct() >= self.min_change_pct
    }
}

// ============================================================================
// Tests
// ============================================================================
