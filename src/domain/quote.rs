use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A point-in-time quote for a security or an ETF-like instrument.
///
/// The `is_limit_up` flag is precomputed by the quote source; the band math
/// (10%/20%/30% depending on board) lives with the source, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub price: Decimal,
    /// Percentage change against the previous close, e.g. `9.98` for +9.98%.
    pub change_pct: Decimal,
    pub is_limit_up: bool,
    /// Traded volume in shares/units.
    pub volume: Decimal,
    /// Traded amount in currency units.
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Whether the quote carries a usable traded amount for liquidity checks.
    pub fn has_liquidity_data(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_liquidity_data_flag() {
        let mut quote = Quote {
            code: "600519".to_string(),
            name: "Kweichow Moutai".to_string(),
            price: dec!(1750.00),
            change_pct: dec!(1.25),
            is_limit_up: false,
            volume: dec!(32000),
            amount: dec!(56000000),
            timestamp: Utc::now(),
        };
        assert!(quote.has_liquidity_data());

        quote.amount = Decimal::ZERO;
        assert!(!quote.has_liquidity_data());
    }
}
