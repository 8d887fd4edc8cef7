//! Instrument selectors.
//!
//! A selector picks one best candidate from the eligible set for an event.
//! Liquidity and premium inputs are not wired into the candidate model yet,
//! so the liquidity/premium policies fall back to the weight ranking.
//! TODO: rank by instrument turnover and NAV premium once the holdings
//! provider exposes them on `CandidateInstrument`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::instrument::sort_by_weight_desc;
use crate::domain::{CandidateInstrument, MarketEvent};
use crate::error::Result;
use crate::strategy::registry::StrategyParams;

/// Pluggable ranking policy over eligible instruments.
pub trait InstrumentSelector: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(
        &self,
        eligible: &[CandidateInstrument],
        event: &MarketEvent,
    ) -> Option<CandidateInstrument>;

    /// Human-readable rationale for picking `chosen`.
    fn reason(&self, chosen: &CandidateInstrument) -> String;
}

fn top_by_weight(eligible: &[CandidateInstrument]) -> Option<CandidateInstrument> {
    let mut ranked = eligible.to_vec();
    sort_by_weight_desc(&mut ranked);
    ranked.into_iter().next()
}

// ============================================================================
// Highest weight
// ============================================================================

pub struct HighestWeightSelector;

impl HighestWeightSelector {
    pub fn from_params(_params: &StrategyParams) -> Result<Self> {
        Ok(Self)
    }
}

impl InstrumentSelector for HighestWeightSelector {
    fn name(&self) -> &'static str {
        "highest_weight"
    }

    fn select(
        &self,
        eligible: &[CandidateInstrument],
        _event: &MarketEvent,
    ) -> Option<CandidateInstrument> {
        top_by_weight(eligible)
    }

    fn reason(&self, chosen: &CandidateInstrument) -> String {
        format!(
            "largest holding weight {:.2}% (rank {})",
            chosen.weight * dec!(100),
            chosen.rank
        )
    }
}

// ============================================================================
// Liquidity / premium placeholders
// ============================================================================

pub struct BestLiquiditySelector;

impl BestLiquiditySelector {
    pub fn from_params(_params: &StrategyParams) -> Result<Self> {
        Ok(Self)
    }
}

impl InstrumentSelector for BestLiquiditySelector {
    fn name(&self) -> &'static str {
        "best_liquidity"
    }

    fn select(
        &self,
        eligible: &[CandidateInstrument],
        _event: &MarketEvent,
    ) -> Option<CandidateInstrument> {
        top_by_weight(eligible)
    }

    fn reason(&self, chosen: &CandidateInstrument) -> String {
        format!(
            "weight-ranked pick at {:.2}% (liquidity inputs pending)",
            chosen.weight * dec!(100)
        )
    }
}

pub struct LowestPremiumSelector;

impl LowestPremiumSelector {
    pub fn from_params(_params: &StrategyParams) -> Result<Self> {
        Ok(Self)
    }
}

impl InstrumentSelector for LowestPremiumSelector {
    fn name(&self) -> &'static str {
        "lowest_premium"
    }

    fn select(
        &self,
        eligible: &[CandidateInstrument],
        _event: &MarketEvent,
    ) -> Option<CandidateInstrument> {
        top_by_weight(eligible)
    }

    fn reason(&self, chosen: &CandidateInstrument) -> String {
        format!(
            "weight-ranked pick at {:.2}% (premium inputs pending)",
            chosen.weight * dec!(100)
        )
    }
}

// ============================================================================
// Balanced
// ============================================================================

/// Weighted linear combination of normalized sub-scores. Only the weight
/// term has data behind it today; the other factors contribute zero until
/// their inputs exist.
pub struct BalancedSelector {
    weight_factor: Decimal,
    liquidity_factor: Decimal,
    premium_factor: Decimal,
}

impl BalancedSelector {
    pub fn new(
        weight_factor: Decimal,
        liquidity_factor: Decimal,
        premium_factor: Decimal,
    ) -> Self {
        Self {
            weight_factor,
            liquidity_factor,
            premium_factor,
        }
    }

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self::new(
            params.decimal("weight_factor")?.unwrap_or(dec!(0.5)),
            params.decimal("liquidity_factor")?.unwrap_or(dec!(0.3)),
            params.decimal("premium_factor")?.unwrap_or(dec!(0.2)),
        ))
    }

    fn score(&self, candidate: &CandidateInstrument, max_weight: Decimal) -> Decimal {
        let weight_score = if max_weight > Decimal::ZERO {
            candidate.weight / max_weight
        } else {
            Decimal::ZERO
        };
        let liquidity_score = Decimal::ZERO;
        let premium_score = Decimal::ZERO;

        weight_score * self.weight_factor
            + liquidity_score * self.liquidity_factor
            + premium_score * self.premium_factor
    }
}

impl InstrumentSelector for BalancedSelector {
    fn name(&self) -> &'static str {
        "balanced"
    }

    fn select(
        &self,
        eligible: &[CandidateInstrument],
        _event: &MarketEvent,
    ) -> Option<CandidateInstrument> {
        let max_weight = eligible.iter().map(|c| c.weight).max()?;
        eligible
            .iter()
            .max_by_key(|c| self.score(c, max_weight))
            .cloned()
    }

    fn reason(&self, chosen: &CandidateInstrument) -> String {
        format!(
            "balanced score on weight {:.2}% / rank {}",
            chosen.weight * dec!(100),
            chosen.rank
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(code: &str, weight: Decimal) -> CandidateInstrument {
        CandidateInstrument {
            code: code.to_string(),
            name: format!("ETF {code}"),
            weight,
            category: "industry".to_string(),
            rank: 1,
            in_top10: true,
            top10_ratio: dec!(0.5),
        }
    }

    fn event() -> MarketEvent {
        MarketEvent::LimitUp {
            code: "600030".to_string(),
            name: "CITIC Securities".to_string(),
            price: dec!(25.30),
            change_pct: dec!(10.0),
            limit_time: Utc::now(),
            seal_amount: dec!(80000000),
        }
    }

    #[test]
    fn test_highest_weight_picks_max() {
        let selector = HighestWeightSelector;
        let eligible = vec![
            candidate("a", dec!(0.08)),
            candidate("b", dec!(0.03)),
            candidate("c", dec!(0.05)),
        ];
        let chosen = selector.select(&eligible, &event()).unwrap();
        assert_eq!(chosen.code, "a");
        assert_eq!(chosen.weight, dec!(0.08));
    }

    #[test]
    fn test_empty_eligible_set_selects_nothing() {
        assert!(HighestWeightSelector.select(&[], &event()).is_none());
        assert!(BalancedSelector::new(dec!(0.5), dec!(0.3), dec!(0.2))
            .select(&[], &event())
            .is_none());
    }

    #[test]
    fn test_placeholder_selectors_match_weight_ranking() {
        let eligible = vec![candidate("a", dec!(0.04)), candidate("b", dec!(0.09))];
        let by_weight = HighestWeightSelector.select(&eligible, &event()).unwrap();
        let by_liquidity = BestLiquiditySelector.select(&eligible, &event()).unwrap();
        let by_premium = LowestPremiumSelector.select(&eligible, &event()).unwrap();
        assert_eq!(by_weight.code, by_liquidity.code);
        assert_eq!(by_weight.code, by_premium.code);
    }

    #[test]
    fn test_balanced_prefers_heavier_weight_today() {
        let selector = BalancedSelector::new(dec!(0.5), dec!(0.3), dec!(0.2));
        let eligible = vec![candidate("a", dec!(0.02)), candidate("b", dec!(0.07))];
        assert_eq!(selector.select(&eligible, &event()).unwrap().code, "b");
    }

    #[test]
    fn test_reason_mentions_weight() {
        let chosen = candidate("a", dec!(0.08));
        let reason = HighestWeightSelector.reason(&chosen);
        assert!(reason.contains("8.00%"));
    }
}
