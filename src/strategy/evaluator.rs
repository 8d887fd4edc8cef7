//! Signal evaluator.
//!
//! Assigns a (confidence, risk) pair through a fixed rule cascade. Later
//! rules may override earlier ones, so the order below is part of the
//! contract. Presets share the cascade and differ only in thresholds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::session::exchange_hour;
use crate::domain::{CandidateInstrument, Confidence, MarketEvent, RiskLevel};
use crate::error::{PivotError, Result};

/// Session inputs the cascade needs beyond event and instrument.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// `None` outside a session; rules treat that as "no information".
    pub seconds_to_close: Option<i64>,
    /// Evaluation wall-clock; exchange-local hour feeds the morning rule.
    pub now: DateTime<Utc>,
}

/// Threshold set for one evaluator preset.
#[derive(Debug, Clone)]
pub struct EvaluatorParams {
    pub high_weight: Decimal,
    pub low_weight: Decimal,
    pub high_rank: i32,
    pub low_rank: i32,
    pub high_risk_secs: i64,
    pub low_risk_secs: i64,
    pub concentration_limit: Decimal,
    pub morning_cutoff_hour: u32,
}

impl Default for EvaluatorParams {
    fn default() -> Self {
        Self {
            high_weight: dec!(0.10),
            low_weight: dec!(0.05),
            high_rank: 3,
            low_rank: 10,
            high_risk_secs: 600,
            low_risk_secs: 3600,
            concentration_limit: dec!(0.70),
            morning_cutoff_hour: 10,
        }
    }
}

/// Deterministic rule-cascade evaluator.
pub struct SignalEvaluator {
    preset: &'static str,
    params: EvaluatorParams,
}

impl SignalEvaluator {
    pub fn standard() -> Self {
        Self {
            preset: "standard",
            params: EvaluatorParams::default(),
        }
    }

    /// Tighter upgrades, earlier risk escalation.
    pub fn conservative() -> Self {
        Self {
            preset: "conservative",
            params: EvaluatorParams {
                high_weight: dec!(0.12),
                low_weight: dec!(0.06),
                high_rank: 2,
                low_rank: 8,
                high_risk_secs: 900,
                low_risk_secs: 5400,
                concentration_limit: dec!(0.60),
                morning_cutoff_hour: 10,
            },
        }
    }

    /// Looser upgrades, later risk escalation.
    pub fn aggressive() -> Self {
        Self {
            preset: "aggressive",
            params: EvaluatorParams {
                high_weight: dec!(0.08),
                low_weight: dec!(0.04),
                high_rank: 5,
                low_rank: 12,
                high_risk_secs: 300,
                low_risk_secs: 2700,
                concentration_limit: dec!(0.80),
                morning_cutoff_hour: 10,
            },
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "standard" => Ok(Self::standard()),
            "conservative" => Ok(Self::conservative()),
            "aggressive" => Ok(Self::aggressive()),
            other => Err(PivotError::StrategyParam(format!(
                "unknown evaluator preset '{other}' (available: standard, conservative, aggressive)"
            ))),
        }
    }

    pub fn preset_name(&self) -> &'static str {
        self.preset
    }

    pub fn with_params(preset: &'static str, params: EvaluatorParams) -> Self {
        Self { preset, params }
    }

    /// The cascade. Rule order matters; see module docs.
    pub fn evaluate(
        &self,
        ctx: &EvalContext,
        _event: &MarketEvent,
        instrument: &CandidateInstrument,
    ) -> (Confidence, RiskLevel) {
        let p = &self.params;

        // Rule 1: weight sets the baseline confidence.
        let mut confidence = Confidence::Medium;
        if instrument.weight >= p.high_weight {
            confidence = Confidence::High;
        } else if instrument.weight < p.low_weight {
            confidence = Confidence::Low;
        }

        // Rule 2: holding rank can upgrade or downgrade, when known. The
        // upgrade fires only from the Medium baseline: a weight verdict of
        // Low is final no matter how strong the rank.
        if instrument.has_known_rank() {
            if instrument.rank <= p.high_rank && confidence == Confidence::Medium {
                confidence = Confidence::High;
            } else if instrument.rank > p.low_rank {
                confidence = Confidence::Low;
            }
        }

        // Rule 3: time to close sets the baseline risk.
        let mut risk = RiskLevel::Medium;
        match ctx.seconds_to_close {
            Some(secs) if secs < p.high_risk_secs => risk = RiskLevel::High,
            Some(secs) if secs > p.low_risk_secs => risk = RiskLevel::Low,
            _ => {}
        }

        // Rule 4: concentration escalates risk one step.
        if instrument.top10_ratio > p.concentration_limit {
            risk = risk.escalate();
        }

        // Rule 5: early-morning signals get one step back, but only from
        // High.
        if exchange_hour(ctx.now) < p.morning_cutoff_hour && risk == RiskLevel::High {
            risk = RiskLevel::Medium;
        }

        (confidence, risk)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instrument(weight: Decimal, rank: i32, top10_ratio: Decimal) -> CandidateInstrument {
        CandidateInstrument {
            code: "512880".to_string(),
            name: "Securities ETF".to_string(),
            weight,
            category: "industry".to_string(),
            rank,
            in_top10: (1..=10).contains(&rank),
            top10_ratio,
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

    fn ctx_at_hour(hour: u32, seconds_to_close: Option<i64>) -> EvalContext {
        let now = crate::domain::session::exchange_offset()
            .with_ymd_and_hms(2024, 3, 4, hour, 15, 0)
            .unwrap()
            .with_timezone(&Utc);
        EvalContext {
            seconds_to_close,
            now,
        }
    }

    #[test]
    fn test_heavy_weight_top_rank_is_high_confidence() {
        let evaluator = SignalEvaluator::standard();
        let (confidence, _) = evaluator.evaluate(
            &ctx_at_hour(14, Some(2000)),
            &event(),
            &instrument(dec!(0.12), 1, dec!(0.5)),
        );
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn test_light_weight_is_low_regardless_of_rank() {
        let evaluator = SignalEvaluator::standard();
        // The rank upgrade fires only from Medium, so a Low weight verdict
        // holds even at rank 1.
        let (confidence, _) = evaluator.evaluate(
            &ctx_at_hour(14, Some(2000)),
            &event(),
            &instrument(dec!(0.03), 1, dec!(0.5)),
        );
        assert_eq!(confidence, Confidence::Low);
    }

    #[test]
    fn test_rank_upgrade_and_downgrade() {
        let evaluator = SignalEvaluator::standard();
        // Medium weight, strong rank: upgraded.
        let (confidence, _) = evaluator.evaluate(
            &ctx_at_hour(14, Some(2000)),
            &event(),
            &instrument(dec!(0.07), 2, dec!(0.5)),
        );
        assert_eq!(confidence, Confidence::High);

        // Medium weight, weak rank: downgraded.
        let (confidence, _) = evaluator.evaluate(
            &ctx_at_hour(14, Some(2000)),
            &event(),
            &instrument(dec!(0.07), 11, dec!(0.5)),
        );
        assert_eq!(confidence, Confidence::Low);

        // Unknown rank leaves the weight verdict alone.
        let (confidence, _) = evaluator.evaluate(
            &ctx_at_hour(14, Some(2000)),
            &event(),
            &instrument(dec!(0.07), CandidateInstrument::UNKNOWN_RANK, dec!(0.5)),
        );
        assert_eq!(confidence, Confidence::Medium);
    }

    #[test]
    fn test_time_to_close_sets_risk() {
        let evaluator = SignalEvaluator::standard();
        let i = instrument(dec!(0.07), 5, dec!(0.5));

        let (_, risk) = evaluator.evaluate(&ctx_at_hour(14, Some(300)), &event(), &i);
        assert_eq!(risk, RiskLevel::High);

        let (_, risk) = evaluator.evaluate(&ctx_at_hour(14, Some(7200)), &event(), &i);
        assert_eq!(risk, RiskLevel::Low);

        // Unknown session clock stays Medium.
        let (_, risk) = evaluator.evaluate(&ctx_at_hour(14, None), &event(), &i);
        assert_eq!(risk, RiskLevel::Medium);
    }

    #[test]
    fn test_concentration_escalates_one_step_only() {
        let evaluator = SignalEvaluator::standard();
        // Low baseline (plenty of time), concentrated instrument.
        let (_, risk) = evaluator.evaluate(
            &ctx_at_hour(14, Some(7200)),
            &event(),
            &instrument(dec!(0.07), 5, dec!(0.80)),
        );
        assert_eq!(risk, RiskLevel::Medium);

        // High baseline stays High.
        let (_, risk) = evaluator.evaluate(
            &ctx_at_hour(14, Some(120)),
            &event(),
            &instrument(dec!(0.07), 5, dec!(0.80)),
        );
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn test_morning_rule_only_softens_high() {
        let evaluator = SignalEvaluator::standard();
        let concentrated = instrument(dec!(0.07), 5, dec!(0.80));
        let plain = instrument(dec!(0.07), 5, dec!(0.5));

        // High at 09:xx becomes Medium.
        let (_, risk) = evaluator.evaluate(&ctx_at_hour(9, Some(120)), &event(), &plain);
        assert_eq!(risk, RiskLevel::Medium);

        // Medium at 09:xx is untouched.
        let (_, risk) = evaluator.evaluate(&ctx_at_hour(9, Some(2000)), &event(), &plain);
        assert_eq!(risk, RiskLevel::Medium);

        // Low at 09:xx is untouched.
        let (_, risk) = evaluator.evaluate(&ctx_at_hour(9, Some(7200)), &event(), &plain);
        assert_eq!(risk, RiskLevel::Low);

        // Escalated-to-High is also softened.
        let (_, risk) = evaluator.evaluate(&ctx_at_hour(9, Some(2000)), &event(), &concentrated);
        assert_eq!(risk, RiskLevel::Medium);
    }

    #[test]
    fn test_presets_share_the_cascade() {
        let i = instrument(dec!(0.09), 4, dec!(0.5));
        let ctx = ctx_at_hour(14, Some(2000));

        // 0.09 is High for aggressive (>= 0.08), Medium for standard,
        // Medium for conservative.
        let (c, _) = SignalEvaluator::aggressive().evaluate(&ctx, &event(), &i);
        assert_eq!(c, Confidence::High);
        let (c, _) = SignalEvaluator::standard().evaluate(&ctx, &event(), &i);
        assert_eq!(c, Confidence::Medium);
        let (c, _) = SignalEvaluator::conservative().evaluate(&ctx, &event(), &i);
        assert_eq!(c, Confidence::Medium);
    }

    #[test]
    fn test_unknown_preset_is_an_error() {
        assert!(SignalEvaluator::preset("bold").is_err());
        assert!(SignalEvaluator::preset("standard").is_ok());
    }
}
