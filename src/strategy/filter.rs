//! Signal filter chain.
//!
//! Filters run in configured order over a draft signal. The first required
//! filter that rejects short-circuits the pipeline with no signal; optional
//! rejections are collected as warnings on the emitted signal.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{CandidateInstrument, Confidence, MarketEvent, Quote, TradingSignal};
use crate::error::Result;
use crate::strategy::registry::StrategyParams;

/// Context the executor assembles for one filter pass: the chosen
/// instrument's current quote and the session clock.
pub struct FilterContext<'a> {
    /// `None` means outside a session / unknown; filters must not treat
    /// that as zero.
    pub seconds_to_close: Option<i64>,
    pub instrument_quote: &'a Quote,
}

/// Outcome of a single filter.
#[derive(Debug, Clone)]
pub struct FilterDecision {
    pub reject: bool,
    pub reason: String,
}

impl FilterDecision {
    pub fn pass() -> Self {
        Self {
            reject: false,
            reason: String::new(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            reject: true,
            reason: reason.into(),
        }
    }
}

/// Pluggable accept/reject check over a draft signal.
pub trait SignalFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Required filters block the signal on rejection; optional ones only
    /// attach a warning.
    fn is_required(&self) -> bool;

    fn filter(
        &self,
        ctx: &FilterContext<'_>,
        event: &MarketEvent,
        instrument: &CandidateInstrument,
        signal: &TradingSignal,
    ) -> FilterDecision;
}

/// Result of running the whole chain.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    /// `(filter name, reason)` of the required rejection, if any.
    pub rejected: Option<(String, String)>,
    /// Reasons from optional rejections, in chain order.
    pub warnings: Vec<String>,
}

/// Run filters in order; stop at the first required rejection.
pub fn run_chain(
    filters: &[Box<dyn SignalFilter>],
    ctx: &FilterContext<'_>,
    event: &MarketEvent,
    instrument: &CandidateInstrument,
    signal: &TradingSignal,
) -> ChainOutcome {
    let mut outcome = ChainOutcome::default();
    for filter in filters {
        let decision = filter.filter(ctx, event, instrument, signal);
        if !decision.reject {
            continue;
        }
        if filter.is_required() {
            outcome.rejected = Some((filter.name().to_string(), decision.reason));
            return outcome;
        }
        outcome
            .warnings
            .push(format!("{}: {}", filter.name(), decision.reason));
    }
    outcome
}

// ============================================================================
// Time to close
// ============================================================================

/// Rejects signals produced too close to the session close for an entry to
/// make sense. An unknown session clock passes.
pub struct TimeToCloseFilter {
    min_seconds: i64,
    required: bool,
}

impl TimeToCloseFilter {
    pub const DEFAULT_MIN_SECONDS: i64 = 1800;

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            min_seconds: params
                .integer("min_seconds")?
                .unwrap_or(Self::DEFAULT_MIN_SECONDS),
            required: params.boolean("required")?.unwrap_or(true),
        })
    }
}

impl Default for TimeToCloseFilter {
    fn default() -> Self {
        Self {
            min_seconds: Self::DEFAULT_MIN_SECONDS,
            required: true,
        }
    }
}

impl SignalFilter for TimeToCloseFilter {
    fn name(&self) -> &'static str {
        "time_to_close"
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn filter(
        &self,
        ctx: &FilterContext<'_>,
        _event: &MarketEvent,
        _instrument: &CandidateInstrument,
        _signal: &TradingSignal,
    ) -> FilterDecision {
        match ctx.seconds_to_close {
            Some(secs) if secs < self.min_seconds => FilterDecision::reject(format!(
                "{secs}s to close is under the {}s minimum",
                self.min_seconds
            )),
            _ => FilterDecision::pass(),
        }
    }
}

// ============================================================================
// Liquidity
// ============================================================================

/// Rejects instruments whose recent traded amount is unknown (<= 0) or
/// below the configured minimum.
pub struct LiquidityFilter {
    min_amount: Decimal,
    required: bool,
}

impl LiquidityFilter {
    pub const DEFAULT_MIN_AMOUNT: Decimal = dec!(50000000);

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            min_amount: params
                .decimal("min_amount")?
                .unwrap_or(Self::DEFAULT_MIN_AMOUNT),
            required: params.boolean("required")?.unwrap_or(true),
        })
    }
}

impl Default for LiquidityFilter {
    fn default() -> Self {
        Self {
            min_amount: Self::DEFAULT_MIN_AMOUNT,
            required: true,
        }
    }
}

impl SignalFilter for LiquidityFilter {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn filter(
        &self,
        ctx: &FilterContext<'_>,
        _event: &MarketEvent,
        _instrument: &CandidateInstrument,
        _signal: &TradingSignal,
    ) -> FilterDecision {
        let amount = ctx.instrument_quote.amount;
        if amount <= Decimal::ZERO {
            return FilterDecision::reject("traded amount unknown");
        }
        if amount < self.min_amount {
            return FilterDecision::reject(format!(
                "traded amount {amount} below minimum {}",
                self.min_amount
            ));
        }
        FilterDecision::pass()
    }
}

// ============================================================================
// Confidence
// ============================================================================

/// Optional: warns when the draft's confidence is below the minimum.
pub struct ConfidenceFilter {
    min_confidence: Confidence,
    required: bool,
}

impl ConfidenceFilter {
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        let min_confidence = match params.text("min_confidence")? {
            Some(raw) => Confidence::from_str(&raw).ok_or_else(|| {
                crate::error::PivotError::StrategyParam(format!(
                    "'min_confidence' must be low/medium/high, got '{raw}'"
                ))
            })?,
            None => Confidence::Medium,
        };
        Ok(Self {
            min_confidence,
            required: params.boolean("required")?.unwrap_or(false),
        })
    }
}

impl Default for ConfidenceFilter {
    fn default() -> Self {
        Self {
            min_confidence: Confidence::Medium,
            required: false,
        }
    }
}

impl SignalFilter for ConfidenceFilter {
    fn name(&self) -> &'static str {
        "confidence"
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn filter(
        &self,
        _ctx: &FilterContext<'_>,
        _event: &MarketEvent,
        _instrument: &CandidateInstrument,
        signal: &TradingSignal,
    ) -> FilterDecision {
        if signal.confidence < self.min_confidence {
            FilterDecision::reject(format!(
                "confidence {} below minimum {}",
                signal.confidence, self.min_confidence
            ))
        } else {
            FilterDecision::pass()
        }
    }
}

// ============================================================================
// Concentration
// ============================================================================

/// Optional: warns on overly concentrated instruments or holdings ranked
/// beyond the configured floor.
pub struct ConcentrationFilter {
    max_top10_ratio: Decimal,
    max_rank: i32,
    required: bool,
}

impl ConcentrationFilter {
    pub const DEFAULT_MAX_TOP10_RATIO: Decimal = dec!(0.70);
    pub const DEFAULT_MAX_RANK: i32 = 10;

    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self {
            max_top10_ratio: params
                .decimal("max_top10_ratio")?
                .unwrap_or(Self::DEFAULT_MAX_TOP10_RATIO),
            max_rank: params
                .integer("max_rank")?
                .map(|r| r as i32)
                .unwrap_or(Self::DEFAULT_MAX_RANK),
            required: params.boolean("required")?.unwrap_or(false),
        })
    }
}

impl Default for ConcentrationFilter {
    fn default() -> Self {
        Self {
            max_top10_ratio: Self::DEFAULT_MAX_TOP10_RATIO,
            max_rank: Self::DEFAULT_MAX_RANK,
            required: false,
        }
    }
}

impl SignalFilter for ConcentrationFilter {
    fn name(&self) -> &'static str {
        "concentration"
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn filter(
        &self,
        _ctx: &FilterContext<'_>,
        _event: &MarketEvent,
        instrument: &CandidateInstrument,
        _signal: &TradingSignal,
    ) -> FilterDecision {
        if instrument.top10_ratio > self.max_top10_ratio {
            return FilterDecision::reject(format!(
                "top-10 concentration {} exceeds {}",
                instrument.top10_ratio, self.max_top10_ratio
            ));
        }
        if instrument.has_known_rank() && instrument.rank > self.max_rank {
            return FilterDecision::reject(format!(
                "holding rank {} beyond floor {}",
                instrument.rank, self.max_rank
            ));
        }
        FilterDecision::pass()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, RiskLevel};
    use chrono::Utc;

    fn quote(amount: Decimal) -> Quote {
        Quote {
            code: "512880".to_string(),
            name: "Securities ETF".to_string(),
            price: dec!(1.02),
            change_pct: dec!(1.5),
            is_limit_up: false,
            volume: dec!(90000000),
            amount,
            timestamp: Utc::now(),
        }
    }

    fn instrument(top10_ratio: Decimal, rank: i32) -> CandidateInstrument {
        CandidateInstrument {
            code: "512880".to_string(),
            name: "Securities ETF".to_string(),
            weight: dec!(0.08),
            category: "industry".to_string(),
            rank,
            in_top10: rank <= 10 && rank > 0,
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

    fn draft(confidence: Confidence) -> TradingSignal {
        TradingSignal {
            id: "sig-1".to_string(),
            timestamp: Utc::now(),
            event_kind: EventKind::LimitUp,
            security_code: "600030".to_string(),
            security_name: "CITIC Securities".to_string(),
            security_price: dec!(25.30),
            change_pct: dec!(10.0),
            instrument_code: "512880".to_string(),
            instrument_name: "Securities ETF".to_string(),
            instrument_price: dec!(1.02),
            weight: dec!(0.08),
            weight_rank: 2,
            top10_ratio: dec!(0.55),
            confidence,
            risk: RiskLevel::Medium,
            rationale: String::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_time_to_close_unknown_session_passes() {
        let filter = TimeToCloseFilter::default();
        let q = quote(dec!(90000000));
        let ctx = FilterContext {
            seconds_to_close: None,
            instrument_quote: &q,
        };
        assert!(!filter
            .filter(&ctx, &event(), &instrument(dec!(0.5), 2), &draft(Confidence::Medium))
            .reject);

        let ctx = FilterContext {
            seconds_to_close: Some(900),
            instrument_quote: &q,
        };
        assert!(filter
            .filter(&ctx, &event(), &instrument(dec!(0.5), 2), &draft(Confidence::Medium))
            .reject);
    }

    #[test]
    fn test_liquidity_rejects_unknown_and_thin() {
        let filter = LiquidityFilter::default();
        let e = event();
        let i = instrument(dec!(0.5), 2);
        let s = draft(Confidence::Medium);

        for amount in [dec!(0), dec!(20000000)] {
            let q = quote(amount);
            let ctx = FilterContext {
                seconds_to_close: Some(7200),
                instrument_quote: &q,
            };
            assert!(filter.filter(&ctx, &e, &i, &s).reject);
        }

        let q = quote(dec!(90000000));
        let ctx = FilterContext {
            seconds_to_close: Some(7200),
            instrument_quote: &q,
        };
        assert!(!filter.filter(&ctx, &e, &i, &s).reject);
    }

    #[test]
    fn test_required_rejection_short_circuits_chain() {
        let filters: Vec<Box<dyn SignalFilter>> = vec![
            Box::new(LiquidityFilter::default()),
            Box::new(ConcentrationFilter::default()),
        ];
        let q = quote(dec!(0));
        let ctx = FilterContext {
            seconds_to_close: Some(7200),
            instrument_quote: &q,
        };
        // Concentration would warn too, but the chain stops at liquidity.
        let outcome = run_chain(
            &filters,
            &ctx,
            &event(),
            &instrument(dec!(0.9), 2),
            &draft(Confidence::Medium),
        );
        assert_eq!(outcome.rejected.as_ref().unwrap().0, "liquidity");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_optional_rejections_become_warnings() {
        let filters: Vec<Box<dyn SignalFilter>> = vec![
            Box::new(ConfidenceFilter {
                min_confidence: Confidence::High,
                required: false,
            }),
            Box::new(ConcentrationFilter::default()),
        ];
        let q = quote(dec!(90000000));
        let ctx = FilterContext {
            seconds_to_close: Some(7200),
            instrument_quote: &q,
        };
        let outcome = run_chain(
            &filters,
            &ctx,
            &event(),
            &instrument(dec!(0.85), 2),
            &draft(Confidence::Medium),
        );
        assert!(outcome.rejected.is_none());
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings[0].starts_with("confidence:"));
        assert!(outcome.warnings[1].starts_with("concentration:"));
    }

    #[test]
    fn test_concentration_rank_floor() {
        let filter = ConcentrationFilter::default();
        let q = quote(dec!(90000000));
        let ctx = FilterContext {
            seconds_to_close: Some(7200),
            instrument_quote: &q,
        };
        let e = event();
        let s = draft(Confidence::Medium);

        assert!(filter.filter(&ctx, &e, &instrument(dec!(0.5), 12), &s).reject);
        // Unknown rank is not beyond the floor.
        assert!(!filter
            .filter(&ctx, &e, &instrument(dec!(0.5), CandidateInstrument::UNKNOWN_RANK), &s)
            .reject);
    }
}
