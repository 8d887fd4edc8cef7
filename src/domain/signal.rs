use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::event::EventKind;

/// Ordinal confidence level assigned by the evaluator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal risk level assigned by the evaluator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// One-step escalation; High stays High.
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    /// One-step de-escalation; Low stays Low.
    pub fn deescalate(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buy recommendation for a substitute instrument, produced by the
/// pipeline for one dislocation event.
///
/// Immutable by convention: evaluation is applied through
/// [`TradingSignal::with_evaluation`], which returns a new record; nothing
/// mutates a signal in place after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    /// Globally unique id: sequence + timestamp + security code.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_kind: EventKind,

    // Event provenance
    pub security_code: String,
    pub security_name: String,
    pub security_price: Decimal,
    pub change_pct: Decimal,

    // Chosen instrument
    pub instrument_code: String,
    pub instrument_name: String,
    pub instrument_price: Decimal,
    /// Actual (re-validated) weight of the security in the instrument.
    pub weight: Decimal,
    /// Position within the instrument's top holdings; -1 when unknown.
    pub weight_rank: i32,
    pub top10_ratio: Decimal,

    // Evaluation
    pub confidence: Confidence,
    pub risk: RiskLevel,

    /// Human-readable selection rationale.
    pub rationale: String,
    /// Warnings accumulated from optional filters.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl TradingSignal {
    /// Functional replace of the evaluation fields; the draft stays intact.
    pub fn with_evaluation(&self, confidence: Confidence, risk: RiskLevel) -> Self {
        Self {
            confidence,
            risk,
            ..self.clone()
        }
    }

    /// Attach an optional-filter warning, returning the extended record.
    pub fn with_warning(mut self, warning: String) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Calendar date of the signal in exchange-local time; dedup key part.
    pub fn trade_date(&self) -> chrono::NaiveDate {
        super::session::exchange_local(self.timestamp).date_naive()
    }
}
