//! Historical replay: simulation clock, holdings interpolation, signal
//! recording, the backtest engine, and the asynchronous job lifecycle.

pub mod clock;
pub mod engine;
pub mod holdings_sim;
pub mod job;
pub mod recorder;

pub use clock::SimulationClock;
pub use engine::{BacktestEngine, BacktestReport, ProgressFn};
pub use holdings_sim::SnapshotSet;
pub use job::{JobCoordinator, JobRecord, JobStatus, JobView};
pub use recorder::{SignalRecorder, SignalStatistics};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PivotError, Result};

/// Tick spacing for the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    M5,
    M15,
    M30,
}

impl Granularity {
    /// Intraday step in minutes; `None` for daily.
    pub fn step_minutes(&self) -> Option<i64> {
        match self {
            Self::Daily => None,
            Self::M5 => Some(5),
            Self::M15 => Some(15),
            Self::M30 => Some(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            _ => None,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How point-in-time holdings are approximated between sparse snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMode {
    /// Continuous drift between the bracketing snapshots.
    #[default]
    Linear,
    /// Last-known-value: the earlier snapshot applies unchanged.
    Step,
}

/// Validated backtest parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
    /// Minimum holding weight for an instrument to be eligible.
    pub min_weight: Decimal,
    /// Evaluator preset name: standard / conservative / aggressive.
    pub evaluator: String,
    pub interpolation: InterpolationMode,
}

impl BacktestConfig {
    pub const MIN_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
        Some(d) => d,
        None => panic!("static date"),
    };
    pub const MAX_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2099, 12, 31) {
        Some(d) => d,
        None => panic!("static date"),
    };
    pub const MAX_SPAN_DAYS: i64 = 3653; // ten years, leap-inclusive

    /// Construct with exhaustive validation: every violation is reported,
    /// not just the first.
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        min_weight: Decimal,
        evaluator: String,
        interpolation: InterpolationMode,
    ) -> Result<Self> {
        let mut violations = Vec::new();

        if start > end {
            violations.push(format!("start {start} is after end {end}"));
        }
        if start < Self::MIN_DATE || start > Self::MAX_DATE {
            violations.push(format!("start {start} outside supported range"));
        }
        if end < Self::MIN_DATE || end > Self::MAX_DATE {
            violations.push(format!("end {end} outside supported range"));
        }
        if (end - start).num_days() > Self::MAX_SPAN_DAYS {
            violations.push(format!(
                "span {} days exceeds the 10-year limit",
                (end - start).num_days()
            ));
        }
        if min_weight < dec!(0.001) || min_weight > dec!(1.0) {
            violations.push(format!(
                "min_weight {min_weight} outside [0.001, 1.0]"
            ));
        }
        if !matches!(evaluator.as_str(), "standard" | "conservative" | "aggressive") {
            violations.push(format!(
                "unknown evaluator preset '{evaluator}' (available: standard, conservative, aggressive)"
            ));
        }

        if violations.is_empty() {
            Ok(Self {
                start,
                end,
                granularity,
                min_weight,
                evaluator,
                interpolation,
            })
        } else {
            Err(PivotError::InvalidBacktestConfig(violations))
        }
    }

    /// Range start as a UTC instant (exchange-local midnight).
    pub fn start_instant(&self) -> DateTime<Utc> {
        local_midnight(self.start)
    }

    /// Range end as a UTC instant (exchange-local end of day).
    pub fn end_instant(&self) -> DateTime<Utc> {
        local_midnight(self.end) + chrono::Duration::days(1)
    }
}

/// Exchange-local midnight of `date` as a UTC instant.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).expect("static time is valid");
    match crate::domain::session::exchange_offset().from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) => t.with_timezone(&Utc),
        // A fixed offset never yields ambiguous or missing local times.
        _ => Utc::now(),
    }
}
