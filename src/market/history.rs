use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;

use crate::backtest::Granularity;
use crate::domain::{session, Quote};
use crate::error::{PivotError, Result};
use crate::market::holdings::HoldingsSnapshot;

/// Time-sliced quote history for a set of codes, with nearest-at-or-before
/// lookup. Series are kept sorted by timestamp.
#[derive(Debug, Clone, Default)]
pub struct HistoryFrame {
    series: HashMap<String, Vec<Quote>>,
}

impl HistoryFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, quote: Quote) {
        let series = self.series.entry(quote.code.clone()).or_default();
        // Appends are almost always in order; fall back to a sort position
        // otherwise.
        match series.last() {
            Some(last) if last.timestamp > quote.timestamp => {
                let idx = series.partition_point(|q| q.timestamp <= quote.timestamp);
                series.insert(idx, quote);
            }
            _ => series.push(quote),
        }
    }

    /// Latest quote at or before `ts`, restricted to the same exchange-local
    /// calendar date so one day's close never masquerades as the next day's
    /// quote.
    pub fn quote_at(&self, code: &str, ts: DateTime<Utc>) -> Option<&Quote> {
        let series = self.series.get(code)?;
        let idx = series.partition_point(|q| q.timestamp <= ts);
        let quote = series[..idx].last()?;
        let same_day = session::exchange_local(quote.timestamp).date_naive()
            == session::exchange_local(ts).date_naive();
        same_day.then_some(quote)
    }

    pub fn codes(&self) -> impl Iterator<Item = &String> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.series
            .get(code)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }
}

/// Bulk loader boundary for backtests. A backtest cannot start without
/// complete input data, so loaders report missing codes as hard errors.
#[async_trait]
pub trait HistoricalDataSource: Send + Sync {
    async fn load_quotes(
        &self,
        codes: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<HistoryFrame>;

    /// Snapshots relevant to the range: everything inside it plus the
    /// nearest snapshot on each side, so interpolation can bracket the
    /// boundary dates.
    async fn load_snapshots(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HoldingsSnapshot>>;
}

/// History backed by in-memory tables, fed from JSON fixture files or the
/// synthetic generator.
pub struct InMemoryHistory {
    frame: HistoryFrame,
    snapshots: Vec<HoldingsSnapshot>,
}

impl InMemoryHistory {
    pub fn new(frame: HistoryFrame, mut snapshots: Vec<HoldingsSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.date);
        Self { frame, snapshots }
    }

    /// Load `quotes.json` (array of quotes) and `snapshots.json` (array of
    /// holdings snapshots) from a fixture directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let quotes_raw = std::fs::read_to_string(dir.join("quotes.json"))
            .map_err(|e| PivotError::DataLoad(format!("quotes.json: {e}")))?;
        let quotes: Vec<Quote> = serde_json::from_str(&quotes_raw)
            .map_err(|e| PivotError::DataLoad(format!("quotes.json: {e}")))?;

        let snapshots_raw = std::fs::read_to_string(dir.join("snapshots.json"))
            .map_err(|e| PivotError::DataLoad(format!("snapshots.json: {e}")))?;
        let snapshots: Vec<HoldingsSnapshot> = serde_json::from_str(&snapshots_raw)
            .map_err(|e| PivotError::DataLoad(format!("snapshots.json: {e}")))?;

        let mut frame = HistoryFrame::new();
        for quote in quotes {
            frame.insert(quote);
        }
        Ok(Self::new(frame, snapshots))
    }

    /// Deterministic synthetic daily history for demos: a seeded random walk
    /// with occasional limit-up days for the securities.
    pub fn synthetic(
        securities: &[String],
        instruments: &[String],
        snapshots: Vec<HoldingsSnapshot>,
        start: NaiveDate,
        end: NaiveDate,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut frame = HistoryFrame::new();

        let mut prices: HashMap<String, f64> = HashMap::new();
        for code in securities.iter().chain(instruments) {
            prices.insert(code.clone(), rng.gen_range(5.0..80.0));
        }

        let mut day = start;
        while day <= end {
            if day.weekday().num_days_from_monday() < 5 {
                let ts = session_open(day);
                for code in securities {
                    let limit_up = rng.gen_bool(0.04);
                    let change = if limit_up {
                        10.0
                    } else {
                        rng.gen_range(-4.0..4.0)
                    };
                    let price = prices.get_mut(code).expect("seeded above");
                    *price *= 1.0 + change / 100.0;
                    frame.insert(synthetic_quote(code, *price, change, limit_up, ts));
                }
                for code in instruments {
                    let change = rng.gen_range(-2.0..2.0);
                    let price = prices.get_mut(code).expect("seeded above");
                    *price *= 1.0 + change / 100.0;
                    frame.insert(synthetic_quote(code, *price, change, false, ts));
                }
            }
            day += Duration::days(1);
        }

        Self::new(frame, snapshots)
    }
}

fn session_open(day: NaiveDate) -> DateTime<Utc> {
    let open = day.and_hms_opt(9, 30, 0).expect("static time is valid");
    match open.and_local_timezone(session::exchange_offset()) {
        chrono::LocalResult::Single(t) => t.with_timezone(&Utc),
        _ => Utc::now(),
    }
}

fn synthetic_quote(
    code: &str,
    price: f64,
    change_pct: f64,
    is_limit_up: bool,
    ts: DateTime<Utc>,
) -> Quote {
    Quote {
        code: code.to_string(),
        name: format!("Synthetic {code}"),
        price: Decimal::from_f64_retain(price).unwrap_or_default().round_dp(2),
        change_pct: Decimal::from_f64_retain(change_pct)
            .unwrap_or_default()
            .round_dp(2),
        is_limit_up,
        volume: Decimal::from(1_000_000u64),
        amount: Decimal::from(120_000_000u64),
        timestamp: ts,
    }
}

#[async_trait]
impl HistoricalDataSource for InMemoryHistory {
    async fn load_quotes(
        &self,
        codes: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _granularity: Granularity,
    ) -> Result<HistoryFrame> {
        let missing: Vec<String> = codes
            .iter()
            .filter(|code| !self.frame.has_code(code))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PivotError::DataLoad(format!(
                "no history for codes: {}",
                missing.join(", ")
            )));
        }

        let mut out = HistoryFrame::new();
        for code in codes {
            if let Some(series) = self.frame.series.get(code) {
                for quote in series {
                    if quote.timestamp >= start && quote.timestamp <= end {
                        out.insert(quote.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn load_snapshots(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HoldingsSnapshot>> {
        let mut out: Vec<HoldingsSnapshot> = Vec::new();
        // Last snapshot before the range, everything inside, first after.
        if let Some(before) = self
            .snapshots
            .iter()
            .filter(|s| s.date < start)
            .max_by_key(|s| s.date)
        {
            out.push(before.clone());
        }
        out.extend(
            self.snapshots
                .iter()
                .filter(|s| s.date >= start && s.date <= end)
                .cloned(),
        );
        if let Some(after) = self
            .snapshots
            .iter()
            .filter(|s| s.date > end)
            .min_by_key(|s| s.date)
        {
            out.push(after.clone());
        }
        Ok(out)
    }
}
