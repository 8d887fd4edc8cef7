//! Signal recording and run statistics.
//!
//! The recorder accumulates signals from one run with per-day dedup (at
//! most one signal per security per calendar date; later duplicates are
//! dropped, not merged) and keeps running counters so statistics come out
//! in O(1) per recorded signal.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::{session, Confidence, RiskLevel, TradingSignal};

#[derive(Debug, Default)]
pub struct SignalRecorder {
    signals: Vec<TradingSignal>,
    seen: HashSet<(String, NaiveDate)>,
    by_date: BTreeMap<NaiveDate, u64>,
    by_security: HashMap<String, u64>,
    by_instrument: HashMap<String, u64>,
    by_confidence: HashMap<Confidence, u64>,
    by_risk: HashMap<RiskLevel, u64>,
    dropped_duplicates: u64,
}

impl SignalRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch of signals stamped at `timestamp`. With `dedup` on,
    /// the key is (security, exchange-local calendar date): the first
    /// signal wins and later ones in the same day are dropped.
    pub fn record(
        &mut self,
        signals: Vec<TradingSignal>,
        timestamp: DateTime<Utc>,
        dedup: bool,
    ) -> usize {
        let date = session::exchange_local(timestamp).date_naive();
        let mut recorded = 0;
        for signal in signals {
            if dedup {
                let key = (signal.security_code.clone(), date);
                if !self.seen.insert(key) {
                    self.dropped_duplicates += 1;
                    continue;
                }
            }
            self.track(&signal, date);
            self.signals.push(signal);
            recorded += 1;
        }
        recorded
    }

    fn track(&mut self, signal: &TradingSignal, date: NaiveDate) {
        *self.by_date.entry(date).or_default() += 1;
        *self
            .by_security
            .entry(signal.security_code.clone())
            .or_default() += 1;
        *self
            .by_instrument
            .entry(signal.instrument_code.clone())
            .or_default() += 1;
        *self.by_confidence.entry(signal.confidence).or_default() += 1;
        *self.by_risk.entry(signal.risk).or_default() += 1;
    }

    pub fn signals(&self) -> &[TradingSignal] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn into_signals(self) -> Vec<TradingSignal> {
        self.signals
    }

    /// Aggregate statistics over everything recorded so far.
    pub fn statistics(&self, top_n: usize) -> SignalStatistics {
        let total = self.signals.len() as u64;

        let day_count = self.by_date.len() as u64;
        let avg_per_day = if day_count > 0 {
            total as f64 / day_count as f64
        } else {
            0.0
        };

        let months: HashSet<(i32, u32)> = self
            .by_date
            .keys()
            .map(|d| (d.year(), d.month()))
            .collect();
        let avg_per_month = if months.is_empty() {
            0.0
        } else {
            total as f64 / months.len() as f64
        };

        let busiest_day = self
            .by_date
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(date, count)| (*date, *count));

        SignalStatistics {
            total,
            dropped_duplicates: self.dropped_duplicates,
            by_confidence: ordinal_counts(&self.by_confidence),
            by_risk: ordinal_counts(&self.by_risk),
            top_securities: top_counts(&self.by_security, top_n),
            top_instruments: top_counts(&self.by_instrument, top_n),
            avg_per_day,
            avg_per_month,
            busiest_day,
        }
    }
}

fn ordinal_counts<K: Copy + Ord + std::fmt::Display>(
    map: &HashMap<K, u64>,
) -> BTreeMap<String, u64> {
    let mut sorted: Vec<_> = map.iter().collect();
    sorted.sort_by_key(|(k, _)| **k);
    sorted
        .into_iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

fn top_counts(map: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    // Count descending, code ascending for deterministic output.
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

/// Derived aggregate statistics for a recorded run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalStatistics {
    pub total: u64,
    pub dropped_duplicates: u64,
    pub by_confidence: BTreeMap<String, u64>,
    pub by_risk: BTreeMap<String, u64>,
    pub top_securities: Vec<(String, u64)>,
    pub top_instruments: Vec<(String, u64)>,
    pub avg_per_day: f64,
    pub avg_per_month: f64,
    /// The single day with the most signals.
    pub busiest_day: Option<(NaiveDate, u64)>,
}
