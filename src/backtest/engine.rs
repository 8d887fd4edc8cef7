//! Backtest engine.
//!
//! Replays the detection/selection/evaluation rule set against historical
//! quotes, with point-in-time eligibility interpolated from sparse holdings
//! snapshots. Setup failures are fatal; per-security errors inside the
//! simulation loop are logged and skipped.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::backtest::clock::SimulationClock;
use crate::backtest::holdings_sim::SnapshotSet;
use crate::backtest::recorder::{SignalRecorder, SignalStatistics};
use crate::backtest::BacktestConfig;
use crate::domain::{session, Quote, TradingSignal};
use crate::error::{PivotError, Result};
use crate::market::{HistoricalDataSource, HistoryFrame, QuoteSource};
use crate::strategy::{SignalEvaluator, StrategyChainConfig, StrategyExecutor, StrategyRegistry};

/// Progress observer. Called from the innermost simulation loop; values are
/// monotone in [0, 1].
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// No-op progress observer.
pub fn null_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Quote source view over a loaded history frame, positioned at the
/// simulation clock's current tick.
struct ReplayQuoteSource {
    frame: HistoryFrame,
    now: RwLock<DateTime<Utc>>,
}

impl ReplayQuoteSource {
    fn new(frame: HistoryFrame, start: DateTime<Utc>) -> Self {
        Self {
            frame,
            now: RwLock::new(start),
        }
    }

    fn set_now(&self, t: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = t;
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|t| *t).unwrap_or_else(|_| Utc::now())
    }
}

#[async_trait::async_trait]
impl QuoteSource for ReplayQuoteSource {
    async fn get_quote(&self, code: &str) -> Result<Option<Quote>> {
        Ok(self.frame.quote_at(code, self.now()).cloned())
    }

    fn is_trading_session(&self) -> bool {
        session::is_trading_time(self.now())
    }

    fn seconds_to_close(&self) -> Option<i64> {
        session::seconds_to_close_at(self.now())
    }
}

/// Result bundle assembled at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub config: BacktestConfig,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_ticks: u64,
    pub session_ticks: u64,
    pub securities_scanned: u64,
    pub signals: Vec<TradingSignal>,
    pub statistics: SignalStatistics,
}

pub struct BacktestEngine {
    config: BacktestConfig,
    watchlist: Vec<String>,
    chain: StrategyChainConfig,
    registry: Arc<StrategyRegistry>,
    source: Arc<dyn HistoricalDataSource>,
    // Populated by initialize().
    replay: Option<Arc<ReplayQuoteSource>>,
    snapshots: Option<SnapshotSet>,
    executor: Option<StrategyExecutor>,
}

impl BacktestEngine {
    pub fn new(
        config: BacktestConfig,
        watchlist: Vec<String>,
        chain: StrategyChainConfig,
        registry: Arc<StrategyRegistry>,
        source: Arc<dyn HistoricalDataSource>,
    ) -> Self {
        Self {
            config,
            watchlist,
            chain,
            registry,
            source,
            replay: None,
            snapshots: None,
            executor: None,
        }
    }

    /// Bulk-load history and snapshots and build the strategy components.
    /// Any failure here aborts the backtest before the loop starts; the
    /// coarse milestones feed the caller's progress display.
    pub async fn initialize(&mut self, progress: &ProgressFn) -> Result<()> {
        progress(0.10);
        let start = self.config.start_instant();
        let end = self.config.end_instant();

        let snapshots = self.source.load_snapshots(start, end).await?;
        if snapshots.is_empty() {
            return Err(PivotError::DataLoad(
                "no holdings snapshots cover the backtest range".to_string(),
            ));
        }
        progress(0.40);

        // The quote universe is the watch-list plus every instrument any
        // snapshot maps a watched security to.
        let mut universe: Vec<String> = self.watchlist.clone();
        let mut seen: HashSet<String> = universe.iter().cloned().collect();
        for snapshot in &snapshots {
            for code in self.watchlist.iter() {
                for candidate in snapshot.candidates_for(code) {
                    if seen.insert(candidate.code.clone()) {
                        universe.push(candidate.code.clone());
                    }
                }
            }
        }

        let frame = self
            .source
            .load_quotes(&universe, start, end, self.config.granularity)
            .await?;
        progress(0.50);

        let replay = Arc::new(ReplayQuoteSource::new(frame, start));

        // Replay reuses the live rule set minus the filter chain: session
        // and liquidity hygiene checks have no historical inputs.
        let mut replay_chain = self.chain.clone();
        replay_chain.filters.clear();

        let executor = StrategyExecutor::from_chain(
            &replay_chain,
            SignalEvaluator::preset(&self.config.evaluator)?,
            &self.registry,
            replay.clone() as Arc<dyn QuoteSource>,
            Arc::new(AtomicU64::new(0)),
        )?;
        progress(0.60);

        info!(
            start = %self.config.start,
            end = %self.config.end,
            granularity = %self.config.granularity,
            universe = universe.len(),
            snapshots = snapshots.len(),
            "backtest initialized"
        );

        self.replay = Some(replay);
        self.snapshots = Some(SnapshotSet::new(snapshots));
        self.executor = Some(executor);
        Ok(())
    }

    /// Drive the simulation clock across the range. Must be called after a
    /// successful [`initialize`](Self::initialize).
    pub async fn run(&self, progress: &ProgressFn) -> Result<BacktestReport> {
        let (replay, snapshots, executor) =
            match (&self.replay, &self.snapshots, &self.executor) {
                (Some(r), Some(s), Some(e)) => (r.clone(), s, e),
                _ => {
                    return Err(PivotError::InvalidState(
                        "backtest engine not initialized".to_string(),
                    ))
                }
            };

        let mut clock = SimulationClock::new(
            self.config.start,
            self.config.end,
            self.config.granularity,
        );
        let estimated = clock.estimated_steps();

        let mut recorder = SignalRecorder::new();
        // Independent of the recorder's dedup: a security alerts at most
        // once per simulated day.
        let mut alerted: HashSet<(String, NaiveDate)> = HashSet::new();

        let mut total_ticks: u64 = 0;
        let mut session_ticks: u64 = 0;
        let mut securities_scanned: u64 = 0;

        while let Some(tick) = clock.next_tick() {
            total_ticks += 1;
            // Initialization ended at 60%; the loop owns 60-99% and the last
            // 1% is reserved for result assembly.
            let ratio = total_ticks as f64 / estimated.max(total_ticks) as f64;
            progress(0.60 + 0.39 * ratio);

            if !clock.is_trading_session(tick) {
                continue;
            }
            session_ticks += 1;
            replay.set_now(tick);
            let day = session::exchange_local(tick).date_naive();

            for code in &self.watchlist {
                if alerted.contains(&(code.clone(), day)) {
                    continue;
                }
                securities_scanned += 1;
                match self.scan_one(&replay, snapshots, executor, code, tick).await {
                    Ok(Some(signal)) => {
                        alerted.insert((code.clone(), day));
                        recorder.record(vec![signal], tick, true);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Per-security errors never abort a run.
                        warn!(code = %code, error = %e, "scan error during replay, skipping");
                    }
                }
            }
        }

        let statistics = recorder.statistics(10);
        let report = BacktestReport {
            config: self.config.clone(),
            start: self.config.start,
            end: self.config.end,
            total_ticks,
            session_ticks,
            securities_scanned,
            signals: recorder.into_signals(),
            statistics,
        };
        progress(1.0);

        info!(
            signals = report.signals.len(),
            ticks = report.total_ticks,
            "backtest run complete"
        );
        Ok(report)
    }

    async fn scan_one(
        &self,
        replay: &Arc<ReplayQuoteSource>,
        snapshots: &SnapshotSet,
        executor: &StrategyExecutor,
        code: &str,
        tick: DateTime<Utc>,
    ) -> Result<Option<TradingSignal>> {
        let Some(quote) = replay.get_quote(code).await? else {
            return Ok(None);
        };

        let eligible: Vec<_> = snapshots
            .holdings_at(code, tick, self.config.interpolation)
            .into_iter()
            .filter(|c| c.weight >= self.config.min_weight)
            .collect();
        if eligible.is_empty() {
            return Ok(None);
        }
        debug!(code, eligible = eligible.len(), "replay scan");

        executor.execute(&quote, &eligible).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{Granularity, InterpolationMode};
    use crate::domain::CandidateInstrument;
    use crate::market::{HoldingsMapping, HoldingsSnapshot, InMemoryHistory};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn tick_ts(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        session::exchange_offset()
            .with_ymd_and_hms(2024, 3, d, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn quote(code: &str, d: u32, limit_up: bool) -> Quote {
        Quote {
            code: code.to_string(),
            name: format!("Security {code}"),
            price: dec!(20.00),
            change_pct: if limit_up { dec!(10.0) } else { dec!(0.5) },
            is_limit_up: limit_up,
            volume: dec!(500000),
            amount: dec!(90000000),
            timestamp: tick_ts(d, 9, 30),
        }
    }

    fn snapshot(d: u32, weight: Decimal) -> HoldingsSnapshot {
        let mut holdings = HoldingsMapping::new();
        holdings.insert(
            "600030".to_string(),
            vec![CandidateInstrument {
                code: "512880".to_string(),
                name: "Securities ETF".to_string(),
                weight,
                category: "industry".to_string(),
                rank: 2,
                in_top10: true,
                top10_ratio: dec!(0.5),
            }],
        );
        HoldingsSnapshot {
            date: tick_ts(d, 0, 0),
            holdings,
        }
    }

    fn history(limit_up_days: &[u32]) -> Arc<InMemoryHistory> {
        let mut frame = HistoryFrame::new();
        // 2024-03-04..08 is a full Monday-Friday week.
        for d in 4..=8 {
            frame.insert(quote("600030", d, limit_up_days.contains(&d)));
            frame.insert(quote("512880", d, false));
        }
        Arc::new(InMemoryHistory::new(
            frame,
            vec![snapshot(1, dec!(0.08)), snapshot(29, dec!(0.08))],
        ))
    }

    fn engine(source: Arc<InMemoryHistory>) -> BacktestEngine {
        let config = BacktestConfig::new(
            date(4),
            date(8),
            Granularity::Daily,
            dec!(0.05),
            "standard".to_string(),
            InterpolationMode::Linear,
        )
        .unwrap();
        BacktestEngine::new(
            config,
            vec!["600030".to_string()],
            StrategyChainConfig::standard(),
            Arc::new(StrategyRegistry::builtin()),
            source,
        )
    }

    #[tokio::test]
    async fn test_run_without_initialize_fails() {
        let mut engine = engine(history(&[]));
        assert!(engine.run(&null_progress()).await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_fails_without_snapshots() {
        let source = Arc::new(InMemoryHistory::new(HistoryFrame::new(), Vec::new()));
        let config = BacktestConfig::new(
            date(4),
            date(8),
            Granularity::Daily,
            dec!(0.05),
            "standard".to_string(),
            InterpolationMode::Linear,
        )
        .unwrap();
        let mut engine = BacktestEngine::new(
            config,
            vec!["600030".to_string()],
            StrategyChainConfig::standard(),
            Arc::new(StrategyRegistry::builtin()),
            source,
        );
        assert!(engine.initialize(&null_progress()).await.is_err());
    }

    #[tokio::test]
    async fn test_limit_up_days_produce_signals() {
        let mut engine = engine(history(&[5, 7]));
        engine.initialize(&null_progress()).await.unwrap();
        let report = engine.run(&null_progress()).await.unwrap();

        assert_eq!(report.signals.len(), 2);
        assert_eq!(report.total_ticks, 5);
        assert_eq!(report.session_ticks, 5);
        let dates: Vec<NaiveDate> =
            report.signals.iter().map(|s| s.trade_date()).collect();
        assert_eq!(dates, vec![date(5), date(7)]);
        assert_eq!(report.statistics.total, 2);
    }

    #[tokio::test]
    async fn test_quiet_history_produces_no_signals() {
        let mut engine = engine(history(&[]));
        engine.initialize(&null_progress()).await.unwrap();
        let report = engine.run(&null_progress()).await.unwrap();
        assert!(report.signals.is_empty());
    }

    #[tokio::test]
    async fn test_progress_is_monotone_and_complete() {
        let mut engine = engine(history(&[5]));
        let observed: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        let progress: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));

        engine.initialize(&progress).await.unwrap();
        engine.run(&progress).await.unwrap();

        let values = observed.lock().unwrap();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(*values.last().unwrap(), 1.0);
    }
}
