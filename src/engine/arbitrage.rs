//! Arbitrage engine.
//!
//! Owns the watch-list and the persisted security -> instrument mapping,
//! and drives the strategy executor across all watched securities. The
//! expensive mapping discovery runs once: on construction the persisted
//! mapping is loaded, and only an absent/empty store triggers a full
//! provider query (which is then persisted for the next restart).

use arc_swap::ArcSwap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write as IoWrite;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::domain::{CandidateInstrument, TradingSignal};
use crate::error::Result;
use crate::market::{HoldingsProvider, QuoteSource};
use crate::persistence::MappingRepository;
use crate::strategy::{
    SignalEvaluator, StrategyChainConfig, StrategyExecutor, StrategyRegistry,
};

/// Construction-time settings for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub watchlist: Vec<String>,
    /// Candidate instrument universe used when the mapping must be rebuilt.
    pub instrument_universe: Vec<String>,
    /// Minimum re-validated weight for an instrument to stay eligible.
    pub min_weight: Decimal,
    /// Evaluator preset name.
    pub evaluator: String,
    pub chain: StrategyChainConfig,
    /// Optional JSONL file every emitted signal is appended to.
    pub signal_log: Option<PathBuf>,
}

/// Aggregate result of one full watch-list pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub total_scanned: u64,
    /// Securities where the detector produced an event.
    pub total_events: u64,
    /// Events that were stopped before becoming a signal.
    pub filtered: u64,
    pub signals_emitted: u64,
    pub errors: u64,
    pub trace: Vec<String>,
}

pub struct ArbitrageEngine {
    settings: EngineSettings,
    quotes: Arc<dyn QuoteSource>,
    holdings: Arc<dyn HoldingsProvider>,
    mapping: Arc<dyn MappingRepository>,
    registry: Arc<StrategyRegistry>,
    /// Swapped wholesale on strategy reload; in-flight scans keep the
    /// generation they loaded.
    executor: ArcSwap<StrategyExecutor>,
    signal_seq: Arc<AtomicU64>,
    history: Mutex<Vec<TradingSignal>>,
}

impl ArbitrageEngine {
    /// Load (or bootstrap) the mapping and build the initial executor.
    /// Configuration errors are collected exhaustively before anything is
    /// constructed.
    pub async fn new(
        settings: EngineSettings,
        quotes: Arc<dyn QuoteSource>,
        holdings: Arc<dyn HoldingsProvider>,
        mapping: Arc<dyn MappingRepository>,
        registry: Arc<StrategyRegistry>,
    ) -> Result<Self> {
        settings.chain.validate(&registry)?;

        if mapping.is_empty().await? {
            info!(
                securities = settings.watchlist.len(),
                instruments = settings.instrument_universe.len(),
                "mapping store empty, running discovery"
            );
            let discovered = holdings
                .build_mapping(&settings.watchlist, &settings.instrument_universe)
                .await?;
            mapping.save_all(&discovered).await?;
            info!(entries = discovered.len(), "mapping discovered and persisted");
        }

        let signal_seq = Arc::new(AtomicU64::new(0));
        let executor = StrategyExecutor::from_chain(
            &settings.chain,
            SignalEvaluator::preset(&settings.evaluator)?,
            &registry,
            quotes.clone(),
            signal_seq.clone(),
        )?;

        Ok(Self {
            settings,
            quotes,
            holdings,
            mapping,
            registry,
            executor: ArcSwap::from_pointee(executor),
            signal_seq,
            history: Mutex::new(Vec::new()),
        })
    }

    pub fn watchlist(&self) -> &[String] {
        &self.settings.watchlist
    }

    /// Eligible instruments for a security: cached mapping entries with
    /// their actual weight/rank re-validated against live top holdings,
    /// filtered by the minimum weight and sorted descending.
    pub async fn eligible_instruments(&self, security: &str) -> Result<Vec<CandidateInstrument>> {
        let Some(cached) = self.mapping.get(security).await? else {
            return Ok(Vec::new());
        };

        let mut eligible = Vec::with_capacity(cached.len());
        for candidate in cached {
            let current = match self.holdings.top_holdings(&candidate.code).await {
                Ok(top) => top.candidate_for(security),
                Err(e) => {
                    // A flaky provider should not blank out the scan; the
                    // cached entry stands in until the next pass.
                    warn!(
                        instrument = %candidate.code,
                        error = %e,
                        "live holdings lookup failed, using cached mapping entry"
                    );
                    Some(candidate.clone())
                }
            };
            let Some(current) = current else {
                debug!(
                    security,
                    instrument = %candidate.code,
                    "security no longer held, dropping stale mapping entry"
                );
                continue;
            };
            if current.weight >= self.settings.min_weight {
                eligible.push(current);
            }
        }

        crate::domain::instrument::sort_by_weight_desc(&mut eligible);
        Ok(eligible)
    }

    /// Scan a single security: quote -> eligibility -> pipeline.
    pub async fn scan_security(&self, security: &str) -> Result<Option<TradingSignal>> {
        let Some(quote) = self.quotes.get_quote(security).await? else {
            return Ok(None);
        };
        let eligible = self.eligible_instruments(security).await?;
        let executor = self.executor.load_full();
        let signal = executor.execute(&quote, &eligible).await?;
        if let Some(ref signal) = signal {
            self.remember(signal.clone());
        }
        Ok(signal)
    }

    /// One sequential pass over the whole watch-list. Per-security errors
    /// are counted and logged, never propagated.
    pub async fn scan_all(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let executor = self.executor.load_full();

        for security in &self.settings.watchlist {
            report.total_scanned += 1;
            match self.scan_one(&executor, security).await {
                Ok(outcome) => {
                    if outcome.event_detected {
                        report.total_events += 1;
                    }
                    match outcome.signal {
                        Some(signal) => {
                            report.signals_emitted += 1;
                            report.trace.push(format!(
                                "{security}: signal {} -> {} ({}/{})",
                                signal.id,
                                signal.instrument_code,
                                signal.confidence,
                                signal.risk
                            ));
                            self.remember(signal);
                        }
                        None => {
                            if outcome.event_detected {
                                report.filtered += 1;
                            }
                            if let Some(reason) = outcome.stopped_reason {
                                report.trace.push(format!("{security}: {reason}"));
                            }
                        }
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    report.trace.push(format!("{security}: error: {e}"));
                    warn!(security = %security, error = %e, "scan error, skipping security");
                }
            }
        }

        info!(
            scanned = report.total_scanned,
            events = report.total_events,
            signals = report.signals_emitted,
            filtered = report.filtered,
            errors = report.errors,
            "watch-list scan complete"
        );
        report
    }

    async fn scan_one(
        &self,
        executor: &StrategyExecutor,
        security: &str,
    ) -> Result<crate::strategy::PipelineOutcome> {
        let Some(quote) = self.quotes.get_quote(security).await? else {
            return Ok(crate::strategy::PipelineOutcome {
                signal: None,
                event_detected: false,
                stopped_reason: Some("quote unavailable".to_string()),
            });
        };
        let eligible = self.eligible_instruments(security).await?;
        executor.run_pipeline(&quote, &eligible).await
    }

    /// Validate the new chain against the registry (collecting every
    /// violation), then swap the executor reference atomically. In-flight
    /// scans finish on the generation they loaded.
    pub async fn reload_strategy(&self, chain: StrategyChainConfig, evaluator: &str) -> Result<()> {
        chain.validate(&self.registry)?;
        let executor = StrategyExecutor::from_chain(
            &chain,
            SignalEvaluator::preset(evaluator)?,
            &self.registry,
            self.quotes.clone(),
            self.signal_seq.clone(),
        )?;
        self.executor.store(Arc::new(executor));
        info!(
            detector = %chain.detector,
            selector = %chain.selector,
            filters = chain.filters.len(),
            evaluator,
            "strategy chain reloaded"
        );
        Ok(())
    }

    /// Signals produced since startup, newest last.
    pub fn signal_history(&self) -> Vec<TradingSignal> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn remember(&self, signal: TradingSignal) {
        self.append_signal_log(&signal);
        if let Ok(mut history) = self.history.lock() {
            history.push(signal);
        }
    }

    fn append_signal_log(&self, signal: &TradingSignal) {
        let Some(ref path) = self.settings.signal_log else {
            return;
        };
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut file) => {
                let line = serde_json::to_string(signal).unwrap_or_default();
                if let Err(e) = writeln!(file, "{line}") {
                    warn!(error = %e, "failed to append signal log");
                }
            }
            Err(e) => warn!(error = %e, path = %path.display(), "failed to open signal log"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Quote;
    use crate::market::{
        HoldingRow, StaticHoldingsProvider, StaticQuoteSource, TopHoldings,
    };
    use crate::persistence::MemoryMappingStore;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn afternoon_ts() -> chrono::DateTime<Utc> {
        crate::domain::session::exchange_offset()
            .with_ymd_and_hms(2024, 3, 4, 14, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn quote(code: &str, limit_up: bool, amount: Decimal) -> Quote {
        Quote {
            code: code.to_string(),
            name: format!("Name {code}"),
            price: dec!(25.30),
            change_pct: if limit_up { dec!(10.0) } else { dec!(0.5) },
            is_limit_up: limit_up,
            volume: dec!(500000),
            amount,
            timestamp: afternoon_ts(),
        }
    }

    fn top_holdings(instrument: &str, security_weight: Decimal) -> TopHoldings {
        TopHoldings {
            instrument_code: instrument.to_string(),
            instrument_name: format!("ETF {instrument}"),
            category: "industry".to_string(),
            holdings: vec![
                HoldingRow {
                    security_code: "600030".to_string(),
                    security_name: "CITIC Securities".to_string(),
                    weight: security_weight,
                },
                HoldingRow {
                    security_code: "600837".to_string(),
                    security_name: "Haitong Securities".to_string(),
                    weight: dec!(0.06),
                },
            ],
            total_weight: security_weight + dec!(0.06),
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            watchlist: vec!["600030".to_string(), "600837".to_string()],
            instrument_universe: vec!["512880".to_string(), "515000".to_string()],
            min_weight: dec!(0.05),
            evaluator: "standard".to_string(),
            chain: StrategyChainConfig::standard(),
            signal_log: None,
        }
    }

    async fn engine(
        quotes: Arc<StaticQuoteSource>,
        holdings: Arc<StaticHoldingsProvider>,
    ) -> ArbitrageEngine {
        ArbitrageEngine::new(
            settings(),
            quotes,
            holdings,
            Arc::new(MemoryMappingStore::new()),
            Arc::new(StrategyRegistry::builtin()),
        )
        .await
        .unwrap()
    }

    fn market() -> (Arc<StaticQuoteSource>, Arc<StaticHoldingsProvider>) {
        let quotes = Arc::new(StaticQuoteSource::new());
        quotes.upsert(quote("600030", true, dec!(90000000)));
        quotes.upsert(quote("600837", false, dec!(70000000)));
        quotes.upsert(quote("512880", false, dec!(90000000)));
        quotes.upsert(quote("515000", false, dec!(60000000)));
        quotes.set_seconds_to_close(Some(4000));

        let holdings = Arc::new(StaticHoldingsProvider::with_holdings([
            top_holdings("512880", dec!(0.12)),
            top_holdings("515000", dec!(0.07)),
        ]));
        (quotes, holdings)
    }

    #[tokio::test]
    async fn test_construction_bootstraps_empty_mapping() {
        let (quotes, holdings) = market();
        let mapping = Arc::new(MemoryMappingStore::new());
        ArbitrageEngine::new(
            settings(),
            quotes,
            holdings,
            mapping.clone(),
            Arc::new(StrategyRegistry::builtin()),
        )
        .await
        .unwrap();

        // Discovery persisted entries for both watched securities.
        assert!(mapping.has("600030").await.unwrap());
        assert!(mapping.has("600837").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_chain_fails_construction() {
        let (quotes, holdings) = market();
        let mut bad = settings();
        bad.chain.detector = "nope".to_string();
        bad.chain.filters.push("also_nope".to_string());

        let err = match ArbitrageEngine::new(
            bad,
            quotes,
            holdings,
            Arc::new(MemoryMappingStore::new()),
            Arc::new(StrategyRegistry::builtin()),
        )
        .await
        {
            Ok(_) => panic!("expected construction to fail"),
            Err(e) => e,
        };
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("also_nope"));
    }

    #[tokio::test]
    async fn test_eligible_instruments_revalidates_and_sorts() {
        let (quotes, holdings) = market();
        let engine = engine(quotes, holdings.clone()).await;

        // The provider now reports a heavier weight for 515000 than the
        // bootstrap snapshot recorded: the live value must win.
        holdings.upsert(top_holdings("515000", dec!(0.20)));

        let eligible = engine.eligible_instruments("600030").await.unwrap();
        assert_eq!(eligible.len(), 2);
        assert_eq!(eligible[0].code, "515000");
        assert_eq!(eligible[0].weight, dec!(0.20));
    }

    #[tokio::test]
    async fn test_eligible_filters_below_min_weight() {
        let (quotes, holdings) = market();
        let engine = engine(quotes, holdings.clone()).await;

        holdings.upsert(top_holdings("515000", dec!(0.01)));
        let eligible = engine.eligible_instruments("600030").await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].code, "512880");
    }

    #[tokio::test]
    async fn test_scan_all_aggregates_counts() {
        let (quotes, holdings) = market();
        let engine = engine(quotes, holdings).await;

        let report = engine.scan_all().await;
        assert_eq!(report.total_scanned, 2);
        // Only 600030 is limit-up.
        assert_eq!(report.total_events, 1);
        assert_eq!(report.signals_emitted, 1);
        assert_eq!(report.filtered, 0);
        assert_eq!(report.errors, 0);
        assert_eq!(engine.signal_history().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_security_returns_signal() {
        let (quotes, holdings) = market();
        let engine = engine(quotes, holdings).await;

        let signal = engine.scan_security("600030").await.unwrap().unwrap();
        assert_eq!(signal.security_code, "600030");
        assert_eq!(signal.instrument_code, "512880");

        assert!(engine.scan_security("600837").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reload_strategy_swaps_executor() {
        let (quotes, holdings) = market();
        let engine = engine(quotes, holdings).await;

        let mut chain = StrategyChainConfig::standard();
        chain.detector = "breakout".to_string();
        engine.reload_strategy(chain, "aggressive").await.unwrap();

        let exec = engine.executor.load();
        assert_eq!(exec.detector_name(), "breakout");
        assert_eq!(exec.evaluator_preset(), "aggressive");
    }

    #[tokio::test]
    async fn test_reload_rejects_bad_chain_without_swapping() {
        let (quotes, holdings) = market();
        let engine = engine(quotes, holdings).await;

        let mut chain = StrategyChainConfig::standard();
        chain.selector = "nope".to_string();
        assert!(engine.reload_strategy(chain, "standard").await.is_err());

        // Old executor still in place.
        assert_eq!(engine.executor.load().detector_name(), "limit_up");
    }
}
