use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pivot::api::{self, AppState};
use pivot::backtest::{
    BacktestConfig, BacktestEngine, BacktestReport, Granularity, InterpolationMode,
    JobCoordinator,
};
use pivot::cli::{Cli, Commands};
use pivot::config::{AppConfig, LoggingConfig};
use pivot::engine::ArbitrageEngine;
use pivot::market::{
    HoldingRow, HoldingsProvider, HoldingsSnapshot, InMemoryHistory, StaticHoldingsProvider,
    StaticQuoteSource, TopHoldings,
};
use pivot::persistence::{FileJobStore, FileMappingStore, MappingRepository};
use pivot::strategy::StrategyRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config).context("loading configuration")?;
    if config.watchlist.securities.is_empty() {
        config.watchlist = AppConfig::demo().watchlist;
    }
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        anyhow::bail!("invalid configuration ({} errors)", errors.len());
    }

    init_logging(&config.logging);

    match cli.command {
        Commands::Scan { watch, interval } => run_scan(config, watch, interval).await,
        Commands::Backtest {
            start,
            end,
            granularity,
            min_weight,
            evaluator,
            interpolation,
            seed,
        } => {
            run_backtest(
                config,
                start,
                end,
                granularity,
                min_weight,
                evaluator,
                interpolation,
                seed,
            )
            .await
        }
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Mapping { rebuild } => run_mapping(config, rebuild).await,
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ============================================================================
// Shared construction
// ============================================================================

fn quote_source(config: &AppConfig) -> anyhow::Result<Arc<StaticQuoteSource>> {
    Ok(match &config.data.quotes_file {
        Some(path) => Arc::new(
            StaticQuoteSource::from_json_file(path)
                .with_context(|| format!("loading quotes from {}", path.display()))?,
        ),
        None => Arc::new(StaticQuoteSource::new()),
    })
}

fn holdings_provider(config: &AppConfig) -> anyhow::Result<Arc<StaticHoldingsProvider>> {
    Ok(match &config.data.holdings_file {
        Some(path) => Arc::new(
            StaticHoldingsProvider::from_json_file(path)
                .with_context(|| format!("loading holdings from {}", path.display()))?,
        ),
        None => Arc::new(demo_holdings(config)),
    })
}

/// Built-in holdings table so the binary does something sensible without
/// fixture files: each configured instrument holds a slice of the
/// watch-list at staggered weights.
fn demo_holdings(config: &AppConfig) -> StaticHoldingsProvider {
    let weights: [i64; 6] = [8, 12, 6, 9, 5, 7];
    let provider = StaticHoldingsProvider::new();
    for (i, instrument) in config.watchlist.instruments.iter().enumerate() {
        let mut holdings = Vec::new();
        for (j, security) in config.watchlist.securities.iter().enumerate() {
            let pct = weights[(i + j) % weights.len()];
            holdings.push(HoldingRow {
                security_code: security.clone(),
                security_name: format!("Security {security}"),
                weight: Decimal::new(pct, 2),
            });
        }
        holdings.sort_by(|a, b| b.weight.cmp(&a.weight));
        let total_weight = holdings.iter().map(|h| h.weight).sum();
        provider.upsert(TopHoldings {
            instrument_code: instrument.clone(),
            instrument_name: format!("ETF {instrument}"),
            category: "industry".to_string(),
            holdings,
            total_weight,
        });
    }
    provider
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<Arc<ArbitrageEngine>> {
    let quotes = quote_source(config)?;
    let holdings = holdings_provider(config)?;
    let mapping = Arc::new(FileMappingStore::open(&config.data.mapping_file)?);
    let registry = Arc::new(StrategyRegistry::builtin());

    let engine = ArbitrageEngine::new(
        config.engine_settings(),
        quotes,
        holdings,
        mapping,
        registry,
    )
    .await?;
    Ok(Arc::new(engine))
}

async fn history_source(
    config: &AppConfig,
    seed: u64,
) -> anyhow::Result<Arc<InMemoryHistory>> {
    if let Some(dir) = &config.data.history_dir {
        return Ok(Arc::new(
            InMemoryHistory::from_dir(dir)
                .with_context(|| format!("loading history from {}", dir.display()))?,
        ));
    }

    // No fixtures configured: generate a deterministic two-year synthetic
    // history around the demo holdings.
    let holdings = holdings_provider(config)?;
    let mapping = holdings
        .build_mapping(&config.watchlist.securities, &config.watchlist.instruments)
        .await?;
    let end = Utc::now().date_naive();
    let start = end - Duration::days(730);
    let snapshots = vec![
        HoldingsSnapshot {
            date: pivot::backtest::local_midnight(start),
            holdings: mapping.clone(),
        },
        HoldingsSnapshot {
            date: pivot::backtest::local_midnight(end),
            holdings: mapping,
        },
    ];
    warn!("no history_dir configured, using synthetic history {start}..{end}");
    Ok(Arc::new(InMemoryHistory::synthetic(
        &config.watchlist.securities,
        &config.watchlist.instruments,
        snapshots,
        start,
        end,
        seed,
    )))
}

// ============================================================================
// Commands
// ============================================================================

async fn run_scan(config: AppConfig, watch: bool, interval: u64) -> anyhow::Result<()> {
    let engine = build_engine(&config).await?;

    loop {
        let report = engine.scan_all().await;
        println!(
            "scanned {} securities: {} events, {} signals, {} filtered, {} errors",
            report.total_scanned,
            report.total_events,
            report.signals_emitted,
            report.filtered,
            report.errors
        );
        for line in &report.trace {
            println!("  {line}");
        }
        if !watch {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_backtest(
    config: AppConfig,
    start: String,
    end: String,
    granularity: Option<String>,
    min_weight: Option<String>,
    evaluator: Option<String>,
    interpolation: Option<String>,
    seed: u64,
) -> anyhow::Result<()> {
    let start = NaiveDate::parse_from_str(&start, "%Y-%m-%d").context("parsing --start")?;
    let end = NaiveDate::parse_from_str(&end, "%Y-%m-%d").context("parsing --end")?;

    let granularity_raw = granularity.unwrap_or_else(|| config.backtest.granularity.clone());
    let granularity = Granularity::from_str(&granularity_raw)
        .ok_or_else(|| anyhow::anyhow!("unknown granularity '{granularity_raw}'"))?;
    let min_weight = match min_weight {
        Some(raw) => Decimal::from_str(&raw).context("parsing --min-weight")?,
        None => config.backtest.min_weight,
    };
    let interpolation_raw =
        interpolation.unwrap_or_else(|| config.backtest.interpolation.clone());
    let interpolation = match interpolation_raw.as_str() {
        "linear" => InterpolationMode::Linear,
        "step" => InterpolationMode::Step,
        other => anyhow::bail!("unknown interpolation '{other}'"),
    };
    let backtest_config = BacktestConfig::new(
        start,
        end,
        granularity,
        min_weight,
        evaluator.unwrap_or_else(|| config.backtest.evaluator.clone()),
        interpolation,
    )?;

    let source = history_source(&config, seed).await?;
    let mut engine = BacktestEngine::new(
        backtest_config,
        config.watchlist.securities.clone(),
        config.strategy.chain(),
        Arc::new(StrategyRegistry::builtin()),
        source,
    );

    // Print progress in ~10% increments.
    let last_printed = Arc::new(Mutex::new(0.0f64));
    let progress: pivot::backtest::ProgressFn = Arc::new(move |p| {
        if let Ok(mut last) = last_printed.lock() {
            if p - *last >= 0.10 || p >= 1.0 {
                *last = p;
                info!("backtest progress: {:.0}%", p * 100.0);
            }
        }
    });

    engine.initialize(&progress).await?;
    let report = engine.run(&progress).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &BacktestReport) {
    let stats = &report.statistics;
    println!("backtest {} .. {}", report.start, report.end);
    println!(
        "  ticks: {} total, {} in session; securities scanned: {}",
        report.total_ticks, report.session_ticks, report.securities_scanned
    );
    println!(
        "  signals: {} ({} duplicates dropped)",
        stats.total, stats.dropped_duplicates
    );
    println!("  confidence: {:?}", stats.by_confidence);
    println!("  risk: {:?}", stats.by_risk);
    println!(
        "  averages: {:.2}/day, {:.2}/month",
        stats.avg_per_day, stats.avg_per_month
    );
    if let Some((date, count)) = stats.busiest_day {
        println!("  busiest day: {date} ({count} signals)");
    }
    for (code, count) in &stats.top_securities {
        println!("  security {code}: {count}");
    }
    for (code, count) in &stats.top_instruments {
        println!("  instrument {code}: {count}");
    }
}

async fn run_serve(config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    let engine = build_engine(&config).await?;
    let source = history_source(&config, 42).await?;
    let jobs = JobCoordinator::new(
        Arc::new(FileJobStore::open(&config.data.jobs_dir)?),
        Arc::new(StrategyRegistry::builtin()),
        source,
        config.watchlist.securities.clone(),
        config.strategy.chain(),
    );

    let port = port.unwrap_or(config.api.port);
    let state = AppState::new(engine, jobs);
    api::serve(state, port).await?;
    Ok(())
}

async fn run_mapping(config: AppConfig, rebuild: bool) -> anyhow::Result<()> {
    let mapping = Arc::new(FileMappingStore::open(&config.data.mapping_file)?);

    if rebuild {
        let holdings = holdings_provider(&config)?;
        let discovered = holdings
            .build_mapping(&config.watchlist.securities, &config.watchlist.instruments)
            .await?;
        mapping.save_all(&discovered).await?;
        info!(entries = discovered.len(), "mapping rebuilt");
    }

    let all = mapping.load_all().await?;
    if all.is_empty() {
        println!("mapping is empty (run with --rebuild to discover)");
        return Ok(());
    }
    for (security, candidates) in &all {
        println!("{security}:");
        for candidate in candidates {
            println!(
                "  {} weight {} rank {} top10 {}",
                candidate.code, candidate.weight, candidate.rank, candidate.top10_ratio
            );
        }
    }
    Ok(())
}
