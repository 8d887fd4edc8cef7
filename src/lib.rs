pub mod api;
pub mod backtest;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod market;
pub mod persistence;
pub mod strategy;

pub use backtest::{
    BacktestConfig, BacktestEngine, BacktestReport, Granularity, InterpolationMode,
    JobCoordinator, SignalRecorder, SimulationClock, SnapshotSet,
};
pub use config::AppConfig;
pub use domain::{
    CandidateInstrument, Confidence, MarketEvent, Quote, RiskLevel, TradingSignal,
};
pub use engine::{ArbitrageEngine, EngineSettings, ScanReport};
pub use error::{PivotError, Result};
pub use market::{
    HistoricalDataSource, HoldingsProvider, HoldingsSnapshot, InMemoryHistory, QuoteSource,
    StaticHoldingsProvider, StaticQuoteSource,
};
pub use persistence::{
    FileJobStore, FileMappingStore, JobRepository, MappingRepository, MemoryJobStore,
    MemoryMappingStore,
};
pub use strategy::{StrategyChainConfig, StrategyExecutor, StrategyRegistry};
