//! Live scanning engine.

pub mod arbitrage;

pub use arbitrage::{ArbitrageEngine, EngineSettings, ScanReport};
