use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::backtest::Granularity;
use crate::engine::EngineSettings;
use crate::strategy::{StrategyChainConfig, StrategyParams};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub backtest: BacktestDefaults,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    /// Securities under active monitoring.
    #[serde(default)]
    pub securities: Vec<String>,
    /// Candidate instrument universe for mapping discovery.
    #[serde(default)]
    pub instruments: Vec<String>,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            securities: Vec::new(),
            instruments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    #[serde(default = "default_detector")]
    pub detector: String,
    #[serde(default = "default_selector")]
    pub selector: String,
    #[serde(default = "default_filters")]
    pub filters: Vec<String>,
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
    /// Minimum holding weight for eligibility (e.g. 0.05 = 5%).
    #[serde(default = "default_min_weight")]
    pub min_weight: Decimal,
    /// Per-strategy construction parameters, keyed by strategy name.
    #[serde(default)]
    pub params: HashMap<String, HashMap<String, serde_json::Value>>,
}

fn default_detector() -> String {
    "limit_up".to_string()
}

fn default_selector() -> String {
    "highest_weight".to_string()
}

fn default_filters() -> Vec<String> {
    vec![
        "time_to_close".to_string(),
        "liquidity".to_string(),
        "confidence".to_string(),
        "concentration".to_string(),
    ]
}

fn default_evaluator() -> String {
    "standard".to_string()
}

fn default_min_weight() -> Decimal {
    dec!(0.05)
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            detector: default_detector(),
            selector: default_selector(),
            filters: default_filters(),
            evaluator: default_evaluator(),
            min_weight: default_min_weight(),
            params: HashMap::new(),
        }
    }
}

impl StrategySection {
    pub fn chain(&self) -> StrategyChainConfig {
        StrategyChainConfig {
            detector: self.detector.clone(),
            selector: self.selector.clone(),
            filters: self.filters.clone(),
            params: self
                .params
                .iter()
                .map(|(name, map)| (name.clone(), StrategyParams::from_map(map.clone())))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestDefaults {
    #[serde(default = "default_granularity")]
    pub granularity: String,
    #[serde(default = "default_min_weight")]
    pub min_weight: Decimal,
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
    #[serde(default = "default_interpolation")]
    pub interpolation: String,
}

fn default_granularity() -> String {
    "daily".to_string()
}

fn default_interpolation() -> String {
    "linear".to_string()
}

impl Default for BacktestDefaults {
    fn default() -> Self {
        Self {
            granularity: default_granularity(),
            min_weight: default_min_weight(),
            evaluator: default_evaluator(),
            interpolation: default_interpolation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// JSON quote table for demo/live-static runs.
    #[serde(default)]
    pub quotes_file: Option<PathBuf>,
    /// JSON top-holdings table.
    #[serde(default)]
    pub holdings_file: Option<PathBuf>,
    /// Directory with quotes.json/snapshots.json history fixtures.
    #[serde(default)]
    pub history_dir: Option<PathBuf>,
    #[serde(default = "default_mapping_file")]
    pub mapping_file: PathBuf,
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,
    /// Optional JSONL log of every emitted live signal.
    #[serde(default)]
    pub signal_log: Option<PathBuf>,
}

fn default_mapping_file() -> PathBuf {
    PathBuf::from("data/state/mapping.json")
}

fn default_jobs_dir() -> PathBuf {
    PathBuf::from("data/state/jobs")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            quotes_file: None,
            holdings_file: None,
            history_dir: None,
            mapping_file: default_mapping_file(),
            jobs_dir: default_jobs_dir(),
            signal_log: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g. config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PIVOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PIVOT_API__PORT, etc.)
            .add_source(
                Environment::with_prefix("PIVOT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values, reporting every violation together.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.watchlist.securities.is_empty() {
            errors.push("watchlist.securities must not be empty".to_string());
        }

        if self.strategy.min_weight < dec!(0.001) || self.strategy.min_weight > dec!(1.0) {
            errors.push("strategy.min_weight must be within [0.001, 1.0]".to_string());
        }

        if !matches!(
            self.strategy.evaluator.as_str(),
            "standard" | "conservative" | "aggressive"
        ) {
            errors.push(format!(
                "strategy.evaluator '{}' is unknown (standard, conservative, aggressive)",
                self.strategy.evaluator
            ));
        }

        if Granularity::from_str(&self.backtest.granularity).is_none() {
            errors.push(format!(
                "backtest.granularity '{}' is unknown (daily, 5m, 15m, 30m)",
                self.backtest.granularity
            ));
        }

        if !matches!(self.backtest.interpolation.as_str(), "linear" | "step") {
            errors.push(format!(
                "backtest.interpolation '{}' is unknown (linear, step)",
                self.backtest.interpolation
            ));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!(
                "logging.level '{}' is unknown",
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Engine settings derived from the loaded config.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            watchlist: self.watchlist.securities.clone(),
            instrument_universe: self.watchlist.instruments.clone(),
            min_weight: self.strategy.min_weight,
            evaluator: self.strategy.evaluator.clone(),
            chain: self.strategy.chain(),
            signal_log: self.data.signal_log.clone(),
        }
    }

    /// Small demo configuration used when no config file exists.
    pub fn demo() -> Self {
        Self {
            watchlist: WatchlistConfig {
                securities: vec![
                    "600030".to_string(),
                    "600837".to_string(),
                    "300750".to_string(),
                ],
                instruments: vec![
                    "512880".to_string(),
                    "515000".to_string(),
                    "159915".to_string(),
                ],
            },
            ..Self::default()
        }
    }
}
