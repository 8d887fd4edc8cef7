use thiserror::Error;

/// Main error type for the signal engine
#[derive(Error, Debug)]
pub enum PivotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    // Strategy resolution errors
    #[error("Unknown {family} strategy '{name}' (available: {})", .available.join(", "))]
    StrategyNotFound {
        family: &'static str,
        name: String,
        available: Vec<String>,
    },

    /// Every unresolved name from a chain config, reported together.
    #[error("Strategy chain validation failed: {}", .0.join("; "))]
    StrategyChainInvalid(Vec<String>),

    #[error("Strategy parameter error: {0}")]
    StrategyParam(String),

    // Market data errors
    #[error("Quote unavailable for security: {0}")]
    QuoteUnavailable(String),

    #[error("Holdings unavailable for instrument: {0}")]
    HoldingsUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Backtest errors
    #[error("Invalid backtest config: {}", .0.join("; "))]
    InvalidBacktestConfig(Vec<String>),

    #[error("Historical data load failed: {0}")]
    DataLoad(String),

    #[error("Backtest job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for PivotError
pub type Result<T> = std::result::Result<T, PivotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_not_found_lists_available() {
        let err = PivotError::StrategyNotFound {
            family: "detector",
            name: "nope".to_string(),
            available: vec!["limit_up".to_string(), "breakout".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("limit_up"));
        assert!(msg.contains("breakout"));
    }

    #[test]
    fn test_chain_invalid_joins_all_violations() {
        let err = PivotError::StrategyChainInvalid(vec![
            "unknown detector 'a'".to_string(),
            "unknown filter 'b'".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("'a'"));
        assert!(msg.contains("'b'"));
    }
}
