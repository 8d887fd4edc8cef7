use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::backtest::JobCoordinator;
use crate::engine::ArbitrageEngine;

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ArbitrageEngine>,
    pub jobs: Arc<JobCoordinator>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<ArbitrageEngine>, jobs: Arc<JobCoordinator>) -> Self {
        Self {
            engine,
            jobs,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
