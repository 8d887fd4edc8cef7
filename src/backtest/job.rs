//! Asynchronous backtest job lifecycle.
//!
//! A submitted backtest runs on a spawned worker so the request path never
//! blocks. Two independent locks guard one logical job record:
//!
//! - the coarse lock owns whole-record reads and status transitions
//!   (low frequency, request-path calls);
//! - the fine lock owns only the progress scalar, which the simulation's
//!   innermost loop writes at high frequency and must never contend with
//!   the coarse lock.
//!
//! Accepted consequence: a reader can observe a fresh progress value next
//! to a slightly stale status, never the reverse. Cancellation is not
//! supported - once running, a job finishes or fails (known gap).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backtest::engine::{BacktestEngine, BacktestReport, ProgressFn};
use crate::backtest::BacktestConfig;
use crate::error::{PivotError, Result};
use crate::market::HistoricalDataSource;
use crate::persistence::JobRepository;
use crate::strategy::{StrategyChainConfig, StrategyRegistry};

/// Job state machine: Queued -> Running -> {Completed, Failed}. Terminal
/// states are final; there is no retry or resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted job record. Written to the repository at every transition;
/// `progress` holds the value at the latest persisted transition, while the
/// live value sits behind the coordinator's fine lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub config: BacktestConfig,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: f64,
    pub result: Option<BacktestReport>,
    pub error: Option<String>,
}

impl JobRecord {
    fn new(id: String, config: BacktestConfig) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            config,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: 0.0,
            result: None,
            error: None,
        }
    }
}

/// Read-model returned to callers polling a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<BacktestReport>,
    pub error: Option<String>,
}

impl JobView {
    fn from_record(record: JobRecord, live_progress: Option<f64>) -> Self {
        Self {
            progress: live_progress.unwrap_or(record.progress),
            id: record.id,
            status: record.status,
            submitted_at: record.submitted_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            result: record.result,
            error: record.error,
        }
    }
}

struct JobHandle {
    /// Coarse lock: whole-record create/read/status-transition.
    record: Mutex<JobRecord>,
    /// Fine lock: only the hot progress scalar.
    progress: Mutex<f64>,
}

impl JobHandle {
    fn new(record: JobRecord) -> Self {
        Self {
            record: Mutex::new(record),
            progress: Mutex::new(0.0),
        }
    }

    fn live_progress(&self) -> Option<f64> {
        self.progress.lock().ok().map(|p| *p)
    }
}

/// Runs backtests off the calling path and exposes status/progress/result.
pub struct JobCoordinator {
    jobs: DashMap<String, Arc<JobHandle>>,
    repo: Arc<dyn JobRepository>,
    registry: Arc<StrategyRegistry>,
    source: Arc<dyn HistoricalDataSource>,
    watchlist: Vec<String>,
    chain: StrategyChainConfig,
}

impl JobCoordinator {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        registry: Arc<StrategyRegistry>,
        source: Arc<dyn HistoricalDataSource>,
        watchlist: Vec<String>,
        chain: StrategyChainConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            jobs: DashMap::new(),
            repo,
            registry,
            source,
            watchlist,
            chain,
        })
    }

    /// Persist a Queued record, spawn the worker, and return immediately
    /// with the job id.
    pub async fn submit(&self, config: BacktestConfig) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = JobRecord::new(id.clone(), config);
        self.repo.save_job(&record).await?;

        let handle = Arc::new(JobHandle::new(record));
        self.jobs.insert(id.clone(), handle.clone());

        let worker = JobWorker {
            repo: self.repo.clone(),
            registry: self.registry.clone(),
            source: self.source.clone(),
            watchlist: self.watchlist.clone(),
            chain: self.chain.clone(),
        };
        let job_id = id.clone();
        tokio::spawn(async move {
            worker.run(job_id, handle).await;
        });

        info!(job_id = %id, "backtest job submitted");
        Ok(id)
    }

    /// Poll a job. Reads the record under the coarse lock first, then the
    /// progress scalar under the fine lock, so the progress may be fresher
    /// than the status - never the other way around.
    pub async fn status(&self, id: &str) -> Result<JobView> {
        if let Some(handle) = self.jobs.get(id) {
            let record = transition(&handle, |record| record.clone());
            let live = if record.status.is_terminal() {
                None
            } else {
                handle.live_progress()
            };
            return Ok(JobView::from_record(record, live));
        }
        // Jobs from a previous process live only in the repository.
        match self.repo.load_job(id).await? {
            Some(record) => Ok(JobView::from_record(record, None)),
            None => Err(PivotError::JobNotFound(id.to_string())),
        }
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<JobView>> {
        let records = self.repo.list_jobs(limit).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let live = self
                    .jobs
                    .get(&record.id)
                    .filter(|_| !record.status.is_terminal())
                    .and_then(|handle| handle.live_progress());
                JobView::from_record(record, live)
            })
            .collect())
    }

    /// Delete a terminal job. Running jobs cannot be cancelled, so deleting
    /// them is refused.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let view = self.status(id).await?;
        if !view.status.is_terminal() {
            return Err(PivotError::InvalidState(format!(
                "job {id} is {}; only terminal jobs can be deleted",
                view.status
            )));
        }
        self.jobs.remove(id);
        self.repo.delete_job(id).await?;
        Ok(())
    }
}

/// Everything the spawned worker needs, detached from the coordinator so
/// the task owns its dependencies outright.
struct JobWorker {
    repo: Arc<dyn JobRepository>,
    registry: Arc<StrategyRegistry>,
    source: Arc<dyn HistoricalDataSource>,
    watchlist: Vec<String>,
    chain: StrategyChainConfig,
}

impl JobWorker {
    async fn run(self, id: String, handle: Arc<JobHandle>) {
        let config = transition(&handle, |record| {
            record.status = JobStatus::Running;
            record.started_at = Some(Utc::now());
            record.config.clone()
        });
        self.persist(&handle).await;

        // The callback only touches the fine lock. Failures (a poisoned
        // lock) are swallowed: observability must never crash the run.
        let progress_handle = handle.clone();
        let progress: ProgressFn = Arc::new(move |p| {
            if let Ok(mut current) = progress_handle.progress.lock() {
                if p > *current {
                    *current = p;
                }
            }
        });

        let mut engine = BacktestEngine::new(
            config,
            self.watchlist.clone(),
            self.chain.clone(),
            self.registry.clone(),
            self.source.clone(),
        );

        let outcome = match engine.initialize(&progress).await {
            Ok(()) => engine.run(&progress).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                finish(&handle, |record| {
                    record.status = JobStatus::Completed;
                    record.progress = 1.0;
                    record.result = Some(report);
                });
                info!(job_id = %id, "backtest job completed");
            }
            Err(e) => {
                let message = e.to_string();
                finish(&handle, |record| {
                    record.status = JobStatus::Failed;
                    record.progress = handle.live_progress().unwrap_or(0.0);
                    record.error = Some(message.clone());
                });
                error!(job_id = %id, error = %message, "backtest job failed");
            }
        }
        self.persist(&handle).await;
    }

    async fn persist(&self, handle: &JobHandle) {
        let record = transition(handle, |record| record.clone());
        if let Err(e) = self.repo.save_job(&record).await {
            warn!(job_id = %record.id, error = %e, "failed to persist job record");
        }
    }
}

/// Apply a closure under the coarse record lock.
fn transition<T>(handle: &JobHandle, apply: impl FnOnce(&mut JobRecord) -> T) -> T {
    let mut record = handle.record.lock().unwrap_or_else(|e| e.into_inner());
    apply(&mut record)
}

fn finish(handle: &JobHandle, apply: impl FnOnce(&mut JobRecord)) {
    transition(handle, |record| {
        record.finished_at = Some(Utc::now());
        apply(record);
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{Granularity, InterpolationMode};
    use crate::domain::{CandidateInstrument, Quote};
    use crate::market::{HistoryFrame, HoldingsMapping, HoldingsSnapshot, InMemoryHistory};
    use crate::persistence::MemoryJobStore;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ts(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        crate::domain::session::exchange_offset()
            .with_ymd_and_hms(2024, 3, d, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn history() -> Arc<InMemoryHistory> {
        let mut frame = HistoryFrame::new();
        for d in 4..=8 {
            frame.insert(Quote {
                code: "600030".to_string(),
                name: "CITIC Securities".to_string(),
                price: dec!(25.30),
                change_pct: dec!(10.0),
                is_limit_up: d == 5,
                volume: dec!(500000),
                amount: dec!(90000000),
                timestamp: ts(d, 9, 30),
            });
            frame.insert(Quote {
                code: "512880".to_string(),
                name: "Securities ETF".to_string(),
                price: dec!(1.02),
                change_pct: dec!(1.0),
                is_limit_up: false,
                volume: dec!(90000000),
                amount: dec!(90000000),
                timestamp: ts(d, 9, 30),
            });
        }

        let mut holdings = HoldingsMapping::new();
        holdings.insert(
            "600030".to_string(),
            vec![CandidateInstrument {
                code: "512880".to_string(),
                name: "Securities ETF".to_string(),
                weight: dec!(0.08),
                category: "industry".to_string(),
                rank: 2,
                in_top10: true,
                top10_ratio: dec!(0.5),
            }],
        );
        Arc::new(InMemoryHistory::new(
            frame,
            vec![HoldingsSnapshot {
                date: ts(1, 0, 0),
                holdings,
            }],
        ))
    }

    fn config() -> BacktestConfig {
        BacktestConfig::new(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            Granularity::Daily,
            dec!(0.05),
            "standard".to_string(),
            InterpolationMode::Linear,
        )
        .unwrap()
    }

    fn coordinator() -> Arc<JobCoordinator> {
        JobCoordinator::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(StrategyRegistry::builtin()),
            history(),
            vec!["600030".to_string()],
            StrategyChainConfig::standard(),
        )
    }

    async fn wait_terminal(coordinator: &Arc<JobCoordinator>, id: &str) -> JobView {
        for _ in 0..200 {
            let view = coordinator.status(id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_job_lifecycle_to_completion() {
        let coordinator = coordinator();
        let id = coordinator.submit(config()).await.unwrap();

        let view = wait_terminal(&coordinator, &id).await;
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress, 1.0);
        let report = view.result.expect("completed job has a result");
        assert_eq!(report.signals.len(), 1);
        assert!(view.error.is_none());
        assert!(view.started_at.is_some());
        assert!(view.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_setup_marks_job_failed() {
        let empty_history = Arc::new(InMemoryHistory::new(HistoryFrame::new(), Vec::new()));
        let coordinator = JobCoordinator::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(StrategyRegistry::builtin()),
            empty_history,
            vec!["600030".to_string()],
            StrategyChainConfig::standard(),
        );
        let id = coordinator.submit(config()).await.unwrap();

        let view = wait_terminal(&coordinator, &id).await;
        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.unwrap().contains("snapshot"));
        assert!(view.result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.status("missing").await,
            Err(PivotError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_terminal_state() {
        let coordinator = coordinator();
        let id = coordinator.submit(config()).await.unwrap();
        wait_terminal(&coordinator, &id).await;

        coordinator.delete(&id).await.unwrap();
        assert!(coordinator.status(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_includes_submitted_jobs() {
        let coordinator = coordinator();
        let id = coordinator.submit(config()).await.unwrap();
        wait_terminal(&coordinator, &id).await;

        let jobs = coordinator.list(10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
    }
}
