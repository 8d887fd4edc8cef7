use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::state::AppState;
use crate::backtest::{BacktestConfig, Granularity, InterpolationMode};
use crate::error::PivotError;

/// Map core errors onto HTTP status codes.
fn error_response(err: PivotError) -> Response {
    let status = match &err {
        PivotError::JobNotFound(_) => StatusCode::NOT_FOUND,
        PivotError::InvalidBacktestConfig(_) | PivotError::StrategyChainInvalid(_) => {
            StatusCode::BAD_REQUEST
        }
        PivotError::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "request failed");
    }
    let body = serde_json::json!({ "error": err.to_string() });
    (status, Json(body)).into_response()
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: i64,
}

pub async fn health(State(state): State<AppState>) -> Response {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
    })
    .into_response()
}

// ============================================================================
// Live scanning
// ============================================================================

/// POST /api/scan - run one full watch-list pass.
pub async fn trigger_scan(State(state): State<AppState>) -> Response {
    let report = state.engine.scan_all().await;
    Json(report).into_response()
}

/// GET /api/signals - in-memory signal history.
pub async fn get_signals(State(state): State<AppState>) -> Response {
    Json(state.engine.signal_history()).into_response()
}

// ============================================================================
// Backtest jobs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BacktestRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
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

fn default_min_weight() -> Decimal {
    dec!(0.05)
}

fn default_evaluator() -> String {
    "standard".to_string()
}

fn default_interpolation() -> String {
    "linear".to_string()
}

impl BacktestRequest {
    fn into_config(self) -> Result<BacktestConfig, PivotError> {
        let mut violations = Vec::new();
        let granularity = Granularity::from_str(&self.granularity).unwrap_or_else(|| {
            violations.push(format!(
                "unknown granularity '{}' (available: daily, 5m, 15m, 30m)",
                self.granularity
            ));
            Granularity::Daily
        });
        let interpolation = match self.interpolation.as_str() {
            "linear" => InterpolationMode::Linear,
            "step" => InterpolationMode::Step,
            other => {
                violations.push(format!(
                    "unknown interpolation '{other}' (available: linear, step)"
                ));
                InterpolationMode::Linear
            }
        };
        if !violations.is_empty() {
            return Err(PivotError::InvalidBacktestConfig(violations));
        }
        BacktestConfig::new(
            self.start,
            self.end,
            granularity,
            self.min_weight,
            self.evaluator,
            interpolation,
        )
    }
}

#[derive(Serialize)]
struct SubmitResponse {
    job_id: String,
    status: &'static str,
}

/// POST /api/backtest - submit a job, reply with its id immediately.
pub async fn submit_backtest(
    State(state): State<AppState>,
    Json(request): Json<BacktestRequest>,
) -> Response {
    let config = match request.into_config() {
        Ok(config) => config,
        Err(e) => return error_response(e),
    };
    match state.jobs.submit(config).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                job_id,
                status: "queued",
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

/// GET /api/backtest - list jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    match state.jobs.list(query.limit.unwrap_or(20)).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/backtest/:id - poll status/progress/result.
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.jobs.status(&id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/backtest/:id - delete a terminal job.
pub async fn delete_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.jobs.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
