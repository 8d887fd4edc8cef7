//! HTTP surface: submit/poll backtest jobs, trigger scans, read signal
//! history. Handlers stay thin; everything interesting happens in the
//! engine and the job coordinator.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use crate::error::Result;
use std::net::SocketAddr;
use tracing::info;

/// Bind and serve the API until the process exits.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");
    axum::serve(listener, create_router(state))
        .await
        .map_err(|e| crate::error::PivotError::Io(e))
}
