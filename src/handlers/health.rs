//! Health check endpoint handler.
//!
//! Healthy means the memory counters can be sampled; without them the
//! pressure poll is blind.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use herakles_lowmem_killer::host::{MemorySample, MemorySampler};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::state::SharedAppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub dry_run: bool,
    /// Signaled processes not yet gone.
    pub dying: usize,
    pub memory: Option<MemorySample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let (status, memory, error) = match state.host.sample() {
        Ok(sample) => (StatusCode::OK, Some(sample), None),
        Err(e) => {
            warn!("health check could not sample memory: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, None, Some(e.to_string()))
        }
    };

    let body = HealthResponse {
        status: if status == StatusCode::OK { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        dry_run: state.host.is_dry_run(),
        dying: state.host.dying(),
        memory,
        error,
    };
    (status, Json(body))
}
