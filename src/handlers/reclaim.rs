//! Soft-reclaim control endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use tracing::{info, instrument};

use crate::state::SharedAppState;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReclaimStatus {
    pub enabled: bool,
    pub pending: bool,
    pub running: bool,
    pub passes: u64,
    pub reclaimed_total: u64,
}

fn status(state: &SharedAppState) -> ReclaimStatus {
    let r = &state.engine.reclaim;
    ReclaimStatus {
        enabled: r.enabled.load(Ordering::Relaxed),
        pending: r.pending.load(Ordering::Acquire),
        running: r.running.load(Ordering::Acquire),
        passes: r.passes.load(Ordering::Relaxed),
        reclaimed_total: r.total_reclaimed.load(Ordering::Relaxed),
    }
}

#[instrument(skip(state))]
pub async fn reclaim_request_handler(State(state): State<SharedAppState>) -> Json<ReclaimStatus> {
    info!("soft reclaim requested via API");
    state.reclaimer.request();
    Json(status(&state))
}

#[instrument(skip(state))]
pub async fn reclaim_cancel_handler(State(state): State<SharedAppState>) -> Json<ReclaimStatus> {
    info!("soft reclaim cancelled via API");
    state.reclaimer.cancel();
    Json(status(&state))
}

#[instrument(skip(state))]
pub async fn reclaim_enable_handler(State(state): State<SharedAppState>) -> Json<ReclaimStatus> {
    state.reclaimer.enable();
    Json(status(&state))
}

#[instrument(skip(state))]
pub async fn reclaim_disable_handler(State(state): State<SharedAppState>) -> Json<ReclaimStatus> {
    state.reclaimer.disable();
    Json(status(&state))
}
