//! Statistics endpoint handler.
//!
//! Reports the engine counters, the tier the current memory sample falls
//! into and the recent-kill log.

use axum::{extract::State, Json};
use herakles_lowmem_killer::shared::{KillRecord, StateSnapshot};
use herakles_lowmem_killer::thresholds::Tier;
use herakles_lowmem_killer::{ScanOutcome, ScanRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::state::SharedAppState;

#[derive(Debug, Serialize)]
pub struct PressureView {
    pub reclaimable_pages: u64,
    /// `None` when no tier is crossed.
    pub tier: Option<Tier>,
    pub boost_active: bool,
    pub boost_remaining_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub counters: StateSnapshot,
    pub pressure: Option<PressureView>,
    pub recent_kills: Vec<KillRecord>,
}

/// Handler for the /stats endpoint.
#[instrument(skip(state))]
pub async fn stats_handler(State(state): State<SharedAppState>) -> Json<StatsResponse> {
    debug!("Processing /stats request");

    let coordinator = Arc::clone(&state.coordinator);
    let host = Arc::clone(&state.host);
    let outcome =
        tokio::task::spawn_blocking(move || coordinator.scan(&ScanRequest::query(), host.as_ref()))
            .await;

    let now = state.coordinator.now();
    let boost = state.coordinator.boost();
    let pressure = match outcome {
        Ok(ScanOutcome::Query { reclaimable, tier }) => Some(PressureView {
            reclaimable_pages: reclaimable,
            tier,
            boost_active: boost.is_active(now),
            boost_remaining_ms: boost.remaining(now).map(|d| d.as_millis() as u64),
        }),
        Ok(_) => None,
        Err(e) => {
            warn!("pressure query panicked: {}", e);
            None
        }
    };

    Json(StatsResponse {
        counters: state.engine.snapshot(),
        pressure,
        recent_kills: state.engine.recent_kills(),
    })
}
