//! Configuration endpoint handlers.
//!
//! `GET /config` reports the tunables the engine is running with right now,
//! which may differ from the file after runtime updates. The `PUT` handlers
//! change one section each; a rejected update answers 400 and leaves the
//! running values untouched.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herakles_lowmem_killer::tunables::{
    BoostTunables, ReclaimTunables, ScanTunables, ThresholdTunables,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{debug, info, instrument, warn};

use crate::state::{AppState, SharedAppState};

#[derive(Debug, Serialize)]
pub struct EffectiveTunables {
    pub thresholds: ThresholdTunables,
    pub boost: BoostTunables,
    pub scan: ScanTunables,
    pub reclaim: ReclaimTunables,
    pub debug_level: u32,
    pub dry_run: bool,
    pub proc_root: PathBuf,
    pub cgroups: Vec<PathBuf>,
}

/// Body of `PUT /config/boost`. The boost pages are optional and replace
/// only the boost column of the active table.
#[derive(Debug, Deserialize)]
pub struct BoostUpdate {
    #[serde(flatten)]
    pub window: BoostTunables,
    #[serde(default, alias = "fork-boost-minfree")]
    pub fork_boost_minfree: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
pub struct DebugLevelUpdate {
    pub level: u32,
}

/// Error type for rejected tunable updates.
#[derive(Debug)]
pub struct UpdateRejected(pub String);

impl IntoResponse for UpdateRejected {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0).into_response()
    }
}

/// Collects the live tunables from the engine.
pub fn effective_tunables(state: &AppState) -> EffectiveTunables {
    let config = state.config();
    let table = state.coordinator.table();
    let boost = state.coordinator.boost();
    let mut reclaim = state.reclaimer.tunables();
    reclaim.enabled = state.engine.reclaim.enabled.load(Ordering::Relaxed);

    EffectiveTunables {
        thresholds: ThresholdTunables {
            adj: table.cutoffs(),
            minfree: table.min_free(),
            fork_boost_minfree: table.boosts(),
            autodetect_oom_adj: config.thresholds.autodetect_oom_adj,
        },
        boost: BoostTunables {
            enabled: boost.is_enabled(),
            window_ms: boost.duration().as_millis() as u64,
        },
        scan: state.coordinator.scan_tunables(),
        reclaim,
        debug_level: state.engine.debug.get(),
        dry_run: state.host.is_dry_run(),
        proc_root: state.host.proc_root().to_path_buf(),
        cgroups: config.reclaim.cgroups,
    }
}

fn with_config(state: &AppState, f: impl FnOnce(&mut crate::config::Config)) {
    let mut config = state
        .config
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut config);
}

pub fn apply_thresholds(state: &AppState, update: ThresholdTunables) -> Result<(), UpdateRejected> {
    state
        .coordinator
        .update_thresholds(&update)
        .map_err(|e| UpdateRejected(e.to_string()))?;
    info!(adj = ?update.adj, minfree = ?update.minfree, "threshold tables updated");
    with_config(state, |c| c.thresholds = update);
    Ok(())
}

pub fn apply_boost(state: &AppState, update: BoostUpdate) -> Result<(), UpdateRejected> {
    if let Some(pages) = &update.fork_boost_minfree {
        state
            .coordinator
            .set_boost_pages(pages)
            .map_err(|e| UpdateRejected(e.to_string()))?;
        let boosts = state.coordinator.table().boosts();
        info!(fork_boost_minfree = ?boosts, "boost pages updated");
        with_config(state, |c| c.thresholds.fork_boost_minfree = boosts);
    }

    let window = update.window;
    let boost = state.coordinator.boost();
    boost.set_duration(window.window());
    boost.set_enabled(window.enabled);
    info!(enabled = window.enabled, window_ms = window.window_ms, "boost window updated");
    with_config(state, |c| c.boost.window = window);
    Ok(())
}

pub fn apply_scan(state: &AppState, update: ScanTunables) -> Result<(), UpdateRejected> {
    state
        .coordinator
        .set_scan_tunables(update.clone())
        .map_err(|e| UpdateRejected(e.to_string()))?;
    info!(victims = update.victims_per_scan, hysteresis_ms = update.hysteresis_ms, "scan tunables updated");
    with_config(state, |c| c.scan.tunables = update);
    Ok(())
}

pub fn apply_reclaim(state: &AppState, update: ReclaimTunables) -> Result<(), UpdateRejected> {
    state.reclaimer.set_tunables(update.clone());
    info!(enabled = update.enabled, "soft reclaim tunables updated");
    with_config(state, |c| c.reclaim.tunables = update);
    Ok(())
}

pub fn apply_debug_level(state: &AppState, update: DebugLevelUpdate) -> Result<(), UpdateRejected> {
    state.engine.debug.set(update.level);
    info!(level = update.level, "debug level updated");
    with_config(state, |c| c.debug_level = Some(update.level));
    Ok(())
}

fn respond(state: &AppState, result: Result<(), UpdateRejected>) -> Result<Json<EffectiveTunables>, UpdateRejected> {
    match result {
        Ok(()) => Ok(Json(effective_tunables(state))),
        Err(e) => {
            warn!("rejected tunable update: {}", e.0);
            Err(e)
        }
    }
}

/// Handler for GET /config.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedAppState>) -> Json<EffectiveTunables> {
    debug!("Processing /config request");
    Json(effective_tunables(&state))
}

#[instrument(skip(state, update))]
pub async fn put_thresholds_handler(
    State(state): State<SharedAppState>,
    Json(update): Json<ThresholdTunables>,
) -> Result<Json<EffectiveTunables>, UpdateRejected> {
    respond(&state, apply_thresholds(&state, update))
}

#[instrument(skip(state, update))]
pub async fn put_boost_handler(
    State(state): State<SharedAppState>,
    Json(update): Json<BoostUpdate>,
) -> Result<Json<EffectiveTunables>, UpdateRejected> {
    respond(&state, apply_boost(&state, update))
}

#[instrument(skip(state, update))]
pub async fn put_scan_handler(
    State(state): State<SharedAppState>,
    Json(update): Json<ScanTunables>,
) -> Result<Json<EffectiveTunables>, UpdateRejected> {
    respond(&state, apply_scan(&state, update))
}

#[instrument(skip(state, update))]
pub async fn put_reclaim_handler(
    State(state): State<SharedAppState>,
    Json(update): Json<ReclaimTunables>,
) -> Result<Json<EffectiveTunables>, UpdateRejected> {
    respond(&state, apply_reclaim(&state, update))
}

#[instrument(skip(state, update))]
pub async fn put_debug_level_handler(
    State(state): State<SharedAppState>,
    Json(update): Json<DebugLevelUpdate>,
) -> Result<Json<EffectiveTunables>, UpdateRejected> {
    respond(&state, apply_debug_level(&state, update))
}
