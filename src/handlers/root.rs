//! Root endpoint handler listing the operator API.

use axum::{extract::State, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedAppState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str =
    "More info: https://www.herakles.now | Support: exporter@herakles.now";

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/health", "liveness and current memory sample"),
    ("GET", "/metrics", "Prometheus metrics"),
    ("GET", "/config", "effective tunables (JSON)"),
    ("PUT", "/config/thresholds", "replace adj/minfree/boost tables"),
    ("PUT", "/config/boost", "fork-burst boost window"),
    ("PUT", "/config/scan", "victims per scan, hysteresis, contention sleep"),
    ("PUT", "/config/reclaim", "soft-reclaim gating"),
    ("PUT", "/config/debug_level", "engine diagnostic verbosity"),
    ("GET", "/stats", "counters, current tier and recent kills (JSON)"),
    ("POST", "/reclaim/request", "ask for soft reclaim at the next idle moment"),
    ("POST", "/reclaim/cancel", "drop a pending soft-reclaim request"),
    ("POST", "/reclaim/enable", "allow soft reclaim"),
    ("POST", "/reclaim/disable", "forbid soft reclaim"),
];

/// Renders the plain-text index.
pub fn render_index(uptime_secs: u64, dry_run: bool) -> String {
    let mut out = format!(
        "herakles-lowmem-killer {}\nuptime: {}h {}m {}s{}\n\n",
        env!("CARGO_PKG_VERSION"),
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60,
        if dry_run { " (dry-run)" } else { "" },
    );
    for (method, path, what) in ENDPOINTS {
        out.push_str(&format!("{:<5} {:<22} {}\n", method, path, what));
    }
    out.push('\n');
    out.push_str(FOOTER_TEXT);
    out.push('\n');
    out
}

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    debug!("Processing / request");
    render_index(state.start_time.elapsed().as_secs(), state.host.is_dry_run())
}
