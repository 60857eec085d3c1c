//! HTTP endpoint handlers for the operator API.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Index of endpoints
//! - `/health`: Liveness plus a memory sample
//! - `/metrics`: Prometheus metrics endpoint
//! - `/config`: Effective tunables, and `PUT /config/*` to change them
//! - `/stats`: Counters, pressure query and recent kills
//! - `/reclaim/*`: Soft-reclaim request, cancel, enable and disable

pub mod config;
pub mod health;
pub mod metrics;
pub mod reclaim;
pub mod root;
pub mod stats;

// Re-export handlers
pub use config::{
    config_handler, put_boost_handler, put_debug_level_handler, put_reclaim_handler,
    put_scan_handler, put_thresholds_handler,
};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use reclaim::{
    reclaim_cancel_handler, reclaim_disable_handler, reclaim_enable_handler,
    reclaim_request_handler,
};
pub use root::root_handler;
pub use stats::stats_handler;
