//! Application state management for the daemon.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and to the background loops, and wires the policy
//! engine to the Linux host from an effective [`Config`].

use anyhow::Context;
use herakles_lowmem_killer::thresholds::log_conversions;
use herakles_lowmem_killer::{
    Clock, MonotonicClock, ReclaimWorker, ScanCoordinator, SharedState as EngineState,
};
use prometheus::Registry;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::cgroup::CgroupReclaimer;
use crate::config::Config;
use crate::linux_host::LinuxHost;
use crate::metrics::KillerMetrics;

/// Type alias for shared application state.
pub type SharedAppState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: KillerMetrics,
    pub engine: Arc<EngineState>,
    pub coordinator: Arc<ScanCoordinator>,
    pub reclaimer: Arc<ReclaimWorker>,
    pub host: Arc<LinuxHost>,
    /// Effective config, updated by runtime tunable changes.
    pub config: RwLock<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds the engine and its host adapters from an effective config.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let registry = Registry::new();
        let metrics = KillerMetrics::new(&registry).context("registering metrics")?;

        let debug_level = config
            .debug_level
            .unwrap_or(herakles_lowmem_killer::shared::DEFAULT_DEBUG_LEVEL);
        let engine = Arc::new(EngineState::new(debug_level));
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

        let (table, conversions) = config
            .thresholds
            .build_converted()
            .context("invalid threshold tables")?;
        log_conversions(&conversions, &engine.debug);
        let coordinator = Arc::new(
            ScanCoordinator::new(
                Arc::clone(&engine),
                Arc::clone(&clock),
                table,
                &config.boost.window,
                config.scan.tunables.clone(),
            )
            .context("invalid scan tunables")?,
        );

        let cgroups = CgroupReclaimer::new(
            config.reclaim.cgroups.clone(),
            config.reclaim.reclaim_chunk_pages,
        );
        let reclaimer = Arc::new(ReclaimWorker::new(
            Arc::clone(&engine),
            Arc::new(cgroups),
            clock,
            config.reclaim.tunables.clone(),
        ));

        let host = Arc::new(LinuxHost::new(
            config.proc_root(),
            config.dry_run.unwrap_or(false),
        ));

        Ok(Self {
            registry,
            metrics,
            engine,
            coordinator,
            reclaimer,
            host,
            config: RwLock::new(config),
            start_time: Instant::now(),
        })
    }

    /// Copy of the effective config.
    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Mirrors engine counters into the Prometheus gauges.
    pub fn refresh_metrics(&self) {
        let boost_active = self.coordinator.boost().is_active(self.coordinator.now());
        self.metrics.refresh(&self.engine.snapshot(), boost_active);
    }
}
