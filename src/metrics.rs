//! Prometheus metrics definitions for herakles-lowmem-killer.
//!
//! All values are gauges mirrored from the engine's shared state at scrape
//! time. The engine keeps its own atomics, so nothing here is on the kill path.

use herakles_lowmem_killer::shared::StateSnapshot;
use prometheus::{Gauge, Registry};

/// Collection of Prometheus gauges exposed on /metrics.
#[derive(Clone)]
pub struct KillerMetrics {
    // ========== Foreground Scan ==========
    pub kills_total: Gauge,
    pub scans_total: Gauge,
    pub scans_contended_total: Gauge,
    pub deathpending_aborts_total: Gauge,
    pub scan_running: Gauge,
    pub boost_active: Gauge,
    pub last_free_pages: Gauge,
    pub last_file_pages: Gauge,

    // ========== Soft Reclaim ==========
    pub soft_reclaimed_pages_total: Gauge,
    pub soft_scanned_pages_total: Gauge,
    pub soft_last_reclaimed_pages: Gauge,
    pub soft_last_scanned_pages: Gauge,
    pub reclaim_running: Gauge,
    pub reclaim_pending: Gauge,
    pub reclaim_enabled: Gauge,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    let g = Gauge::new(name, help)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn flag(v: bool) -> f64 {
    if v {
        1.0
    } else {
        0.0
    }
}

impl KillerMetrics {
    /// Creates and registers all gauges with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            kills_total: gauge(
                registry,
                "herakles_lmk_kills_total",
                "Processes signaled by the low-memory killer since start",
            )?,
            scans_total: gauge(
                registry,
                "herakles_lmk_scans_total",
                "Scans that acquired the scan lock",
            )?,
            scans_contended_total: gauge(
                registry,
                "herakles_lmk_scans_contended_total",
                "Scan requests rejected because another scan was running",
            )?,
            deathpending_aborts_total: gauge(
                registry,
                "herakles_lmk_deathpending_aborts_total",
                "Scans aborted because a previous victim was still dying",
            )?,
            scan_running: gauge(
                registry,
                "herakles_lmk_scan_running",
                "Whether a scan is in progress (1) or not (0)",
            )?,
            boost_active: gauge(
                registry,
                "herakles_lmk_boost_active",
                "Whether the fork-burst boost window is open (1) or not (0)",
            )?,
            last_free_pages: gauge(
                registry,
                "herakles_lmk_last_free_pages",
                "Free pages seen by the last scan",
            )?,
            last_file_pages: gauge(
                registry,
                "herakles_lmk_last_file_pages",
                "Droppable file pages seen by the last scan",
            )?,
            soft_reclaimed_pages_total: gauge(
                registry,
                "herakles_lmk_soft_reclaimed_pages_total",
                "Pages reclaimed by the soft-reclaim worker since start",
            )?,
            soft_scanned_pages_total: gauge(
                registry,
                "herakles_lmk_soft_scanned_pages_total",
                "Pages scanned by the soft-reclaim worker since start",
            )?,
            soft_last_reclaimed_pages: gauge(
                registry,
                "herakles_lmk_soft_last_reclaimed_pages",
                "Pages reclaimed from the last zone of the last pass",
            )?,
            soft_last_scanned_pages: gauge(
                registry,
                "herakles_lmk_soft_last_scanned_pages",
                "Pages scanned in the last zone of the last pass",
            )?,
            reclaim_running: gauge(
                registry,
                "herakles_lmk_reclaim_running",
                "Whether a soft-reclaim pass is in progress (1) or not (0)",
            )?,
            reclaim_pending: gauge(
                registry,
                "herakles_lmk_reclaim_pending",
                "Whether soft reclaim has been requested (1) or not (0)",
            )?,
            reclaim_enabled: gauge(
                registry,
                "herakles_lmk_reclaim_enabled",
                "Whether soft reclaim is enabled (1) or not (0)",
            )?,
        })
    }

    /// Copies a state snapshot into the gauges.
    pub fn refresh(&self, snap: &StateSnapshot, boost_active: bool) {
        self.kills_total.set(snap.kills as f64);
        self.scans_total.set(snap.scans as f64);
        self.scans_contended_total.set(snap.contended as f64);
        self.deathpending_aborts_total
            .set(snap.deathpending_aborts as f64);
        self.scan_running.set(flag(snap.scan_running));
        self.boost_active.set(flag(boost_active));
        self.last_free_pages.set(snap.last_free_pages as f64);
        self.last_file_pages.set(snap.last_file_pages as f64);

        self.soft_reclaimed_pages_total
            .set(snap.soft_reclaimed_total as f64);
        self.soft_scanned_pages_total
            .set(snap.soft_scanned_total as f64);
        self.soft_last_reclaimed_pages
            .set(snap.soft_last_reclaimed as f64);
        self.soft_last_scanned_pages
            .set(snap.soft_last_scanned as f64);
        self.reclaim_running.set(flag(snap.reclaim_running));
        self.reclaim_pending.set(flag(snap.reclaim_pending));
        self.reclaim_enabled.set(flag(snap.reclaim_enabled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_refresh() {
        let registry = Registry::new();
        let metrics = KillerMetrics::new(&registry).unwrap();
        let snap = StateSnapshot {
            kills: 7,
            reclaim_enabled: true,
            last_free_pages: 1234,
            ..Default::default()
        };
        metrics.refresh(&snap, true);

        assert_eq!(metrics.kills_total.get(), 7.0);
        assert_eq!(metrics.reclaim_enabled.get(), 1.0);
        assert_eq!(metrics.boost_active.get(), 1.0);
        assert_eq!(metrics.last_free_pages.get(), 1234.0);
        assert_eq!(registry.gather().len(), 15);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        KillerMetrics::new(&registry).unwrap();
        assert!(KillerMetrics::new(&registry).is_err());
    }
}
