//! Background soft-reclaim worker.
//!
//! The host's idle path calls [`ReclaimWorker::could_reclaim`]; when every
//! gate passes the worker task wakes, runs one reclaim pass over the host's
//! zones and goes back to sleep. Operators drive it through
//! `enable`/`disable` and `request`/`cancel`.

use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, instrument, warn};

use crate::clock::{as_millis, Clock};
use crate::host::{IdleSample, ZoneReclaimer};
use crate::shared::SharedState;
use crate::tunables::ReclaimTunables;

/// Why the worker was or was not woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeDecision {
    NotRequested,
    Cooldown,
    Busy,
    LowSwap,
    Disabled,
    NotIdle,
    AlreadyRunning,
    Woken,
}

/// Totals of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub zones: usize,
    pub reclaimed: u64,
    pub scanned: u64,
    /// Whether the request flag survived the pass.
    pub still_pending: bool,
}

pub struct ReclaimWorker {
    shared: Arc<SharedState>,
    reclaimer: Arc<dyn ZoneReclaimer>,
    clock: Arc<dyn Clock>,
    tunables: RwLock<ReclaimTunables>,
    wake: Notify,
}

impl ReclaimWorker {
    pub fn new(
        shared: Arc<SharedState>,
        reclaimer: Arc<dyn ZoneReclaimer>,
        clock: Arc<dyn Clock>,
        tunables: ReclaimTunables,
    ) -> Self {
        shared
            .reclaim
            .enabled
            .store(tunables.enabled, Ordering::Relaxed);
        Self {
            shared,
            reclaimer,
            clock,
            tunables: RwLock::new(tunables),
            wake: Notify::new(),
        }
    }

    pub fn enable(&self) {
        self.shared.reclaim.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.shared.reclaim.enabled.store(false, Ordering::Relaxed);
    }

    /// Flags that memory should be reclaimed at the next idle opportunity.
    pub fn request(&self) {
        self.shared.reclaim.pending.store(true, Ordering::Release);
    }

    pub fn cancel(&self) {
        self.shared.reclaim.pending.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.reclaim.running.load(Ordering::Acquire)
    }

    pub fn tunables(&self) -> ReclaimTunables {
        self.tunables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Installs new tunables. `enabled` is applied as well.
    pub fn set_tunables(&self, tunables: ReclaimTunables) {
        self.shared
            .reclaim
            .enabled
            .store(tunables.enabled, Ordering::Relaxed);
        *self
            .tunables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = tunables;
    }

    /// Runs the wake gates in order and wakes the worker if all pass.
    pub fn could_reclaim(&self, idle: &IdleSample) -> WakeDecision {
        let state = &self.shared.reclaim;
        let tunables = self.tunables();

        if !state.pending.load(Ordering::Acquire) {
            return WakeDecision::NotRequested;
        }

        let now = as_millis(self.clock.now());
        let last_run = state.last_run_ms.load(Ordering::Relaxed);
        if last_run != 0 && now < last_run.saturating_add(tunables.min_interval_ms) {
            return WakeDecision::Cooldown;
        }
        if self.shared.scan.is_running() || idle.kswapd_active {
            return WakeDecision::Busy;
        }
        if idle.free_swap_pages < tunables.min_freeswap_pages {
            return WakeDecision::LowSwap;
        }
        if !state.enabled.load(Ordering::Relaxed) {
            return WakeDecision::Disabled;
        }
        if !idle.cpu_idle {
            return WakeDecision::NotIdle;
        }
        if state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return WakeDecision::AlreadyRunning;
        }

        state.last_run_ms.store(now.max(1), Ordering::Relaxed);
        self.wake.notify_one();
        WakeDecision::Woken
    }

    /// One pass over every reclaimable zone. Clears the request when the
    /// pass yields less than `min_reclaim_pages`.
    pub fn run_pass(&self) -> PassReport {
        let state = &self.shared.reclaim;
        let min_reclaim = self.tunables().min_reclaim_pages;
        let mut report = PassReport::default();

        for zone in self.reclaimer.zones() {
            if !zone.populated || zone.all_unreclaimable {
                debug!(zone = %zone.name, "skipping zone");
                continue;
            }
            let result = self.reclaimer.reclaim_zone(&zone);
            state.last_reclaimed.store(result.reclaimed, Ordering::Relaxed);
            state.last_scanned.store(result.scanned, Ordering::Relaxed);
            state
                .total_reclaimed
                .fetch_add(result.reclaimed, Ordering::Relaxed);
            state.total_scanned.fetch_add(result.scanned, Ordering::Relaxed);
            report.zones += 1;
            report.reclaimed += result.reclaimed;
            report.scanned += result.scanned;
        }
        state.passes.fetch_add(1, Ordering::Relaxed);

        if self.shared.debug.enabled(2) {
            info!("soft reclaimed {} pages", report.reclaimed);
        }
        if report.reclaimed < min_reclaim {
            self.cancel();
        }
        report.still_pending = state.pending.load(Ordering::Acquire);
        report
    }

    /// Worker loop. Returns once `shutdown` flips to `true` or its sender
    /// goes away.
    #[instrument(skip_all, name = "soft_reclaim")]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("soft reclaim worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let worker = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || worker.run_pass()).await {
                Ok(report) => debug!(?report, "soft reclaim pass finished"),
                Err(e) => warn!("soft reclaim pass panicked: {}", e),
            }
            self.shared.reclaim.running.store(false, Ordering::Release);
        }
        self.cancel();
        self.shared.reclaim.running.store(false, Ordering::Release);
        info!("soft reclaim worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{Zone, ZoneReclaim};
    use std::time::Duration;

    struct FixedZones {
        per_zone: u64,
    }

    impl ZoneReclaimer for FixedZones {
        fn zones(&self) -> Vec<Zone> {
            vec![
                Zone {
                    name: "dma".into(),
                    populated: true,
                    all_unreclaimable: false,
                },
                Zone {
                    name: "normal".into(),
                    populated: true,
                    all_unreclaimable: false,
                },
                Zone {
                    name: "movable".into(),
                    populated: false,
                    all_unreclaimable: false,
                },
                Zone {
                    name: "stuck".into(),
                    populated: true,
                    all_unreclaimable: true,
                },
            ]
        }

        fn reclaim_zone(&self, _zone: &Zone) -> ZoneReclaim {
            ZoneReclaim {
                reclaimed: self.per_zone,
                scanned: self.per_zone * 2,
            }
        }
    }

    fn worker(per_zone: u64) -> (ReclaimWorker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(Duration::from_secs(100)));
        let w = ReclaimWorker::new(
            Arc::new(SharedState::default()),
            Arc::new(FixedZones { per_zone }),
            clock.clone(),
            ReclaimTunables::default(),
        );
        (w, clock)
    }

    fn idle() -> IdleSample {
        IdleSample {
            cpu_idle: true,
            kswapd_active: false,
            free_swap_pages: 100_000,
        }
    }

    #[test]
    fn test_gates_in_order() {
        let (w, clock) = worker(1000);
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::NotRequested);

        w.request();
        let busy = IdleSample {
            kswapd_active: true,
            ..idle()
        };
        assert_eq!(w.could_reclaim(&busy), WakeDecision::Busy);

        let low = IdleSample {
            free_swap_pages: 10,
            ..idle()
        };
        assert_eq!(w.could_reclaim(&low), WakeDecision::LowSwap);

        w.disable();
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::Disabled);
        w.enable();

        let busy_cpu = IdleSample {
            cpu_idle: false,
            ..idle()
        };
        assert_eq!(w.could_reclaim(&busy_cpu), WakeDecision::NotIdle);

        assert_eq!(w.could_reclaim(&idle()), WakeDecision::Woken);
        assert!(w.is_running());

        // cooldown starts at the wake
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::Cooldown);
        clock.advance(Duration::from_secs(10));
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::AlreadyRunning);
    }

    #[test]
    fn test_foreground_scan_blocks_wake() {
        let (w, _clock) = worker(1000);
        w.request();
        let _scan = w.shared.scan.enter();
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::Busy);
    }

    #[test]
    fn test_pass_skips_unusable_zones() {
        let (w, _clock) = worker(1000);
        w.request();
        let report = w.run_pass();
        assert_eq!(report.zones, 2);
        assert_eq!(report.reclaimed, 2000);
        assert_eq!(report.scanned, 4000);
        assert!(report.still_pending);

        let snap = w.shared.snapshot();
        assert_eq!(snap.soft_reclaimed_total, 2000);
        assert_eq!(snap.soft_last_reclaimed, 1000);
        assert_eq!(snap.reclaim_passes, 1);
    }

    #[test]
    fn test_small_pass_clears_request() {
        let (w, _clock) = worker(100);
        w.request();
        let report = w.run_pass();
        assert_eq!(report.reclaimed, 200);
        assert!(!report.still_pending);
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::NotRequested);
    }

    #[tokio::test]
    async fn test_worker_runs_pass_when_woken() {
        let (w, _clock) = worker(1000);
        let w = Arc::new(w);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&w).run(rx));

        w.request();
        assert_eq!(w.could_reclaim(&idle()), WakeDecision::Woken);

        let done = tokio::time::timeout(Duration::from_secs(5), async {
            while w.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(done.is_ok());
        assert_eq!(w.shared.snapshot().reclaim_passes, 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(!w.shared.snapshot().reclaim_pending);
    }
}
