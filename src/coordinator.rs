//! Scan coordinator: the entry point the host calls under memory pressure.
//!
//! One scan at a time. A request that finds the scan lock held returns
//! [`ScanOutcome::Contended`] immediately instead of queueing.
//!
//! ```text
//! Idle -> Scanning -> Killing -> Idle
//!             \-----> Idle        (no pressure, no candidates, death pending)
//! ```

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::executor::Executor;
use crate::host::{MemorySample, MemorySampler, ProcessTable, Terminator};
use crate::pool::CandidateSlot;
use crate::selector::{CandidateSelector, Selection};
use crate::shared::SharedState;
use crate::thresholds::{log_conversions, BoostWindow, ThresholdTable, Tier};
use crate::tunables::{BoostTunables, ScanTunables, ThresholdTunables};

/// Who is asking for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// The dedicated background reclaimer (kswapd in kernel terms).
    Reclaimer,
    /// Any other allocation path.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    /// Zero turns the request into a query.
    pub nr_to_scan: u64,
    /// Opaque allocation context, only logged.
    pub gfp_hint: u32,
    pub caller: Caller,
}

impl ScanRequest {
    pub fn query() -> Self {
        Self {
            nr_to_scan: 0,
            gfp_hint: 0,
            caller: Caller::Direct,
        }
    }

    pub fn reclaim(nr_to_scan: u64, caller: Caller) -> Self {
        Self {
            nr_to_scan,
            gfp_hint: 0,
            caller,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Query {
        reclaimable: u64,
        tier: Option<Tier>,
    },
    Contended,
    SampleFailed,
    NoPressure {
        reclaimable: u64,
    },
    DeathPending {
        pid: u32,
    },
    NoCandidates {
        cutoff: i32,
        reclaimable: u64,
    },
    Killed {
        cutoff: i32,
        victims: Vec<CandidateSlot>,
        pages_reclaimed: u64,
        reclaimable: u64,
    },
}

impl ScanOutcome {
    pub fn pages_reclaimed(&self) -> u64 {
        match self {
            ScanOutcome::Killed {
                pages_reclaimed, ..
            } => *pages_reclaimed,
            _ => 0,
        }
    }

    /// Host accounting estimate after this scan.
    pub fn reclaimable(&self) -> u64 {
        match self {
            ScanOutcome::Query { reclaimable, .. }
            | ScanOutcome::NoPressure { reclaimable }
            | ScanOutcome::NoCandidates { reclaimable, .. }
            | ScanOutcome::Killed { reclaimable, .. } => *reclaimable,
            ScanOutcome::Contended | ScanOutcome::SampleFailed | ScanOutcome::DeathPending { .. } => 0,
        }
    }

    fn wants_backoff(&self) -> bool {
        matches!(self, ScanOutcome::Contended | ScanOutcome::DeathPending { .. })
    }
}

pub struct ScanCoordinator {
    shared: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    table: RwLock<ThresholdTable>,
    boost: BoostWindow,
    tunables: RwLock<ScanTunables>,
    scan_lock: Mutex<()>,
}

impl ScanCoordinator {
    pub fn new(
        shared: Arc<SharedState>,
        clock: Arc<dyn Clock>,
        table: ThresholdTable,
        boost: &BoostTunables,
        tunables: ScanTunables,
    ) -> Result<Self, ConfigError> {
        tunables.validate()?;
        Ok(Self {
            shared,
            clock,
            table: RwLock::new(table),
            boost: BoostWindow::new(boost.enabled, boost.window()),
            tunables: RwLock::new(tunables),
            scan_lock: Mutex::new(()),
        })
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn boost(&self) -> &BoostWindow {
        &self.boost
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn table(&self) -> ThresholdTable {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the whole table.
    pub fn set_table(&self, table: ThresholdTable) {
        *self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = table;
    }

    /// Builds and installs a table from operator lists. On error the active
    /// table is left alone.
    pub fn update_thresholds(&self, tunables: &ThresholdTunables) -> Result<(), ConfigError> {
        let (table, conversions) = tunables.build_converted()?;
        log_conversions(&conversions, &self.shared.debug);
        self.set_table(table);
        Ok(())
    }

    /// Replaces only the boost pages of the active table.
    pub fn set_boost_pages(&self, boost: &[u64]) -> Result<(), ConfigError> {
        let mut table = self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *table = table.with_boost(boost)?;
        Ok(())
    }

    pub fn note_fork_burst(&self) {
        self.boost.note_fork_burst(self.clock.now());
    }

    pub fn scan_tunables(&self) -> ScanTunables {
        self.tunables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_scan_tunables(&self, tunables: ScanTunables) -> Result<(), ConfigError> {
        tunables.validate()?;
        *self
            .tunables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = tunables;
        Ok(())
    }

    /// Runs one scan request against `host`.
    pub fn scan<H>(&self, request: &ScanRequest, host: &H) -> ScanOutcome
    where
        H: MemorySampler + ProcessTable + Terminator + ?Sized,
    {
        if request.nr_to_scan == 0 {
            return self.query(host);
        }

        let tunables = self.scan_tunables();
        let outcome = match self.scan_lock.try_lock() {
            Ok(_lock) => self.scan_locked(request, host, &tunables),
            Err(TryLockError::Poisoned(poisoned)) => {
                let _lock = poisoned.into_inner();
                self.scan_locked(request, host, &tunables)
            }
            Err(TryLockError::WouldBlock) => {
                self.shared.scan.contended.fetch_add(1, Ordering::Relaxed);
                ScanOutcome::Contended
            }
        };

        if outcome.wants_backoff()
            && (request.caller == Caller::Reclaimer || !tunables.only_reclaimer_sleeps)
        {
            std::thread::sleep(tunables.contention_sleep());
        }
        outcome
    }

    fn query<H>(&self, host: &H) -> ScanOutcome
    where
        H: MemorySampler + ?Sized,
    {
        match host.sample() {
            Ok(sample) => {
                let boosted = self.boost.is_active(self.clock.now());
                let tier = self.table().lookup(
                    sample.free_pages,
                    sample.other_file(),
                    sample.reserved_free_pages,
                    boosted,
                );
                ScanOutcome::Query {
                    reclaimable: sample.reclaimable(),
                    tier,
                }
            }
            Err(e) => {
                warn!("memory sample failed: {}", e);
                ScanOutcome::SampleFailed
            }
        }
    }

    fn scan_locked<H>(&self, request: &ScanRequest, host: &H, tunables: &ScanTunables) -> ScanOutcome
    where
        H: MemorySampler + ProcessTable + Terminator + ?Sized,
    {
        let _running = self.shared.scan.enter();
        self.shared.scan.scans.fetch_add(1, Ordering::Relaxed);
        let debug = &self.shared.debug;

        let sample = match host.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("memory sample failed: {}", e);
                return ScanOutcome::SampleFailed;
            }
        };
        let other_file = sample.other_file();
        self.shared.scan.note_pressure(sample.free_pages, other_file);
        let reclaimable = sample.reclaimable();

        let now = self.clock.now();
        let boosted = self.boost.is_active(now);
        let tier = self.table().lookup(
            sample.free_pages,
            other_file,
            sample.reserved_free_pages,
            boosted,
        );

        if debug.enabled(3) {
            info!(
                "lowmem_shrink {}, {:x}, ofree {} {}, ma {}, boost {}",
                request.nr_to_scan,
                request.gfp_hint,
                sample.free_pages,
                other_file,
                tier.map_or(i32::MAX, |t| t.priority_cutoff),
                boosted
            );
        }

        let Some(tier) = tier else {
            if debug.enabled(5) {
                info!("lowmem_shrink {}, {:x}, return {}", request.nr_to_scan, request.gfp_hint, reclaimable);
            }
            return ScanOutcome::NoPressure { reclaimable };
        };
        let cutoff = tier.priority_cutoff;

        let hysteresis_active = self.shared.scan.hysteresis_active(now);
        let selection = CandidateSelector::new(tunables.victims_per_scan)
            .with_logging(debug.enabled(2))
            .select(cutoff, host.processes(), hysteresis_active);

        match selection {
            Selection::DeathPending { pid, name } => {
                self.shared
                    .scan
                    .deathpending_aborts
                    .fetch_add(1, Ordering::Relaxed);
                if debug.enabled(2) {
                    info!("{} ({}) is dying, aborting scan", pid, name);
                }
                ScanOutcome::DeathPending { pid }
            }
            Selection::Empty => {
                debug!(cutoff, "lowmem_shrink: no victim at or above cutoff");
                ScanOutcome::NoCandidates { cutoff, reclaimable }
            }
            Selection::Victims(victims) => {
                let should_dump = match tunables.dump_tasks_below {
                    Some(limit) => debug.enabled(1) && victims.iter().any(|v| v.priority_score < limit),
                    None => false,
                };

                let executor = Executor::new(&self.shared, tunables.hysteresis());
                let execution = executor.execute(victims, cutoff, host, now);

                if should_dump && !execution.signaled.is_empty() {
                    self.dump_tasks(&sample, host);
                }
                let pages = execution.pages_reclaimed;
                ScanOutcome::Killed {
                    cutoff,
                    victims: execution.signaled,
                    pages_reclaimed: pages,
                    reclaimable: reclaimable.saturating_sub(pages),
                }
            }
        }
    }

    fn dump_tasks<H>(&self, sample: &MemorySample, host: &H)
    where
        H: ProcessTable + ?Sized,
    {
        info!(
            "free {} file {} shmem {} mlocked {} swapcache {} reserved {} swapfree {}",
            sample.free_pages,
            sample.file_pages,
            sample.shmem_pages,
            sample.mlocked_pages,
            sample.swapcache_pages,
            sample.reserved_free_pages,
            sample.free_swap_pages
        );
        info!("[ pid ]   rss oom_score_adj name");
        for p in host.processes().filter(|p| !p.is_kernel_task) {
            info!("[{:>5}] {:>7} {:>13} {}", p.pid, p.resident_pages, p.priority_score, p.name);
        }
    }
}
