//! State shared between the scan coordinator, the soft-reclaim worker and
//! operators.
//!
//! Everything here is readable without taking the scan lock. Flags and
//! counters are atomics; only the recent-kill log sits behind a mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::as_millis;

/// Number of kills kept in the recent-kill log.
pub const KILL_LOG_CAPACITY: usize = 32;

/// Debug level used when none is configured.
pub const DEFAULT_DEBUG_LEVEL: u32 = 2;

/// Foreground scan flags and statistics.
#[derive(Debug, Default)]
pub struct ScanState {
    running: AtomicBool,
    last_kill_deadline_ms: AtomicU64,
    pub scans: AtomicU64,
    pub contended: AtomicU64,
    pub deathpending_aborts: AtomicU64,
    pub kills: AtomicU64,
    pub last_free_pages: AtomicU64,
    pub last_file_pages: AtomicU64,
}

impl ScanState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Marks a scan as running until the guard drops.
    pub fn enter(&self) -> RunningGuard<'_> {
        self.running.store(true, Ordering::Release);
        RunningGuard { flag: &self.running }
    }

    pub fn hysteresis_active(&self, now: Duration) -> bool {
        as_millis(now) < self.last_kill_deadline_ms.load(Ordering::Acquire)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.last_kill_deadline_ms.load(Ordering::Acquire))
    }

    /// Covers a kill at `now` with a full window. The deadline only moves
    /// forward; returns whether it moved.
    pub fn arm_deadline(&self, now: Duration, window: Duration) -> bool {
        let deadline = as_millis(now).saturating_add(as_millis(window));
        let previous = self
            .last_kill_deadline_ms
            .fetch_max(deadline, Ordering::AcqRel);
        deadline > previous
    }

    pub fn note_pressure(&self, free_pages: u64, file_pages: u64) {
        self.last_free_pages.store(free_pages, Ordering::Relaxed);
        self.last_file_pages.store(file_pages, Ordering::Relaxed);
    }
}

/// Clears the running flag on drop.
#[derive(Debug)]
pub struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Soft-reclaim flags and statistics.
#[derive(Debug)]
pub struct ReclaimState {
    pub enabled: AtomicBool,
    pub pending: AtomicBool,
    pub running: AtomicBool,
    pub last_run_ms: AtomicU64,
    pub total_reclaimed: AtomicU64,
    pub total_scanned: AtomicU64,
    pub last_reclaimed: AtomicU64,
    pub last_scanned: AtomicU64,
    pub passes: AtomicU64,
}

impl Default for ReclaimState {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            pending: AtomicBool::new(false),
            running: AtomicBool::new(false),
            last_run_ms: AtomicU64::new(0),
            total_reclaimed: AtomicU64::new(0),
            total_scanned: AtomicU64::new(0),
            last_reclaimed: AtomicU64::new(0),
            last_scanned: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        }
    }
}

/// Verbosity of the engine's own diagnostics.
///
/// 1 logs kills, 2 adds selection decisions, 3 adds per-scan pressure,
/// 5 adds no-op returns.
#[derive(Debug)]
pub struct DebugLevel(AtomicU32);

impl Default for DebugLevel {
    fn default() -> Self {
        Self(AtomicU32::new(DEFAULT_DEBUG_LEVEL))
    }
}

impl DebugLevel {
    pub fn new(level: u32) -> Self {
        Self(AtomicU32::new(level))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, level: u32) {
        self.0.store(level, Ordering::Relaxed);
    }

    pub fn enabled(&self, level: u32) -> bool {
        self.get() >= level
    }
}

/// One entry of the recent-kill log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillRecord {
    pub pid: u32,
    pub name: String,
    pub priority_score: i32,
    pub resident_pages: u64,
    pub cutoff: i32,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of every counter, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub scan_running: bool,
    pub hysteresis_deadline_ms: u64,
    pub scans: u64,
    pub contended: u64,
    pub deathpending_aborts: u64,
    pub kills: u64,
    pub last_free_pages: u64,
    pub last_file_pages: u64,
    pub reclaim_enabled: bool,
    pub reclaim_pending: bool,
    pub reclaim_running: bool,
    pub reclaim_passes: u64,
    pub soft_reclaimed_total: u64,
    pub soft_scanned_total: u64,
    pub soft_last_reclaimed: u64,
    pub soft_last_scanned: u64,
    pub debug_level: u32,
}

/// Everything the engine's components share, handed around by `Arc`.
#[derive(Debug, Default)]
pub struct SharedState {
    pub scan: ScanState,
    pub reclaim: ReclaimState,
    pub debug: DebugLevel,
    kills: Mutex<VecDeque<KillRecord>>,
}

impl SharedState {
    pub fn new(debug_level: u32) -> Self {
        Self {
            debug: DebugLevel::new(debug_level),
            ..Default::default()
        }
    }

    /// Appends to the recent-kill log and bumps the kill counter.
    pub fn record_kill(&self, record: KillRecord) {
        self.scan.kills.fetch_add(1, Ordering::Relaxed);
        let mut log = self
            .kills
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if log.len() == KILL_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(record);
    }

    /// Recent kills, newest first.
    pub fn recent_kills(&self) -> Vec<KillRecord> {
        let log = self
            .kills
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.iter().rev().cloned().collect()
    }

    pub fn kill_count(&self) -> u64 {
        self.scan.kills.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let s = &self.scan;
        let r = &self.reclaim;
        StateSnapshot {
            scan_running: s.is_running(),
            hysteresis_deadline_ms: as_millis(s.deadline()),
            scans: s.scans.load(Ordering::Relaxed),
            contended: s.contended.load(Ordering::Relaxed),
            deathpending_aborts: s.deathpending_aborts.load(Ordering::Relaxed),
            kills: s.kills.load(Ordering::Relaxed),
            last_free_pages: s.last_free_pages.load(Ordering::Relaxed),
            last_file_pages: s.last_file_pages.load(Ordering::Relaxed),
            reclaim_enabled: r.enabled.load(Ordering::Relaxed),
            reclaim_pending: r.pending.load(Ordering::Relaxed),
            reclaim_running: r.running.load(Ordering::Relaxed),
            reclaim_passes: r.passes.load(Ordering::Relaxed),
            soft_reclaimed_total: r.total_reclaimed.load(Ordering::Relaxed),
            soft_scanned_total: r.total_scanned.load(Ordering::Relaxed),
            soft_last_reclaimed: r.last_reclaimed.load(Ordering::Relaxed),
            soft_last_scanned: r.last_scanned.load(Ordering::Relaxed),
            debug_level: self.debug.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32) -> KillRecord {
        KillRecord {
            pid,
            name: "victim".into(),
            priority_score: 900,
            resident_pages: 10,
            cutoff: 0,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_running_guard_clears_flag() {
        let state = ScanState::default();
        {
            let _guard = state.enter();
            assert!(state.is_running());
        }
        assert!(!state.is_running());
    }

    #[test]
    fn test_deadline_covers_latest_kill() {
        let state = ScanState::default();
        let w = Duration::from_secs(1);
        assert!(state.arm_deadline(Duration::from_millis(100), w));
        assert_eq!(state.deadline(), Duration::from_millis(1100));
        assert!(state.hysteresis_active(Duration::from_millis(1099)));
        assert!(!state.hysteresis_active(Duration::from_millis(1100)));

        // a later kill inside the window gets its own full window
        assert!(state.arm_deadline(Duration::from_millis(500), w));
        assert_eq!(state.deadline(), Duration::from_millis(1500));

        // never moves backwards
        assert!(!state.arm_deadline(Duration::from_millis(200), w));
        assert_eq!(state.deadline(), Duration::from_millis(1500));
    }

    #[test]
    fn test_kill_log_is_bounded_and_newest_first() {
        let shared = SharedState::default();
        for pid in 0..40 {
            shared.record_kill(record(pid));
        }
        let kills = shared.recent_kills();
        assert_eq!(kills.len(), KILL_LOG_CAPACITY);
        assert_eq!(kills[0].pid, 39);
        assert_eq!(kills[KILL_LOG_CAPACITY - 1].pid, 8);
        assert_eq!(shared.kill_count(), 40);
    }

    #[test]
    fn test_debug_level_gating() {
        let shared = SharedState::new(2);
        assert!(shared.debug.enabled(1));
        assert!(shared.debug.enabled(2));
        assert!(!shared.debug.enabled(3));
        shared.debug.set(5);
        assert!(shared.debug.enabled(5));
        assert_eq!(shared.snapshot().debug_level, 5);
    }

    #[test]
    fn test_reclaim_enabled_by_default() {
        let shared = SharedState::default();
        let snap = shared.snapshot();
        assert!(snap.reclaim_enabled);
        assert!(!snap.reclaim_pending);
        assert!(!snap.scan_running);
    }
}
