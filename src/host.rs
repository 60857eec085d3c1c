//! Interfaces the engine consumes from its host.
//!
//! The engine never touches the operating system directly. Memory counters,
//! the process table, signal delivery and zone reclaim all come through the
//! traits in this module so the policy can run against `/proc` in the daemon
//! and against scripted hosts in tests and simulations.

use serde::{Deserialize, Serialize};

use crate::error::{HostError, TerminateError};

/// Global memory counters, all in pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    pub free_pages: u64,
    /// File-backed pages including shmem and swap cache.
    pub file_pages: u64,
    pub shmem_pages: u64,
    pub mlocked_pages: u64,
    pub swapcache_pages: u64,
    /// Min watermark plus lowmem reserve of the normal zone.
    pub reserved_free_pages: u64,
    pub active_anon_pages: u64,
    pub inactive_anon_pages: u64,
    pub active_file_pages: u64,
    pub inactive_file_pages: u64,
    pub free_swap_pages: u64,
}

impl MemorySample {
    /// File cache that can actually be dropped: file pages minus shmem,
    /// mlocked pages and the swap cache.
    pub fn other_file(&self) -> u64 {
        self.file_pages
            .saturating_sub(self.shmem_pages)
            .saturating_sub(self.mlocked_pages)
            .saturating_sub(self.swapcache_pages)
    }

    /// Estimate of pages on the LRU lists, reported back to the host.
    pub fn reclaimable(&self) -> u64 {
        self.active_anon_pages
            + self.inactive_anon_pages
            + self.active_file_pages
            + self.inactive_file_pages
    }
}

/// Read-only view of one process at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    /// `oom_score_adj` style priority, higher means more expendable.
    pub priority_score: i32,
    pub resident_pages: u64,
    pub is_kernel_task: bool,
    /// Already signaled and not yet gone.
    pub memdie: bool,
}

/// Supplies global memory counters.
pub trait MemorySampler {
    fn sample(&self) -> Result<MemorySample, HostError>;
}

/// Supplies the live process set.
///
/// Each call returns a fresh, finite sequence in which every live process
/// appears at most once. No ordering is assumed.
pub trait ProcessTable {
    fn processes(&self) -> Box<dyn Iterator<Item = ProcessSnapshot> + '_>;
}

/// Delivers a fatal signal and marks the process as dying.
pub trait Terminator {
    fn terminate(&self, pid: u32) -> Result<(), TerminateError>;
}

/// A reclaim domain for the soft-reclaim pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub populated: bool,
    pub all_unreclaimable: bool,
}

/// Result of reclaiming one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneReclaim {
    pub reclaimed: u64,
    pub scanned: u64,
}

/// Performs best-effort reclaim on behalf of the background worker.
pub trait ZoneReclaimer: Send + Sync {
    fn zones(&self) -> Vec<Zone>;
    fn reclaim_zone(&self, zone: &Zone) -> ZoneReclaim;
}

/// Idle-path observation handed to the soft-reclaim gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleSample {
    pub cpu_idle: bool,
    pub kswapd_active: bool,
    pub free_swap_pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_file_subtracts_unreclaimable_cache() {
        let sample = MemorySample {
            file_pages: 10_000,
            shmem_pages: 1_000,
            mlocked_pages: 500,
            swapcache_pages: 250,
            ..Default::default()
        };
        assert_eq!(sample.other_file(), 8_250);
    }

    #[test]
    fn test_other_file_never_underflows() {
        let sample = MemorySample {
            file_pages: 100,
            shmem_pages: 400,
            ..Default::default()
        };
        assert_eq!(sample.other_file(), 0);
    }

    #[test]
    fn test_reclaimable_sums_lru_lists() {
        let sample = MemorySample {
            active_anon_pages: 1,
            inactive_anon_pages: 2,
            active_file_pages: 3,
            inactive_file_pages: 4,
            ..Default::default()
        };
        assert_eq!(sample.reclaimable(), 10);
    }
}
