//! Pressure tiers: which priority cutoff applies at the current free memory.
//!
//! A table is an ascending list of `(priority_cutoff, min_free_pages)` pairs.
//! The first tier whose threshold is crossed wins, so the smallest thresholds
//! (the most severe pressure) carry the lowest cutoffs.
//!
//! A tier is crossed only when *both* free memory and droppable file cache are
//! below its threshold, so a large file cache alone holds killing back. Do not
//! relax this to either-or.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::clock::as_millis;
use crate::error::ConfigError;
use crate::shared::DebugLevel;

/// Maximum number of tiers a table may hold.
pub const MAX_TIERS: usize = 6;

/// Highest value on the legacy `oom_adj` scale.
pub const OOM_ADJUST_MAX: i32 = 15;
/// Legacy `oom_adj` value meaning "never kill".
pub const OOM_DISABLE: i32 = -17;
/// Highest value on the `oom_score_adj` scale.
pub const OOM_SCORE_ADJ_MAX: i32 = 1000;

const STOCK_ADJ: [i32; 4] = [0, 1, 6, 12];
const STOCK_MINFREE: [u64; 4] = [3 * 512, 2 * 1024, 4 * 1024, 16 * 1024];
/// Boost pages shipped for the fork-burst window, one per possible tier.
pub const STOCK_FORK_BOOST: [u64; MAX_TIERS] = [0, 0, 0, 5120, 6177, 6177];

/// One pressure tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub priority_cutoff: i32,
    pub min_free_pages: u64,
    /// Extra pages added to the threshold while a boost window is open.
    pub boost_pages: u64,
}

impl ThresholdEntry {
    pub fn effective_threshold(&self, boosted: bool) -> u64 {
        if boosted {
            self.min_free_pages.saturating_add(self.boost_pages)
        } else {
            self.min_free_pages
        }
    }
}

/// The tier selected by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub priority_cutoff: i32,
    pub boost_pages: u64,
    /// Threshold that was compared against, boost included.
    pub threshold: u64,
}

/// Ordered, bounded list of pressure tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdTable {
    entries: Vec<ThresholdEntry>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let entries = STOCK_ADJ
            .iter()
            .zip(STOCK_MINFREE.iter())
            .zip(STOCK_FORK_BOOST.iter())
            .map(|((&adj, &minfree), &boost)| ThresholdEntry {
                priority_cutoff: adj,
                min_free_pages: minfree,
                boost_pages: boost,
            })
            .collect();
        Self { entries }
    }
}

impl ThresholdTable {
    /// Builds a table from already paired entries.
    pub fn new(entries: Vec<ThresholdEntry>) -> Result<Self, ConfigError> {
        if entries.len() > MAX_TIERS {
            return Err(ConfigError::TooManyTiers {
                len: entries.len(),
                max: MAX_TIERS,
            });
        }
        if let Some(index) = first_descent(entries.iter().map(|e| e.min_free_pages)) {
            return Err(ConfigError::Unsorted {
                list: "minfree",
                index,
            });
        }
        if let Some(index) = first_descent(entries.iter().map(|e| e.priority_cutoff)) {
            return Err(ConfigError::Unsorted { list: "adj", index });
        }
        Ok(Self { entries })
    }

    /// Builds a table from the three operator lists.
    ///
    /// `adj` and `minfree` must pair up exactly. `boost` may be shorter (missing
    /// tiers get no boost) or longer (extra values are ignored) but never more
    /// than [`MAX_TIERS`] long.
    pub fn from_lists(adj: &[i32], minfree: &[u64], boost: &[u64]) -> Result<Self, ConfigError> {
        if adj.len() > MAX_TIERS || minfree.len() > MAX_TIERS || boost.len() > MAX_TIERS {
            return Err(ConfigError::TooManyTiers {
                len: adj.len().max(minfree.len()).max(boost.len()),
                max: MAX_TIERS,
            });
        }
        if adj.len() != minfree.len() {
            return Err(ConfigError::LengthMismatch {
                adj: adj.len(),
                minfree: minfree.len(),
            });
        }

        let entries = adj
            .iter()
            .zip(minfree.iter())
            .enumerate()
            .map(|(i, (&priority_cutoff, &min_free_pages))| ThresholdEntry {
                priority_cutoff,
                min_free_pages,
                boost_pages: boost.get(i).copied().unwrap_or(0),
            })
            .collect();
        Self::new(entries)
    }

    /// Returns a copy of this table with a new boost list.
    pub fn with_boost(&self, boost: &[u64]) -> Result<Self, ConfigError> {
        Self::from_lists(&self.cutoffs(), &self.min_free(), boost)
    }

    pub fn entries(&self) -> &[ThresholdEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cutoffs(&self) -> Vec<i32> {
        self.entries.iter().map(|e| e.priority_cutoff).collect()
    }

    pub fn min_free(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.min_free_pages).collect()
    }

    pub fn boosts(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.boost_pages).collect()
    }

    /// Finds the first crossed tier.
    ///
    /// Free memory below `reserved_free` always counts as a deficit. `None`
    /// means no pressure, which is not the same as matching the laxest tier.
    pub fn lookup(
        &self,
        free_pages: u64,
        file_pages: u64,
        reserved_free: u64,
        boosted: bool,
    ) -> Option<Tier> {
        let other_free = i128::from(free_pages) - i128::from(reserved_free);
        let other_file = i128::from(file_pages);

        self.entries.iter().find_map(|entry| {
            let threshold = entry.effective_threshold(boosted);
            let limit = i128::from(threshold);
            if other_free < limit && other_file < limit {
                Some(Tier {
                    priority_cutoff: entry.priority_cutoff,
                    boost_pages: entry.boost_pages,
                    threshold,
                })
            } else {
                None
            }
        })
    }

    /// Rewrites legacy `oom_adj` cutoffs into `oom_score_adj` units.
    ///
    /// Only applies when the last cutoff is still on the legacy scale and
    /// would land above it after conversion. Returns the rewritten pairs,
    /// empty when nothing changed.
    pub fn autodetect_score_adj(&mut self) -> Vec<AdjConversion> {
        let Some(last) = self.entries.last() else {
            return Vec::new();
        };
        if last.priority_cutoff > OOM_ADJUST_MAX {
            return Vec::new();
        }
        if oom_adj_to_score_adj(last.priority_cutoff) <= OOM_ADJUST_MAX {
            return Vec::new();
        }

        self.entries
            .iter_mut()
            .map(|entry| {
                let oom_adj = entry.priority_cutoff;
                entry.priority_cutoff = oom_adj_to_score_adj(oom_adj);
                (oom_adj, entry.priority_cutoff)
            })
            .collect()
    }
}

/// A cutoff rewritten by autodetection: `(oom_adj, oom_score_adj)`.
pub type AdjConversion = (i32, i32);

/// Logs autodetected conversions at debug level 1 and above.
pub fn log_conversions(conversions: &[AdjConversion], debug: &DebugLevel) {
    if conversions.is_empty() || !debug.enabled(1) {
        return;
    }
    info!("lowmem_shrink: convert oom_adj to oom_score_adj:");
    for (oom_adj, score_adj) in conversions {
        info!("oom_adj {} => oom_score_adj {}", oom_adj, score_adj);
    }
}

/// Converts a legacy `oom_adj` value to the `oom_score_adj` scale.
pub fn oom_adj_to_score_adj(oom_adj: i32) -> i32 {
    if oom_adj == OOM_ADJUST_MAX {
        OOM_SCORE_ADJ_MAX
    } else {
        oom_adj * OOM_SCORE_ADJ_MAX / -OOM_DISABLE
    }
}

fn first_descent<T: PartialOrd>(values: impl Iterator<Item = T>) -> Option<usize> {
    let mut prev: Option<T> = None;
    for (i, v) in values.enumerate() {
        if let Some(p) = &prev {
            if v < *p {
                return Some(i);
            }
        }
        prev = Some(v);
    }
    None
}

/// Transient widening of every threshold after a burst of process creation.
///
/// The window is open while `now < deadline`; a new burst moves the deadline.
#[derive(Debug)]
pub struct BoostWindow {
    enabled: AtomicBool,
    duration_ms: AtomicU64,
    deadline_ms: AtomicU64,
}

impl BoostWindow {
    pub fn new(enabled: bool, duration: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            duration_ms: AtomicU64::new(as_millis(duration)),
            deadline_ms: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.load(Ordering::Relaxed))
    }

    pub fn set_duration(&self, duration: Duration) {
        self.duration_ms.store(as_millis(duration), Ordering::Relaxed);
    }

    /// Opens (or re-opens) the window starting at `now`.
    pub fn note_fork_burst(&self, now: Duration) {
        let deadline = as_millis(now).saturating_add(self.duration_ms.load(Ordering::Relaxed));
        self.deadline_ms.store(deadline, Ordering::Release);
    }

    pub fn is_active(&self, now: Duration) -> bool {
        self.is_enabled() && as_millis(now) < self.deadline_ms.load(Ordering::Acquire)
    }

    /// Time left in the open window, if any.
    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        if !self.is_active(now) {
            return None;
        }
        let left = self
            .deadline_ms
            .load(Ordering::Acquire)
            .saturating_sub(as_millis(now));
        Some(Duration::from_millis(left))
    }
}
