//! Candidate selection over the live process set.

use tracing::{debug, info};

use crate::host::ProcessSnapshot;
use crate::pool::{CandidatePool, CandidateSlot};

/// Result of one selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Eligible victims, best first. Never empty.
    Victims(Vec<CandidateSlot>),
    /// Nothing eligible.
    Empty,
    /// A previously signaled process is still alive inside the hysteresis window.
    DeathPending { pid: u32, name: String },
}

/// Walks a process sequence and keeps the best K eligible candidates.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    capacity: usize,
    log_decisions: bool,
}

impl CandidateSelector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            log_decisions: false,
        }
    }

    /// Logs every admission and rejection at info level.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_decisions = enabled;
        self
    }

    pub fn is_eligible(process: &ProcessSnapshot, cutoff: i32) -> bool {
        !process.is_kernel_task && process.resident_pages > 0 && process.priority_score >= cutoff
    }

    pub fn select<I>(&self, cutoff: i32, processes: I, hysteresis_active: bool) -> Selection
    where
        I: IntoIterator<Item = ProcessSnapshot>,
    {
        let mut pool = CandidatePool::new(self.capacity);

        for process in processes {
            if process.is_kernel_task {
                continue;
            }
            if process.memdie && hysteresis_active {
                return Selection::DeathPending {
                    pid: process.pid,
                    name: process.name,
                };
            }
            if !Self::is_eligible(&process, cutoff) {
                continue;
            }

            let slot = CandidateSlot::from(&process);
            let admitted = pool.try_insert(slot);
            if self.log_decisions {
                if admitted {
                    info!(
                        "select '{}' ({}), adj {}, size {}, to kill",
                        process.name, process.pid, process.priority_score, process.resident_pages
                    );
                } else {
                    info!(
                        "skip '{}' ({}), adj {}, size {}, to kill",
                        process.name, process.pid, process.priority_score, process.resident_pages
                    );
                }
            }
        }

        if pool.is_empty() {
            debug!(cutoff, "no eligible candidate");
            Selection::Empty
        } else {
            Selection::Victims(pool.into_ranked())
        }
    }
}
