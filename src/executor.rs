//! Eviction: signal the chosen victims and open the hysteresis window.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::host::Terminator;
use crate::pool::CandidateSlot;
use crate::shared::{KillRecord, SharedState};

/// What happened to one batch of victims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub signaled: Vec<CandidateSlot>,
    pub failed: Vec<u32>,
    pub pages_reclaimed: u64,
}

pub struct Executor {
    shared: Arc<SharedState>,
    hysteresis: Duration,
}

impl Executor {
    pub fn new(shared: &Arc<SharedState>, hysteresis: Duration) -> Self {
        Self {
            shared: Arc::clone(shared),
            hysteresis,
        }
    }

    /// Signals every victim once. Failures are logged and skipped.
    pub fn execute<T>(
        &self,
        victims: Vec<CandidateSlot>,
        cutoff: i32,
        terminator: &T,
        now: Duration,
    ) -> Execution
    where
        T: Terminator + ?Sized,
    {
        let mut execution = Execution::default();

        for victim in victims {
            match terminator.terminate(victim.pid) {
                Ok(()) => {
                    if self.shared.debug.enabled(1) {
                        info!(
                            "send sigkill to {} ({}), adj {}, size {}",
                            victim.pid, victim.name, victim.priority_score, victim.resident_pages
                        );
                    }
                    self.shared.record_kill(KillRecord {
                        pid: victim.pid,
                        name: victim.name.clone(),
                        priority_score: victim.priority_score,
                        resident_pages: victim.resident_pages,
                        cutoff,
                        at: Utc::now(),
                    });
                    execution.pages_reclaimed += victim.resident_pages;
                    execution.signaled.push(victim);
                }
                Err(e) => {
                    warn!("failed to kill {} ({}): {}", victim.pid, victim.name, e);
                    execution.failed.push(victim.pid);
                }
            }
        }

        if !execution.signaled.is_empty() {
            self.shared.scan.arm_deadline(now, self.hysteresis);
        }
        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerminateError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        refuse: Vec<u32>,
        signaled: Mutex<Vec<u32>>,
    }

    impl Terminator for Recorder {
        fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
            if self.refuse.contains(&pid) {
                return Err(TerminateError::PermissionDenied(pid));
            }
            self.signaled.lock().unwrap().push(pid);
            Ok(())
        }
    }

    fn victim(pid: u32, pages: u64) -> CandidateSlot {
        CandidateSlot {
            pid,
            name: format!("v{}", pid),
            priority_score: 900,
            resident_pages: pages,
        }
    }

    #[test]
    fn test_execute_signals_all_and_arms_deadline() {
        let shared = Arc::new(SharedState::default());
        let exec = Executor::new(&shared, Duration::from_secs(1));
        let term = Recorder::default();

        let out = exec.execute(vec![victim(1, 100), victim(2, 50)], 0, &term, Duration::from_secs(5));
        assert_eq!(out.pages_reclaimed, 150);
        assert_eq!(out.signaled.len(), 2);
        assert!(out.failed.is_empty());
        assert_eq!(*term.signaled.lock().unwrap(), vec![1, 2]);
        assert_eq!(shared.kill_count(), 2);
        assert_eq!(shared.scan.deadline(), Duration::from_secs(6));
        assert_eq!(shared.recent_kills()[0].pid, 2);
    }

    #[test]
    fn test_execute_skips_failures() {
        let shared = Arc::new(SharedState::default());
        let exec = Executor::new(&shared, Duration::from_secs(1));
        let term = Recorder {
            refuse: vec![1],
            ..Default::default()
        };

        let out = exec.execute(vec![victim(1, 100), victim(2, 50)], 0, &term, Duration::ZERO);
        assert_eq!(out.failed, vec![1]);
        assert_eq!(out.pages_reclaimed, 50);
        assert_eq!(shared.kill_count(), 1);
    }

    #[test]
    fn test_execute_nothing_signaled_leaves_deadline() {
        let shared = Arc::new(SharedState::default());
        let exec = Executor::new(&shared, Duration::from_secs(1));
        let term = Recorder {
            refuse: vec![1],
            ..Default::default()
        };

        exec.execute(vec![victim(1, 100)], 0, &term, Duration::from_secs(3));
        assert!(!shared.scan.hysteresis_active(Duration::from_secs(3)));
    }
}
