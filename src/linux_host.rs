//! `/proc` backed host for the policy engine.
//!
//! Implements the engine's `MemorySampler`, `ProcessTable` and `Terminator`
//! traits against a proc filesystem root. Signaled pids are remembered until
//! they disappear from the process table; while they linger (and are not yet
//! zombies) they are reported as `memdie`.

use dashmap::DashMap;
use herakles_lowmem_killer::error::{HostError, TerminateError};
use herakles_lowmem_killer::host::{MemorySampler, MemorySample, ProcessSnapshot, ProcessTable, Terminator};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::process::{
    collect_proc_entries, read_priority_score, read_process_name, read_resident_pages,
    read_task_stat, ProcEntry,
};
use crate::system::read_memory_sample;

pub struct LinuxHost {
    proc_root: PathBuf,
    dry_run: bool,
    /// pid -> when SIGKILL was delivered
    signaled: DashMap<u32, Instant>,
}

impl LinuxHost {
    pub fn new(proc_root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            proc_root: proc_root.into(),
            dry_run,
            signaled: DashMap::new(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Number of signaled processes that have not exited yet.
    pub fn dying(&self) -> usize {
        self.signaled.len()
    }

    /// Records a pid as signaled without sending anything.
    pub fn mark_signaled(&self, pid: u32) {
        self.signaled.insert(pid, Instant::now());
    }

    fn snapshot(&self, entry: &ProcEntry) -> Option<ProcessSnapshot> {
        let stat = read_task_stat(&entry.proc_path)?;
        let name = read_process_name(&entry.proc_path).unwrap_or_default();
        let priority_score = read_priority_score(&entry.proc_path)?;
        // Kernel threads have no statm counters worth reading.
        let resident_pages = if stat.is_kernel_thread() {
            0
        } else {
            read_resident_pages(&entry.proc_path).unwrap_or(0)
        };
        let memdie = !stat.is_exiting() && self.signaled.contains_key(&entry.pid);
        Some(ProcessSnapshot {
            pid: entry.pid,
            name,
            priority_score,
            resident_pages,
            is_kernel_task: stat.is_kernel_thread(),
            memdie,
        })
    }

    fn prune(&self, live: &HashSet<u32>) {
        self.signaled.retain(|pid, at| {
            let keep = live.contains(pid);
            if !keep {
                debug!(pid = *pid, elapsed_ms = at.elapsed().as_millis() as u64, "signaled process exited");
            }
            keep
        });
    }
}

impl MemorySampler for LinuxHost {
    fn sample(&self) -> Result<MemorySample, HostError> {
        read_memory_sample(&self.proc_root)
    }
}

impl ProcessTable for LinuxHost {
    fn processes(&self) -> Box<dyn Iterator<Item = ProcessSnapshot> + '_> {
        let entries = collect_proc_entries(&self.proc_root);
        let snapshots: Vec<ProcessSnapshot> = entries
            .par_iter()
            .filter_map(|entry| self.snapshot(entry))
            .collect();

        if !self.signaled.is_empty() {
            let live: HashSet<u32> = entries.iter().map(|e| e.pid).collect();
            self.prune(&live);
        }

        Box::new(snapshots.into_iter())
    }
}

impl Terminator for LinuxHost {
    fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
        if self.dry_run {
            info!(pid, "dry-run: would send SIGKILL");
            return Ok(());
        }

        let raw = i32::try_from(pid).map_err(|_| TerminateError::NoSuchProcess(pid))?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                self.mark_signaled(pid);
                Ok(())
            }
            Err(Errno::ESRCH) => Err(TerminateError::NoSuchProcess(pid)),
            Err(Errno::EPERM) => Err(TerminateError::PermissionDenied(pid)),
            Err(e) => {
                warn!(pid, error = %e, "kill failed");
                Err(TerminateError::Failed {
                    pid,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_proc(root: &Path, pid: u32, state: char, flags: u64, adj: i32, rss: u64) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("stat"),
            format!("{pid} (proc {pid}) {state} 1 1 1 0 -1 {flags} 0 0 0 0\n"),
        )
        .unwrap();
        fs::write(dir.join("comm"), format!("proc{pid}\n")).unwrap();
        fs::write(dir.join("oom_score_adj"), format!("{adj}\n")).unwrap();
        fs::write(dir.join("statm"), format!("{} {rss} 0 0 0 0 0\n", rss * 2)).unwrap();
    }

    fn sorted(host: &LinuxHost) -> Vec<ProcessSnapshot> {
        let mut v: Vec<_> = host.processes().collect();
        v.sort_by_key(|p| p.pid);
        v
    }

    #[test]
    fn test_processes_reads_proc_tree() {
        let root = tempfile::tempdir().unwrap();
        fake_proc(root.path(), 2, 'S', 0x0020_0040, 0, 0);
        fake_proc(root.path(), 100, 'S', 0x0040_0100, 900, 2500);
        fake_proc(root.path(), 101, 'R', 0x0040_0100, -1000, 800);

        let host = LinuxHost::new(root.path(), true);
        let procs = sorted(&host);
        assert_eq!(procs.len(), 3);

        assert!(procs[0].is_kernel_task);
        assert_eq!(procs[0].resident_pages, 0);

        assert_eq!(procs[1].name, "proc100");
        assert_eq!(procs[1].priority_score, 900);
        assert_eq!(procs[1].resident_pages, 2500);
        assert!(!procs[1].is_kernel_task);
        assert!(!procs[1].memdie);

        assert_eq!(procs[2].priority_score, -1000);
    }

    #[test]
    fn test_signaled_process_is_memdie_until_gone() {
        let root = tempfile::tempdir().unwrap();
        fake_proc(root.path(), 100, 'S', 0, 900, 2500);
        fake_proc(root.path(), 101, 'Z', 0, 900, 0);

        let host = LinuxHost::new(root.path(), true);
        host.mark_signaled(100);
        host.mark_signaled(101);

        let procs = sorted(&host);
        assert!(procs[0].memdie);
        // zombies already released their memory
        assert!(!procs[1].memdie);
        assert_eq!(host.dying(), 2);

        fs::remove_dir_all(root.path().join("100")).unwrap();
        fs::remove_dir_all(root.path().join("101")).unwrap();
        assert!(host.processes().next().is_none());
        assert_eq!(host.dying(), 0);
    }

    #[test]
    fn test_dry_run_does_not_signal() {
        let root = tempfile::tempdir().unwrap();
        let host = LinuxHost::new(root.path(), true);
        assert!(host.terminate(u32::MAX).is_ok());
        assert_eq!(host.dying(), 0);
    }

    #[test]
    fn test_sample_requires_meminfo() {
        let root = tempfile::tempdir().unwrap();
        let host = LinuxHost::new(root.path(), true);
        assert!(host.sample().is_err());
    }
}
