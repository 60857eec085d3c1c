//! Task state parsing from /proc/<pid>/stat.

use std::fs;
use std::path::Path;

/// Per-task flag marking kernel threads.
pub const PF_KTHREAD: u64 = 0x0020_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStat {
    /// Single-letter state (R, S, D, Z, X, ...).
    pub state: char,
    pub flags: u64,
}

impl TaskStat {
    pub fn is_kernel_thread(&self) -> bool {
        self.flags & PF_KTHREAD != 0
    }

    /// Exited but not yet reaped, or already dead.
    pub fn is_exiting(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parses a stat line. The command name may contain spaces and parentheses,
/// so fields are counted from the last ')'.
pub fn parse_task_stat(content: &str) -> Option<TaskStat> {
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    // ppid pgrp session tty_nr tpgid precede flags
    let flags = fields.nth(5)?.parse().ok()?;
    Some(TaskStat { state, flags })
}

pub fn read_task_stat(proc_path: &Path) -> Option<TaskStat> {
    let content = fs::read_to_string(proc_path.join("stat")).ok()?;
    parse_task_stat(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_task() {
        let line = "1234 (my (weird) app) S 1 1234 1234 0 -1 4194560 500 0 0 0 10 5 0 0 20 0 1 0 100 1000000 250";
        let stat = parse_task_stat(line).unwrap();
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.flags, 4194560);
        assert!(!stat.is_kernel_thread());
        assert!(!stat.is_exiting());
    }

    #[test]
    fn test_parse_kernel_thread() {
        let line = "2 (kthreadd) S 0 0 0 0 -1 2129984 0 0 0 0 0 0 0 0 20 0 1 0 2 0 0";
        let stat = parse_task_stat(line).unwrap();
        assert!(stat.is_kernel_thread());
    }

    #[test]
    fn test_parse_zombie() {
        let line = "99 (gone) Z 1 99 99 0 -1 4227084 0 0 0 0 0 0 0 0 20 0 1 0 5 0 0";
        assert!(parse_task_stat(line).unwrap().is_exiting());
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(parse_task_stat("1 (init) S 0 1"), None);
        assert_eq!(parse_task_stat("garbage"), None);
    }
}
