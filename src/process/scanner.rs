//! Process scanning utilities for discovering and reading process entries from /proc.
//!
//! This module provides functions to scan the /proc filesystem for process entries
//! and read process information like names and kill priority.

use herakles_lowmem_killer::thresholds::oom_adj_to_score_adj;
use std::fs;
use std::path::{Path, PathBuf};

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Scans the proc root for process entries with numeric PIDs.
pub fn collect_proc_entries(root: &Path) -> Vec<ProcEntry> {
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.flatten() {
            let p = entry.path();
            let name = match p.file_name().and_then(|s| s.to_str()) {
                Some(v) => v,
                None => continue,
            };
            if !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let pid: u32 = match name.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            out.push(ProcEntry { pid, proc_path: p });
        }
    }
    out
}

/// Reads process name from comm file or extracts from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    let comm = proc_path.join("comm");
    if let Ok(s) = fs::read_to_string(&comm) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let cmd = proc_path.join("cmdline");
    if let Ok(content) = fs::read(&cmd) {
        if !content.is_empty() {
            let first = content
                .split(|&b| b == 0u8)
                .find_map(|s| std::str::from_utf8(s).ok())?;
            return Path::new(first)
                .file_name()
                .and_then(|name| name.to_str())
                .map(|s| s.to_string());
        }
    }
    None
}

/// Reads the kill priority on the `oom_score_adj` scale.
///
/// Falls back to the legacy `oom_adj` file, converted, on kernels without
/// `oom_score_adj`.
pub fn read_priority_score(proc_path: &Path) -> Option<i32> {
    if let Ok(s) = fs::read_to_string(proc_path.join("oom_score_adj")) {
        return s.trim().parse().ok();
    }
    let legacy: i32 = fs::read_to_string(proc_path.join("oom_adj"))
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(oom_adj_to_score_adj(legacy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc(root: &Path, pid: u32, files: &[(&str, &[u8])]) -> PathBuf {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
        dir
    }

    // -------------------------------------------------------------------------
    // Tests for collect_proc_entries
    // -------------------------------------------------------------------------

    #[test]
    fn test_collect_only_numeric_entries() {
        let root = tempfile::tempdir().unwrap();
        fake_proc(root.path(), 1, &[]);
        fake_proc(root.path(), 42, &[]);
        fs::create_dir_all(root.path().join("self")).unwrap();
        fs::write(root.path().join("meminfo"), "").unwrap();

        let mut pids: Vec<u32> = collect_proc_entries(root.path())
            .into_iter()
            .map(|e| e.pid)
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 42]);
    }

    #[test]
    fn test_collect_missing_root() {
        assert!(collect_proc_entries(Path::new("/nonexistent/proc")).is_empty());
    }

    // -------------------------------------------------------------------------
    // Tests for read_process_name / read_priority_score
    // -------------------------------------------------------------------------

    #[test]
    fn test_name_prefers_comm() {
        let root = tempfile::tempdir().unwrap();
        let p = fake_proc(root.path(), 7, &[("comm", b"worker\n"), ("cmdline", b"/usr/bin/other\0--flag\0")]);
        assert_eq!(read_process_name(&p).as_deref(), Some("worker"));
    }

    #[test]
    fn test_name_falls_back_to_cmdline() {
        let root = tempfile::tempdir().unwrap();
        let p = fake_proc(root.path(), 7, &[("comm", b"\n"), ("cmdline", b"/usr/bin/browser\0--tab\0")]);
        assert_eq!(read_process_name(&p).as_deref(), Some("browser"));
    }

    #[test]
    fn test_priority_score_prefers_score_adj() {
        let root = tempfile::tempdir().unwrap();
        let p = fake_proc(root.path(), 7, &[("oom_score_adj", b"900\n"), ("oom_adj", b"15\n")]);
        assert_eq!(read_priority_score(&p), Some(900));
    }

    #[test]
    fn test_priority_score_converts_legacy() {
        let root = tempfile::tempdir().unwrap();
        let p = fake_proc(root.path(), 7, &[("oom_adj", b"6\n")]);
        assert_eq!(read_priority_score(&p), Some(352));

        let gone = root.path().join("8");
        assert_eq!(read_priority_score(&gone), None);
    }
}
