//! Process-related modules for reading the per-process view the policy needs.
//!
//! This module provides:
//! - `scanner`: Process discovery, names and kill priority
//! - `memory`: Resident set size from /proc/<pid>/statm
//! - `stat`: Task state and kernel-thread flag from /proc/<pid>/stat

pub mod memory;
pub mod scanner;
pub mod stat;

// Re-export commonly used types
pub use memory::read_resident_pages;
pub use scanner::{collect_proc_entries, read_priority_score, read_process_name, ProcEntry};
pub use stat::read_task_stat;
