//! Memory parsing for process footprints.
//!
//! The policy ranks by resident pages, which `/proc/<pid>/statm` reports
//! directly in pages without walking smaps.

use std::fs;
use std::path::Path;

/// Parses the resident field (second column) of a statm line.
pub fn parse_statm_resident(content: &str) -> Option<u64> {
    content.split_whitespace().nth(1)?.parse().ok()
}

/// Resident pages of a process. `None` if the process is gone.
pub fn read_resident_pages(proc_path: &Path) -> Option<u64> {
    let content = fs::read_to_string(proc_path.join("statm")).ok()?;
    parse_statm_resident(&content)
}
