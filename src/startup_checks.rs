//! Startup requirement validation for herakles-lowmem-killer.
//!
//! This module validates that the daemon has the permissions and kernel
//! interfaces it depends on before it starts acting on memory pressure.

use nix::unistd::geteuid;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::cgroup::check_cgroup;

/// Validate all runtime requirements
pub fn validate_requirements(
    proc_root: &Path,
    cgroups: &[PathBuf],
    dry_run: bool,
) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges(dry_run)?;
    check_memory_counters(proc_root)?;
    check_proc_access(proc_root)?;
    check_cgroups(cgroups)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges to signal any process
fn check_user_privileges(dry_run: bool) -> Result<(), ValidationError> {
    if geteuid().is_root() {
        info!("✅ Running as root (uid=0)");
        return Ok(());
    }
    if dry_run {
        warn!("⚠️  Not running as root - fine for --dry-run, victims are only logged");
        return Ok(());
    }
    warn!("⚠️  Not running as root - SIGKILL will fail for other users' processes");
    warn!("   Recommendation: run as root or grant CAP_KILL:");
    warn!("      setcap cap_kill+ep /path/to/binary");
    Ok(())
}

/// Check that /proc/meminfo is readable and /proc/zoneinfo exists
fn check_memory_counters(proc_root: &Path) -> Result<(), ValidationError> {
    let meminfo = proc_root.join("meminfo");
    if let Err(e) = fs::read_to_string(&meminfo) {
        error!("❌ Cannot read {}: {}", meminfo.display(), e);
        return Err(ValidationError::MemoryCounters(format!(
            "{}: {}",
            meminfo.display(),
            e
        )));
    }
    info!("✅ {} readable", meminfo.display());

    let zoneinfo = proc_root.join("zoneinfo");
    if zoneinfo.exists() {
        info!("✅ {} readable", zoneinfo.display());
    } else {
        warn!(
            "⚠️  {} not found - zone reserve treated as 0",
            zoneinfo.display()
        );
    }
    Ok(())
}

/// Check per-process files of init, which only root can fully read
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    let test_file = proc_root.join("1").join("oom_score_adj");

    match fs::metadata(&test_file) {
        Ok(_) => {
            info!("✅ /proc access: Can read process priorities");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", test_file.display());
            error!("   Processes that cannot be read are never considered as victims!");
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test /proc access: {}", e);
            Ok(()) // Continue but warn
        }
    }
}

/// Check every configured soft-reclaim cgroup
fn check_cgroups(cgroups: &[PathBuf]) -> Result<(), ValidationError> {
    if cgroups.is_empty() {
        info!("ℹ️  No soft-reclaim cgroups configured");
        return Ok(());
    }
    for cgroup in cgroups {
        if let Err(e) = check_cgroup(cgroup) {
            error!("❌ cgroup {} unusable: {:#}", cgroup.display(), e);
            return Err(ValidationError::Cgroup {
                path: cgroup.clone(),
                reason: format!("{:#}", e),
            });
        }
        info!("✅ cgroup {} supports memory.reclaim", cgroup.display());
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("Memory counters unavailable: {0}")]
    MemoryCounters(String),

    #[error("cgroup {path:?} unusable: {reason}")]
    Cgroup { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_meminfo_fails() {
        let root = tempfile::tempdir().unwrap();
        let err = validate_requirements(root.path(), &[], true).unwrap_err();
        assert!(matches!(err, ValidationError::MemoryCounters(_)));
    }

    #[test]
    fn test_minimal_proc_passes() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("meminfo"), "MemFree: 1 kB\n").unwrap();
        assert!(validate_requirements(root.path(), &[], true).is_ok());
    }

    #[test]
    fn test_bad_cgroup_fails() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("meminfo"), "MemFree: 1 kB\n").unwrap();
        let cg = root.path().join("no-such-cgroup");
        let err = validate_requirements(root.path(), &[cg], true).unwrap_err();
        assert!(matches!(err, ValidationError::Cgroup { .. }));
    }
}
