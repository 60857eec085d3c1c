//! cgroup v2 backed reclaim domains for the soft-reclaim worker.
//!
//! Each configured cgroup directory is one zone. A pass writes a byte
//! budget to `memory.reclaim` and measures `memory.current` around it.

use anyhow::{Context, Result};
use herakles_lowmem_killer::host::{Zone, ZoneReclaim, ZoneReclaimer};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::system::PAGE_SIZE;

const CURRENT_FILE: &str = "memory.current";
const RECLAIM_FILE: &str = "memory.reclaim";

pub struct CgroupReclaimer {
    cgroups: Vec<PathBuf>,
    chunk_pages: u64,
}

impl CgroupReclaimer {
    pub fn new(cgroups: Vec<PathBuf>, chunk_pages: u64) -> Self {
        Self {
            cgroups,
            chunk_pages,
        }
    }

    fn path_of(&self, zone: &Zone) -> Option<&Path> {
        self.cgroups
            .iter()
            .find(|p| p.to_string_lossy() == zone.name)
            .map(PathBuf::as_path)
    }
}

/// Charged memory of a cgroup, in pages.
pub fn read_current_pages(cgroup: &Path) -> Result<u64> {
    let path = cgroup.join(CURRENT_FILE);
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let bytes: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(bytes / *PAGE_SIZE)
}

/// Asks the kernel to reclaim `pages` from the cgroup.
///
/// The kernel answers EAGAIN when it reclaimed less than asked; that is
/// still progress and is not reported as an error.
pub fn write_reclaim(cgroup: &Path, pages: u64) -> Result<()> {
    let path = cgroup.join(RECLAIM_FILE);
    match fs::write(&path, (pages * *PAGE_SIZE).to_string()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e).with_context(|| format!("writing {}", path.display())),
    }
}

/// Verifies that a cgroup exposes both files the reclaimer needs.
pub fn check_cgroup(cgroup: &Path) -> Result<()> {
    read_current_pages(cgroup)?;
    let reclaim = cgroup.join(RECLAIM_FILE);
    if !reclaim.exists() {
        anyhow::bail!("{} not found (kernel 5.19+ required)", reclaim.display());
    }
    Ok(())
}

impl ZoneReclaimer for CgroupReclaimer {
    fn zones(&self) -> Vec<Zone> {
        self.cgroups
            .iter()
            .map(|path| {
                let current = read_current_pages(path).ok();
                Zone {
                    name: path.to_string_lossy().into_owned(),
                    populated: current.is_some(),
                    all_unreclaimable: current == Some(0),
                }
            })
            .collect()
    }

    fn reclaim_zone(&self, zone: &Zone) -> ZoneReclaim {
        let Some(path) = self.path_of(zone) else {
            return ZoneReclaim::default();
        };

        let before = match read_current_pages(path) {
            Ok(v) => v,
            Err(e) => {
                warn!(cgroup = %zone.name, error = %e, "cgroup vanished before reclaim");
                return ZoneReclaim::default();
            }
        };
        let budget = self.chunk_pages.min(before);
        if let Err(e) = write_reclaim(path, budget) {
            warn!(cgroup = %zone.name, error = %e, "memory.reclaim write failed");
            return ZoneReclaim::default();
        }
        let after = read_current_pages(path).unwrap_or(before);

        let reclaimed = before.saturating_sub(after);
        debug!(cgroup = %zone.name, budget, reclaimed, "cgroup reclaim");
        ZoneReclaim {
            reclaimed,
            scanned: budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_cgroup(root: &Path, name: &str, current_pages: u64) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CURRENT_FILE), format!("{}\n", current_pages * *PAGE_SIZE)).unwrap();
        fs::write(dir.join(RECLAIM_FILE), "").unwrap();
        dir
    }

    #[test]
    fn test_zones_from_cgroups() {
        let root = tempfile::tempdir().unwrap();
        let busy = fake_cgroup(root.path(), "busy", 1000);
        let empty = fake_cgroup(root.path(), "empty", 0);
        let missing = root.path().join("missing");

        let r = CgroupReclaimer::new(vec![busy, empty, missing], 64);
        let zones = r.zones();
        assert_eq!(zones.len(), 3);
        assert!(zones[0].populated && !zones[0].all_unreclaimable);
        assert!(zones[1].populated && zones[1].all_unreclaimable);
        assert!(!zones[2].populated);
    }

    #[test]
    fn test_reclaim_writes_budget_in_bytes() {
        let root = tempfile::tempdir().unwrap();
        let cg = fake_cgroup(root.path(), "app", 1000);
        let r = CgroupReclaimer::new(vec![cg.clone()], 64);

        let zone = r.zones().remove(0);
        let res = r.reclaim_zone(&zone);

        // A plain file does not shrink, so nothing was reclaimed.
        assert_eq!(res.reclaimed, 0);
        assert_eq!(res.scanned, 64);
        let written = fs::read_to_string(cg.join(RECLAIM_FILE)).unwrap();
        assert_eq!(written, (64 * *PAGE_SIZE).to_string());
    }

    #[test]
    fn test_reclaim_unknown_zone_is_noop() {
        let r = CgroupReclaimer::new(Vec::new(), 64);
        let zone = Zone {
            name: "nowhere".into(),
            populated: true,
            all_unreclaimable: false,
        };
        assert_eq!(r.reclaim_zone(&zone), ZoneReclaim::default());
    }

    #[test]
    fn test_check_cgroup() {
        let root = tempfile::tempdir().unwrap();
        let cg = fake_cgroup(root.path(), "ok", 10);
        assert!(check_cgroup(&cg).is_ok());
        fs::remove_file(cg.join(RECLAIM_FILE)).unwrap();
        assert!(check_cgroup(&cg).is_err());
        assert!(check_cgroup(&root.path().join("nope")).is_err());
    }
}
