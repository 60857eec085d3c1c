//! System-wide counters read from the /proc filesystem.
//!
//! This module provides the readers behind the Linux host: memory counters
//! from /proc/meminfo and /proc/zoneinfo, CPU idle time and the fork counter
//! from /proc/stat, load average, and kswapd activity from /proc/vmstat.
//! Every reader takes the proc root so tests can point it at a temp tree.

use herakles_lowmem_killer::error::HostError;
use herakles_lowmem_killer::MemorySample;
use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// System page size in bytes.
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(|| {
    // SAFETY: sysconf is safe to call with _SC_PAGESIZE
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
});

pub fn kb_to_pages(kb: u64) -> u64 {
    kb * 1024 / *PAGE_SIZE
}

fn read_proc_file(proc_root: &Path, name: &str) -> Result<String, HostError> {
    let path = proc_root.join(name);
    fs::read_to_string(&path).map_err(|e| HostError::io(path.display().to_string(), e))
}

/// Parses the kB value of a "Key:   1234 kB" line.
fn meminfo_kb(line: &str) -> Option<u64> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Parses /proc/meminfo content into page counts.
///
/// File pages are `Cached + Buffers + SwapCached`, matching the kernel's
/// NR_FILE_PAGES. The reserve is left at zero, see [`parse_zoneinfo_reserve`].
pub fn parse_meminfo(content: &str) -> Result<MemorySample, HostError> {
    let mut sample = MemorySample::default();
    let mut saw_free = false;
    let mut file_kb = 0u64;

    for line in content.lines() {
        let Some((key, _)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = meminfo_kb(line) else {
            continue;
        };
        let pages = kb_to_pages(kb);
        match key {
            "MemFree" => {
                sample.free_pages = pages;
                saw_free = true;
            }
            "Cached" | "Buffers" => file_kb += kb,
            "SwapCached" => {
                file_kb += kb;
                sample.swapcache_pages = pages;
            }
            "Shmem" => sample.shmem_pages = pages,
            "Mlocked" => sample.mlocked_pages = pages,
            "Active(anon)" => sample.active_anon_pages = pages,
            "Inactive(anon)" => sample.inactive_anon_pages = pages,
            "Active(file)" => sample.active_file_pages = pages,
            "Inactive(file)" => sample.inactive_file_pages = pages,
            "SwapFree" => sample.free_swap_pages = pages,
            _ => {}
        }
    }

    if !saw_free {
        return Err(HostError::Parse {
            what: "meminfo",
            detail: "MemFree not found".into(),
        });
    }
    sample.file_pages = kb_to_pages(file_kb);
    Ok(sample)
}

/// Reserved free pages of the first Normal zone: its `min` watermark plus
/// its own entry of the `protection` array. Zero when there is no Normal zone.
pub fn parse_zoneinfo_reserve(content: &str) -> u64 {
    let mut node: Option<&str> = None;
    let mut zone_index = 0usize;
    let mut in_normal = false;
    let mut min: Option<u64> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        // "Node 0, zone   Normal"
        if let Some(rest) = trimmed.strip_prefix("Node ") {
            if in_normal {
                break;
            }
            let this_node = rest.split(',').next().unwrap_or("").trim();
            if node == Some(this_node) {
                zone_index += 1;
            } else {
                node = Some(this_node);
                zone_index = 0;
            }
            in_normal = rest.split_whitespace().last() == Some("Normal");
            continue;
        }
        if !in_normal {
            continue;
        }
        if let Some(v) = trimmed.strip_prefix("min ") {
            min = v.trim().parse().ok();
        } else if let Some(list) = trimmed.strip_prefix("protection:") {
            let protection: Vec<u64> = list
                .trim()
                .trim_start_matches('(')
                .trim_end_matches(')')
                .split(',')
                .filter_map(|v| v.trim().parse().ok())
                .collect();
            let own = protection.get(zone_index).copied().unwrap_or(0);
            return min.unwrap_or(0) + own;
        }
    }

    if in_normal {
        min.unwrap_or(0)
    } else {
        0
    }
}

/// Reads memory counters and the Normal zone reserve.
pub fn read_memory_sample(proc_root: &Path) -> Result<MemorySample, HostError> {
    let mut sample = parse_meminfo(&read_proc_file(proc_root, "meminfo")?)?;
    // zoneinfo is optional, containers often hide it
    if let Ok(zoneinfo) = read_proc_file(proc_root, "zoneinfo") {
        sample.reserved_free_pages = parse_zoneinfo_reserve(&zoneinfo);
    }
    Ok(sample)
}

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// Parses /proc/loadavg. Format: "0.00 0.01 0.05 1/234 5678"
pub fn parse_load_average(content: &str) -> Result<LoadAverage, HostError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(HostError::Parse {
            what: "loadavg",
            detail: format!("expected at least 3 fields, got {}", parts.len()),
        });
    }
    let field = |i: usize| {
        parts[i].parse::<f64>().map_err(|e| HostError::Parse {
            what: "loadavg",
            detail: e.to_string(),
        })
    };
    Ok(LoadAverage {
        one_min: field(0)?,
        five_min: field(1)?,
        fifteen_min: field(2)?,
    })
}

pub fn read_load_average(proc_root: &Path) -> Result<LoadAverage, HostError> {
    parse_load_average(&read_proc_file(proc_root, "loadavg")?)
}

/// Aggregate CPU times from the "cpu" line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuStat {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Non-active time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// The parts of /proc/stat the daemon uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatCounters {
    pub cpu: CpuStat,
    pub cpu_count: usize,
    /// Processes created since boot.
    pub forks: u64,
}

pub fn parse_stat(content: &str) -> Result<StatCounters, HostError> {
    let mut counters = StatCounters::default();
    let mut saw_cpu = false;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("cpu ") {
            let v: Vec<u64> = rest
                .split_whitespace()
                .map(|s| s.parse::<u64>().unwrap_or(0))
                .collect();
            if v.len() < 7 {
                continue;
            }
            counters.cpu = CpuStat {
                user: v[0],
                nice: v[1],
                system: v[2],
                idle: v[3],
                iowait: v[4],
                irq: v[5],
                softirq: v[6],
                steal: v.get(7).copied().unwrap_or(0),
            };
            saw_cpu = true;
        } else if line.starts_with("cpu") {
            counters.cpu_count += 1;
        } else if let Some(value) = line.strip_prefix("processes ") {
            counters.forks = value.trim().parse().unwrap_or(0);
        }
    }

    if !saw_cpu {
        return Err(HostError::Parse {
            what: "stat",
            detail: "aggregate cpu line not found".into(),
        });
    }
    counters.cpu_count = counters.cpu_count.max(1);
    Ok(counters)
}

pub fn read_stat(proc_root: &Path) -> Result<StatCounters, HostError> {
    parse_stat(&read_proc_file(proc_root, "stat")?)
}

/// Sum of every `pgscan_kswapd*` counter in /proc/vmstat.
pub fn parse_kswapd_scanned(content: &str) -> u64 {
    content
        .lines()
        .filter(|l| l.starts_with("pgscan_kswapd"))
        .filter_map(|l| l.split_whitespace().nth(1)?.parse::<u64>().ok())
        .sum()
}

pub fn read_kswapd_scanned(proc_root: &Path) -> Result<u64, HostError> {
    Ok(parse_kswapd_scanned(&read_proc_file(proc_root, "vmstat")?))
}

/// Idle-probe delta state between two checks.
#[derive(Debug, Default)]
pub struct IdleTracker {
    previous: Mutex<Option<(CpuStat, u64)>>,
}

/// One idle observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleReading {
    pub idle_ratio: f64,
    pub load_per_cpu: f64,
    pub kswapd_active: bool,
}

impl IdleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares against the previous call. The first call reports no idle
    /// time and no kswapd activity.
    pub fn observe(&self, cpu: CpuStat, kswapd_scanned: u64, load: &LoadAverage, cpus: usize) -> IdleReading {
        let mut prev = self
            .previous
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (idle_ratio, kswapd_active) = match *prev {
            Some((last_cpu, last_scanned)) => {
                let delta_total = cpu.total().saturating_sub(last_cpu.total());
                let delta_idle = cpu.idle_total().saturating_sub(last_cpu.idle_total());
                let ratio = if delta_total > 0 {
                    delta_idle as f64 / delta_total as f64
                } else {
                    0.0
                };
                (ratio, kswapd_scanned > last_scanned)
            }
            None => (0.0, false),
        };
        *prev = Some((cpu, kswapd_scanned));

        IdleReading {
            idle_ratio,
            load_per_cpu: load.one_min / cpus.max(1) as f64,
            kswapd_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16000000 kB
MemFree:          400000 kB
MemAvailable:    2000000 kB
Buffers:           40000 kB
Cached:           800000 kB
SwapCached:        40000 kB
Active(anon):     100000 kB
Inactive(anon):   200000 kB
Active(file):     300000 kB
Inactive(file):   400000 kB
Mlocked:            4000 kB
SwapTotal:       2000000 kB
SwapFree:        1000000 kB
Shmem:             80000 kB
";

    const ZONEINFO: &str = "Node 0, zone      DMA
  pages free     3840
        min      33
        protection: (0, 2000, 15000, 15000, 15000)
Node 0, zone    DMA32
  pages free     200000
        min      3000
        protection: (0, 0, 13000, 13000, 13000)
Node 0, zone   Normal
  pages free     100000
        min      17000
        low      21000
        protection: (0, 0, 0, 0, 0)
Node 0, zone  Movable
  pages free     0
        min      0
        protection: (0, 0, 0, 0, 0)
";

    fn pages(kb: u64) -> u64 {
        kb_to_pages(kb)
    }

    // -------------------------------------------------------------------------
    // Tests for meminfo / zoneinfo
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_meminfo() {
        let sample = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(sample.free_pages, pages(400_000));
        assert_eq!(sample.file_pages, pages(880_000));
        assert_eq!(sample.swapcache_pages, pages(40_000));
        assert_eq!(sample.shmem_pages, pages(80_000));
        assert_eq!(sample.mlocked_pages, pages(4_000));
        assert_eq!(sample.free_swap_pages, pages(1_000_000));
        assert_eq!(sample.reclaimable(), pages(100_000) + pages(200_000) + pages(300_000) + pages(400_000));
    }

    #[test]
    fn test_parse_meminfo_requires_memfree() {
        assert!(parse_meminfo("Cached: 10 kB\n").is_err());
    }

    #[test]
    fn test_parse_zoneinfo_reserve() {
        // Normal is the third zone of node 0, protection[2] is 0
        assert_eq!(parse_zoneinfo_reserve(ZONEINFO), 17000);

        let with_protection = ZONEINFO.replace(
            "        low      21000\n        protection: (0, 0, 0, 0, 0)",
            "        low      21000\n        protection: (0, 0, 500, 900, 900)",
        );
        assert_eq!(parse_zoneinfo_reserve(&with_protection), 17500);
    }

    #[test]
    fn test_parse_zoneinfo_without_normal() {
        assert_eq!(parse_zoneinfo_reserve("Node 0, zone DMA\n  min 33\n"), 0);
    }

    #[test]
    fn test_read_memory_sample_from_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        fs::write(dir.path().join("zoneinfo"), ZONEINFO).unwrap();
        let sample = read_memory_sample(dir.path()).unwrap();
        assert_eq!(sample.reserved_free_pages, 17000);

        fs::remove_file(dir.path().join("zoneinfo")).unwrap();
        let sample = read_memory_sample(dir.path()).unwrap();
        assert_eq!(sample.reserved_free_pages, 0);
    }

    // -------------------------------------------------------------------------
    // Tests for stat / loadavg / vmstat
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_load_average() {
        let load = parse_load_average("0.52 0.58 0.59 2/1190 12345").unwrap();
        assert!((load.one_min - 0.52).abs() < 0.001);
        assert!((load.fifteen_min - 0.59).abs() < 0.001);
        assert!(parse_load_average("0.52 0.58").is_err());
        assert!(parse_load_average("abc def ghi 1/2 3").is_err());
    }

    #[test]
    fn test_parse_stat() {
        let content = "cpu  100 0 50 800 50 0 0 0 0 0
cpu0 50 0 25 400 25 0 0 0 0 0
cpu1 50 0 25 400 25 0 0 0 0 0
ctxt 123456
processes 4242
procs_running 1
";
        let stat = parse_stat(content).unwrap();
        assert_eq!(stat.cpu.total(), 1000);
        assert_eq!(stat.cpu.idle_total(), 850);
        assert_eq!(stat.cpu_count, 2);
        assert_eq!(stat.forks, 4242);
    }

    #[test]
    fn test_parse_kswapd_scanned() {
        let content = "pgscan_kswapd 100\npgscan_direct 5\npgscan_kswapd_normal 20\n";
        assert_eq!(parse_kswapd_scanned(content), 120);
    }

    #[test]
    fn test_idle_tracker_deltas() {
        let tracker = IdleTracker::new();
        let load = LoadAverage {
            one_min: 1.0,
            five_min: 1.0,
            fifteen_min: 1.0,
        };
        let first = CpuStat {
            user: 100,
            idle: 900,
            ..Default::default()
        };
        let reading = tracker.observe(first, 10, &load, 4);
        assert_eq!(reading.idle_ratio, 0.0);
        assert!(!reading.kswapd_active);
        assert!((reading.load_per_cpu - 0.25).abs() < 1e-9);

        let second = CpuStat {
            user: 110,
            idle: 990,
            ..Default::default()
        };
        let reading = tracker.observe(second, 10, &load, 4);
        assert!((reading.idle_ratio - 0.9).abs() < 1e-9);
        assert!(!reading.kswapd_active);

        let reading = tracker.observe(second, 11, &load, 4);
        assert!(reading.kswapd_active);
    }
}
