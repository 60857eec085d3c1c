//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("herakles-lowmem-killer.yaml"),
    };

    let content = generate_config(format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Renders the default configuration, with a comment header for YAML.
pub fn generate_config(format: ConfigFormat, commented: bool) -> anyhow::Result<String> {
    let mut content = render_config(&Config::default(), format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }
    Ok(content)
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Low-Memory Killer Configuration
# ========================================
#
# Server Configuration
# --------------------
# bind: "127.0.0.1"            # Bind IP for the operator API
# port: 9216                   # HTTP port
#
# Host Access
# -----------
# proc_root: "/proc"           # Root of the proc filesystem
# dry_run: false               # Log victims instead of killing them
# debug_level: 2               # 1 kills, 2 selection, 3 pressure, 5 no-ops
#
# Thresholds (pages, 4 KiB each on most systems)
# ----------------------------------------------
# thresholds.adj: [0, 1, 6, 12]            # Priority cutoff per tier, ascending
# thresholds.minfree: [1536, 2048, 4096, 16384]  # Free/file threshold per tier, ascending
# thresholds.fork_boost_minfree: [...]     # Extra pages per tier while boosted
# thresholds.autodetect_oom_adj: true      # Convert legacy oom_adj cutoffs
#
# Fork-Burst Boost
# ----------------
# boost.enabled: false         # Raise thresholds after a fork burst
# boost.window_ms: 2000        # How long the raise lasts
# boost.fork_burst_threshold: 50   # New processes per check that count as a burst
# boost.check_interval_ms: 1000
#
# Foreground Scan
# ---------------
# scan.victims_per_scan: 3     # 1-8 victims killed per scan
# scan.hysteresis_ms: 1000     # No new victims while one is dying within this window
# scan.contention_sleep_ms: 1  # Back-off after a contended or aborted scan
# scan.only_reclaimer_sleeps: true
# scan.dump_tasks_below: null  # Dump the task list when killing below this score
# scan.poll_interval_ms: 100
# scan.batch_pages: 128
#
# Soft Reclaim (cgroup v2 memory.reclaim)
# ---------------------------------------
# reclaim.enabled: true
# reclaim.min_freeswap_pages: 8192  # Skip when swap is this low
# reclaim.min_reclaim_pages: 512    # Clear the request below this yield
# reclaim.min_interval_ms: 10000    # Cooldown between passes
# reclaim.idle_check_interval_ms: 1000
# reclaim.idle_ratio_min: 0.9       # Idle CPU share needed
# reclaim.idle_load_max: 0.5        # Max 1-minute load per CPU
# reclaim.reclaim_chunk_pages: 4096 # Budget per cgroup and pass
# reclaim.cgroups: []               # e.g. ["/sys/fs/cgroup/apps.slice"]
"#;

    format!("{comments}\n{yaml}")
}
