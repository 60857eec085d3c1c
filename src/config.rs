//! Configuration management for herakles-lowmem-killer.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use anyhow::{bail, Context};
use herakles_lowmem_killer::tunables::{
    BoostTunables, ReclaimTunables, ScanTunables, ThresholdTunables,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_PROC_ROOT: &str = "/proc";

fn default_fork_burst_threshold() -> u64 {
    50
}
fn default_boost_check_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_batch_pages() -> u64 {
    128
}
fn default_idle_check_interval_ms() -> u64 {
    1000
}
fn default_idle_ratio_min() -> f64 {
    0.9
}
fn default_idle_load_max() -> f64 {
    0.5
}
fn default_reclaim_chunk_pages() -> u64 {
    4096
}

/// Boost window plus the fork-burst probe that opens it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    #[serde(flatten)]
    pub window: BoostTunables,

    /// New processes per check interval that count as a burst
    #[serde(default = "default_fork_burst_threshold", alias = "fork-burst-threshold")]
    pub fork_burst_threshold: u64,

    #[serde(default = "default_boost_check_interval_ms", alias = "check-interval-ms")]
    pub check_interval_ms: u64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            window: BoostTunables::default(),
            fork_burst_threshold: default_fork_burst_threshold(),
            check_interval_ms: default_boost_check_interval_ms(),
        }
    }
}

/// Foreground scan tunables plus the pressure poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(flatten)]
    pub tunables: ScanTunables,

    #[serde(default = "default_poll_interval_ms", alias = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// `nr_to_scan` passed with each poll
    #[serde(default = "default_batch_pages", alias = "batch-pages")]
    pub batch_pages: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tunables: ScanTunables::default(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_pages: default_batch_pages(),
        }
    }
}

/// Soft-reclaim gating plus the idle probe and cgroup targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimConfig {
    #[serde(flatten)]
    pub tunables: ReclaimTunables,

    #[serde(default = "default_idle_check_interval_ms", alias = "idle-check-interval-ms")]
    pub idle_check_interval_ms: u64,

    /// Minimum share of idle CPU time since the last check
    #[serde(default = "default_idle_ratio_min", alias = "idle-ratio-min")]
    pub idle_ratio_min: f64,

    /// Maximum 1-minute load average per CPU
    #[serde(default = "default_idle_load_max", alias = "idle-load-max")]
    pub idle_load_max: f64,

    /// Pages requested from memory.reclaim per cgroup and pass
    #[serde(default = "default_reclaim_chunk_pages", alias = "reclaim-chunk-pages")]
    pub reclaim_chunk_pages: u64,

    /// cgroup v2 directories reclaimed by the soft-reclaim pass
    #[serde(default)]
    pub cgroups: Vec<PathBuf>,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            tunables: ReclaimTunables::default(),
            idle_check_interval_ms: default_idle_check_interval_ms(),
            idle_ratio_min: default_idle_ratio_min(),
            idle_load_max: default_idle_load_max(),
            reclaim_chunk_pages: default_reclaim_chunk_pages(),
            cgroups: Vec::new(),
        }
    }
}

/// Daemon configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    pub log_level: Option<String>,
    #[serde(alias = "debug-level")]
    pub debug_level: Option<u32>,

    // Host access
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "dry-run")]
    pub dry_run: Option<bool>,

    // Policy sections
    #[serde(default)]
    pub thresholds: ThresholdTunables,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub reclaim: ReclaimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            log_level: Some("info".into()),
            debug_level: Some(herakles_lowmem_killer::shared::DEFAULT_DEBUG_LEVEL),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            dry_run: Some(false),
            thresholds: ThresholdTunables::default(),
            boost: BoostConfig::default(),
            scan: ScanConfig::default(),
            reclaim: ReclaimConfig::default(),
        }
    }
}

impl Config {
    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if let Some(bind) = cfg.bind.as_deref() {
        bind.parse::<IpAddr>()
            .with_context(|| format!("Invalid bind address '{}'", bind))?;
    }

    cfg.thresholds
        .build()
        .context("Invalid thresholds section")?;
    cfg.scan
        .tunables
        .validate()
        .context("Invalid scan section")?;

    if cfg.scan.poll_interval_ms == 0 {
        bail!("scan.poll_interval_ms must be greater than 0");
    }
    if cfg.scan.batch_pages == 0 {
        bail!("scan.batch_pages must be greater than 0");
    }
    if cfg.boost.check_interval_ms == 0 {
        bail!("boost.check_interval_ms must be greater than 0");
    }
    if cfg.reclaim.idle_check_interval_ms == 0 {
        bail!("reclaim.idle_check_interval_ms must be greater than 0");
    }
    if !(0.0..=1.0).contains(&cfg.reclaim.idle_ratio_min) {
        bail!(
            "reclaim.idle_ratio_min must be between 0.0 and 1.0, got {}",
            cfg.reclaim.idle_ratio_min
        );
    }
    if cfg.reclaim.idle_load_max < 0.0 {
        bail!("reclaim.idle_load_max must not be negative");
    }
    if cfg.reclaim.reclaim_chunk_pages == 0 {
        bail!("reclaim.reclaim_chunk_pages must be greater than 0");
    }
    for cgroup in &cfg.reclaim.cgroups {
        if !cgroup.is_absolute() {
            bail!("reclaim.cgroups entry must be an absolute path: {}", cgroup.display());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(level) = args.debug_level {
        config.debug_level = Some(level);
    }
    if args.dry_run {
        config.dry_run = Some(true);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(victims) = args.victims {
        config.scan.tunables.victims_per_scan = victims;
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/lowmem-killer.yaml",
            "/etc/herakles/lowmem-killer.yml",
            "/etc/herakles/lowmem-killer.json",
            "./herakles-lowmem-killer.yaml",
            "./herakles-lowmem-killer.yml",
            "./herakles-lowmem-killer.json",
        ];

        match defaults.iter().find(|p| Path::new(p).exists()) {
            Some(found) => PathBuf::from(found),
            None => return Ok(Config::default()),
        }
    };

    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(config: &Config, format: ConfigFormat) -> anyhow::Result<String> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    // -------------------------------------------------------------------------
    // Tests for loading
    // -------------------------------------------------------------------------

    #[test]
    fn test_load_yaml_partial_sections() {
        let file = write_config(
            ".yaml",
            "port: 9300\nscan:\n  victims-per-scan: 2\n  poll_interval_ms: 50\nreclaim:\n  cgroups: [/sys/fs/cgroup/background]\n",
        );
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.port, Some(9300));
        assert_eq!(cfg.scan.tunables.victims_per_scan, 2);
        assert_eq!(cfg.scan.poll_interval_ms, 50);
        assert_eq!(cfg.scan.tunables.hysteresis_ms, 1000);
        assert_eq!(cfg.reclaim.tunables.min_reclaim_pages, 512);
        assert_eq!(cfg.reclaim.cgroups.len(), 1);
        assert_eq!(cfg.thresholds.minfree, vec![1536, 2048, 4096, 16384]);
    }

    #[test]
    fn test_load_json_thresholds() {
        let file = write_config(
            ".json",
            r#"{"thresholds": {"adj": [0, 100, 900], "minfree": [1000, 2000, 3000], "fork_boost_minfree": [0, 0, 500]}}"#,
        );
        let cfg = load_config(Some(file.path())).unwrap();
        let table = cfg.thresholds.build().unwrap();
        assert_eq!(table.cutoffs(), vec![0, 100, 900]);
        assert_eq!(table.boosts(), vec![0, 0, 500]);
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            "debug_level = 3\n\n[boost]\nenabled = true\nwindow_ms = 500\n",
        );
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.debug_level, Some(3));
        assert!(cfg.boost.window.enabled);
        assert_eq!(cfg.boost.window.window_ms, 500);
        assert_eq!(cfg.boost.fork_burst_threshold, 50);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/lmk.yaml"))).is_err());
    }

    // -------------------------------------------------------------------------
    // Tests for validation and precedence
    // -------------------------------------------------------------------------

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_effective_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_tables() {
        let mut cfg = Config::default();
        cfg.thresholds.minfree = vec![4096, 2048, 1024, 512];
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(format!("{:#}", err).contains("ascending"));
    }

    #[test]
    fn test_validation_rejects_victims_and_intervals() {
        let mut cfg = Config::default();
        cfg.scan.tunables.victims_per_scan = 20;
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.scan.poll_interval_ms = 0;
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.reclaim.idle_ratio_min = 1.5;
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(".yaml", "port: 9300\ndebug_level: 1\n");
        let args = Args {
            config: Some(file.path().to_path_buf()),
            port: Some(9400),
            victims: Some(5),
            dry_run: true,
            ..Default::default()
        };
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.port, Some(9400));
        assert_eq!(cfg.debug_level, Some(1));
        assert_eq!(cfg.scan.tunables.victims_per_scan, 5);
        assert_eq!(cfg.dry_run, Some(true));
    }

    #[test]
    fn test_render_all_formats() {
        let cfg = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let out = render_config(&cfg, format).unwrap();
            assert!(out.contains("victims_per_scan"), "{:?}: {}", format, out);
        }
    }
}
