//! CLI arguments and subcommands for herakles-lowmem-killer.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Default, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "herakles-lowmem-killer",
    about = "Memory-pressure driven process eviction daemon for Linux",
    long_about = "Memory-pressure driven process eviction daemon for Linux.\n\n\
                  Watches free memory and file cache against tiered thresholds and \
                  terminates the most expendable processes (highest oom_score_adj, \
                  largest footprint) before the kernel OOM killer has to step in. \
                  Optionally runs an idle-time soft reclaim over cgroup v2 groups.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "More info: https://www.herakles.now | Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port for the operator API
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Engine diagnostic verbosity (1 kills, 2 selection, 3 pressure, 5 no-ops)
    #[arg(long)]
    pub debug_level: Option<u32>,

    /// Log victims instead of signaling them
    #[arg(long)]
    pub dry_run: bool,

    /// Root of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Victims selected per scan (1-8)
    #[arg(long)]
    pub victims: Option<usize>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the host exposes everything the daemon reads
    Check {
        /// Check memory counters (/proc/meminfo, /proc/zoneinfo)
        #[arg(long)]
        memory: bool,

        /// Check /proc process table
        #[arg(long)]
        proc: bool,

        /// Check configured cgroups
        #[arg(long)]
        cgroups: bool,

        /// Check everything
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run the policy against a randomly generated synthetic host
    Simulate {
        /// Number of scans to run
        #[arg(short = 'n', long, default_value_t = 20)]
        iterations: usize,

        /// Number of synthetic processes
        #[arg(long, default_value_t = 40)]
        processes: usize,

        /// Seed for the random generator
        #[arg(long)]
        seed: Option<u64>,

        /// Simulated milliseconds between scans
        #[arg(long, default_value_t = 250)]
        step_ms: u64,

        /// Print every process table before each scan
        #[arg(long)]
        verbose: bool,
    },

    /// Check runtime requirements and permissions
    CheckRequirements,
}
