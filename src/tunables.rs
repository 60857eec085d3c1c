//! Operator-adjustable knobs, grouped the way they are configured.
//!
//! Every struct deserializes with per-field defaults so a partial config
//! section only overrides what it names.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::pool::{DEFAULT_VICTIMS, MAX_VICTIMS};
use crate::thresholds::{AdjConversion, ThresholdTable, STOCK_FORK_BOOST};

fn default_adj() -> Vec<i32> {
    ThresholdTable::default().cutoffs()
}

fn default_minfree() -> Vec<u64> {
    ThresholdTable::default().min_free()
}

fn default_fork_boost() -> Vec<u64> {
    STOCK_FORK_BOOST.to_vec()
}

fn default_true() -> bool {
    true
}

/// Threshold table as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdTunables {
    #[serde(default = "default_adj")]
    pub adj: Vec<i32>,
    #[serde(default = "default_minfree")]
    pub minfree: Vec<u64>,
    #[serde(default = "default_fork_boost", alias = "fork-boost-minfree")]
    pub fork_boost_minfree: Vec<u64>,
    #[serde(default = "default_true", alias = "autodetect-oom-adj")]
    pub autodetect_oom_adj: bool,
}

impl Default for ThresholdTunables {
    fn default() -> Self {
        Self {
            adj: default_adj(),
            minfree: default_minfree(),
            fork_boost_minfree: default_fork_boost(),
            autodetect_oom_adj: true,
        }
    }
}

impl ThresholdTunables {
    /// Builds the lookup table, converting legacy cutoffs when asked to.
    pub fn build(&self) -> Result<ThresholdTable, ConfigError> {
        self.build_converted().map(|(table, _)| table)
    }

    /// Like [`build`](Self::build), also returning the cutoffs that
    /// autodetection rewrote.
    pub fn build_converted(&self) -> Result<(ThresholdTable, Vec<AdjConversion>), ConfigError> {
        let mut table = ThresholdTable::from_lists(&self.adj, &self.minfree, &self.fork_boost_minfree)?;
        let conversions = if self.autodetect_oom_adj {
            table.autodetect_score_adj()
        } else {
            Vec::new()
        };
        Ok((table, conversions))
    }
}

fn default_window_ms() -> u64 {
    2000
}

/// Fork-burst boost window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostTunables {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_window_ms", alias = "window-ms")]
    pub window_ms: u64,
}

impl Default for BoostTunables {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: default_window_ms(),
        }
    }
}

impl BoostTunables {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_victims() -> usize {
    DEFAULT_VICTIMS
}

fn default_hysteresis_ms() -> u64 {
    1000
}

fn default_contention_sleep_ms() -> u64 {
    1
}

/// Foreground scan behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTunables {
    #[serde(default = "default_victims", alias = "victims-per-scan")]
    pub victims_per_scan: usize,
    #[serde(default = "default_hysteresis_ms", alias = "hysteresis-ms")]
    pub hysteresis_ms: u64,
    #[serde(default = "default_contention_sleep_ms", alias = "contention-sleep-ms")]
    pub contention_sleep_ms: u64,
    #[serde(default = "default_true", alias = "only-reclaimer-sleeps")]
    pub only_reclaimer_sleeps: bool,
    /// Killing a victim below this score dumps the whole task list.
    #[serde(default, alias = "dump-tasks-below")]
    pub dump_tasks_below: Option<i32>,
}

impl Default for ScanTunables {
    fn default() -> Self {
        Self {
            victims_per_scan: DEFAULT_VICTIMS,
            hysteresis_ms: default_hysteresis_ms(),
            contention_sleep_ms: default_contention_sleep_ms(),
            only_reclaimer_sleeps: true,
            dump_tasks_below: None,
        }
    }
}

impl ScanTunables {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.victims_per_scan == 0 || self.victims_per_scan > MAX_VICTIMS {
            return Err(ConfigError::InvalidVictimCount {
                got: self.victims_per_scan,
                max: MAX_VICTIMS,
            });
        }
        Ok(())
    }

    pub fn hysteresis(&self) -> Duration {
        Duration::from_millis(self.hysteresis_ms)
    }

    pub fn contention_sleep(&self) -> Duration {
        Duration::from_millis(self.contention_sleep_ms)
    }
}

fn default_min_freeswap() -> u64 {
    8192
}

fn default_min_reclaim() -> u64 {
    512
}

fn default_min_interval_ms() -> u64 {
    10_000
}

/// Soft-reclaim gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimTunables {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_freeswap", alias = "min-freeswap-pages")]
    pub min_freeswap_pages: u64,
    #[serde(default = "default_min_reclaim", alias = "min-reclaim-pages")]
    pub min_reclaim_pages: u64,
    #[serde(default = "default_min_interval_ms", alias = "min-interval-ms")]
    pub min_interval_ms: u64,
}

impl Default for ReclaimTunables {
    fn default() -> Self {
        Self {
            enabled: true,
            min_freeswap_pages: default_min_freeswap(),
            min_reclaim_pages: default_min_reclaim(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl ReclaimTunables {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}
