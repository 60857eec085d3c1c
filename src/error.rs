//! Error types for the eviction engine.
//!
//! Configuration problems are rejected at the boundary and leave the previous
//! state in place. Host and termination errors are reported by the external
//! collaborators and are never fatal to a scan.

use thiserror::Error;

/// Rejected threshold/boost tables and tunables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("too many tiers: {len} (at most {max} supported)")]
    TooManyTiers { len: usize, max: usize },

    #[error("adj has {adj} entries but minfree has {minfree}")]
    LengthMismatch { adj: usize, minfree: usize },

    #[error("{list} must be in ascending order (violated at index {index})")]
    Unsorted { list: &'static str, index: usize },

    #[error("victims per scan must be between 1 and {max}, got {got}")]
    InvalidVictimCount { got: usize, max: usize },
}

/// Failure to read state from the host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {detail}")]
    Parse { what: &'static str, detail: String },
}

impl HostError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to deliver the fatal signal to a victim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminateError {
    #[error("process {0} no longer exists")]
    NoSuchProcess(u32),

    #[error("not permitted to signal process {0}")]
    PermissionDenied(u32),

    #[error("failed to signal process {pid}: {reason}")]
    Failed { pid: u32, reason: String },
}
