//! Herakles Low-Memory Killer Library
//!
//! This library provides the eviction policy engine behind the
//! `herakles-lowmem-killer` daemon. It is host-agnostic: memory counters,
//! the process table, signal delivery and zone reclaim are consumed through
//! the traits in [`host`], so the same policy runs against `/proc` in the
//! daemon and against scripted hosts in tests and simulations.
//!
//! # Features
//!
//! - **Tiered Thresholds**: free-memory tiers mapped to priority cutoffs, with
//!   a transient fork-burst boost window
//! - **Multi-Victim Selection**: the K best candidates per scan, independent of
//!   process enumeration order
//! - **Hysteresis**: no new victim while a signaled one is still dying
//! - **Soft Reclaim**: an idle-time background worker sharing state with the
//!   foreground scan
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use herakles_lowmem_killer::{
//!     Caller, ManualClock, MemorySample, ProcessSnapshot, ScanCoordinator, ScanOutcome,
//!     ScanRequest, SharedState, ThresholdTable,
//! };
//! use herakles_lowmem_killer::error::{HostError, TerminateError};
//! use herakles_lowmem_killer::host::{MemorySampler, ProcessTable, Terminator};
//! use herakles_lowmem_killer::tunables::{BoostTunables, ScanTunables};
//!
//! struct Host;
//!
//! impl MemorySampler for Host {
//!     fn sample(&self) -> Result<MemorySample, HostError> {
//!         Ok(MemorySample { free_pages: 1000, file_pages: 1000, ..Default::default() })
//!     }
//! }
//!
//! impl ProcessTable for Host {
//!     fn processes(&self) -> Box<dyn Iterator<Item = ProcessSnapshot> + '_> {
//!         Box::new(std::iter::once(ProcessSnapshot {
//!             pid: 42,
//!             name: "cached-app".into(),
//!             priority_score: 900,
//!             resident_pages: 2048,
//!             is_kernel_task: false,
//!             memdie: false,
//!         }))
//!     }
//! }
//!
//! impl Terminator for Host {
//!     fn terminate(&self, _pid: u32) -> Result<(), TerminateError> {
//!         Ok(())
//!     }
//! }
//!
//! let coordinator = ScanCoordinator::new(
//!     Arc::new(SharedState::default()),
//!     Arc::new(ManualClock::new()),
//!     ThresholdTable::default(),
//!     &BoostTunables::default(),
//!     ScanTunables::default(),
//! )
//! .unwrap();
//!
//! let outcome = coordinator.scan(&ScanRequest::reclaim(128, Caller::Direct), &Host);
//! assert!(matches!(outcome, ScanOutcome::Killed { .. }));
//! assert_eq!(outcome.pages_reclaimed(), 2048);
//! ```

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod host;
pub mod pool;
pub mod reclaim;
pub mod selector;
pub mod shared;
pub mod thresholds;
pub mod tunables;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use coordinator::{Caller, ScanCoordinator, ScanOutcome, ScanRequest};
pub use error::{ConfigError, HostError, TerminateError};
pub use host::{MemorySample, ProcessSnapshot};
pub use pool::{CandidatePool, CandidateSlot};
pub use reclaim::{ReclaimWorker, WakeDecision};
pub use shared::{KillRecord, SharedState};
pub use thresholds::{BoostWindow, ThresholdTable, Tier};
