//! CLI command implementations for herakles-lowmem-killer.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Host interface validation
//! - `config`: Configuration file generation
//! - `simulate`: Policy run against a synthetic host

pub mod check;
pub mod config;
pub mod simulate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use simulate::command_simulate;
