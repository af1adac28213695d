//! Diagnostic tool for the host core.
//!
//! Provides commands for:
//! - Parsing server version strings
//! - Simulating latency tracking on a synthetic sample stream
//! - Merging a metadata row into a host and showing the result
//! - Stress-testing concurrent topology updates

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
