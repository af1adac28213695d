//! Subcommands.

pub mod host;
pub mod latency;
pub mod stress;
pub mod version;

use clap::Subcommand;
use corelib::CoreConfig;
use serde::Serialize;
use std::fmt;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse server version strings the way host refresh does.
    Version {
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Feed a synthetic latency stream into a tracker.
    Latency(latency::LatencyArgs),
    /// Merge a JSON metadata row into a host and show the result.
    Host(host::HostArgs),
    /// Race topology writers against readers and verify the outcome.
    Stress(stress::StressArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Version { .. } => "version",
            Command::Latency(_) => "latency",
            Command::Host(_) => "host",
            Command::Stress(_) => "stress",
        }
    }

    pub fn execute(&self, core: &CoreConfig) -> anyhow::Result<CommandResult> {
        Ok(match self {
            Command::Version { versions } => CommandResult::Version(version::run(versions)),
            Command::Latency(args) => CommandResult::Latency(latency::run(args, core)),
            Command::Host(args) => CommandResult::Host(host::run(args, core)?),
            Command::Stress(args) => CommandResult::Stress(stress::run(args, core)),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandResult {
    Version(version::VersionReport),
    Latency(latency::LatencyReport),
    Host(host::HostReport),
    Stress(stress::StressReport),
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        match self {
            CommandResult::Version(report) => report.all_parsed(),
            CommandResult::Latency(_) | CommandResult::Host(_) => true,
            CommandResult::Stress(report) => report.consistent,
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Version(report) => fmt::Display::fmt(report, f),
            CommandResult::Latency(report) => fmt::Display::fmt(report, f),
            CommandResult::Host(report) => fmt::Display::fmt(report, f),
            CommandResult::Stress(report) => fmt::Display::fmt(report, f),
        }
    }
}
