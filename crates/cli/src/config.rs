//! Command-line configuration and logging setup.

use crate::commands::Command;
use anyhow::Context;
use clap::Parser;
use corelib::CoreConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostctl", version, about = "Inspect and exercise the driver's host core")]
pub struct CliConfig {
    /// JSON file with core settings (latency tracking, token handling).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(&self) -> anyhow::Result<()> {
        init_logging(self.verbose);

        let core = self.core_config()?;
        tracing::debug!(?core, "Loaded core configuration");

        let result = self.command.execute(&core)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print!("{result}");
        }

        anyhow::ensure!(result.is_success(), "{} failed", self.command.name());
        Ok(())
    }

    pub fn core_config(&self) -> anyhow::Result<CoreConfig> {
        match &self.config {
            Some(path) => CoreConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display())),
            None => Ok(CoreConfig::default()),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
