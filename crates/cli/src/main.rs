//! CLI entry point for hostctl.

use clap::Parser;
use hostctl::CliConfig;

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    config.run()
}
