//! Spyglass CLI

use clap::Parser;

use spyglass_cli::{Cli, Result};
use spyglass_common::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(LogConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    cli.run().await
}
