//! Spyglass CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spyglass_common::telemetry::LogFormat;

/// Spyglass - install and manage the Spyglass control plane
#[derive(Parser, Debug)]
#[command(name = "spyglass")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to kubeconfig (falls back to SPYGLASS_KUBECONFIG, then kube defaults)
    #[arg(short = 'k', long = "kubeconfig", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text", env = "SPYGLASS_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the control plane, or bring an existing install to this version
    Install(commands::install::InstallArgs),
    /// Upgrade an existing installation
    Upgrade(commands::install::InstallArgs),
    /// Remove every installed component
    Uninstall(commands::uninstall::UninstallArgs),
    /// Show the installed version recorded in the cluster
    Status(commands::status::StatusArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let kubeconfig = config::resolve_kubeconfig(self.kubeconfig.as_deref());
        match self.command {
            Commands::Install(args) => {
                commands::install::run(args, kubeconfig, commands::install::Mode::Install).await
            }
            Commands::Upgrade(args) => {
                commands::install::run(args, kubeconfig, commands::install::Mode::Upgrade).await
            }
            Commands::Uninstall(args) => commands::uninstall::run(args, kubeconfig).await,
            Commands::Status(args) => commands::status::run(args, kubeconfig).await,
        }
    }
}
