//! Install and upgrade commands - apply the control plane at a version
//!
//! Usage:
//!   spyglass install --version <v> [--config <file>] [--namespace <ns>] ...
//!   spyglass upgrade --version <v> ...
//!
//! Both run the same transaction: components already recorded in the ledger
//! are upgraded when they support it and re-applied otherwise. `upgrade`
//! refuses to run against a namespace with no recorded installation.

use std::path::PathBuf;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use spyglass_common::retry::{retry_when, RetryConfig};
use spyglass_install::{Engine, ProductConfig, Registry, TransactionReport};

use super::{cancel_on_ctrl_c, connect};
use crate::config::load_product_config;
use crate::{Error, Result};

/// Which command the transaction runs under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Install,
    Upgrade,
}

/// Install or upgrade the control plane
#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    /// Product version to install (also the image tag)
    #[arg(long = "version")]
    pub target_version: Option<String>,

    /// YAML config file; explicit flags override its values
    #[arg(short = 'f', long = "config")]
    pub config: Option<PathBuf>,

    /// Installation namespace
    #[arg(short = 'n', long, env = "SPYGLASS_NAMESPACE")]
    pub namespace: Option<String>,

    /// Registry prefix for every image
    #[arg(long, env = "SPYGLASS_IMAGE_PREFIX")]
    pub image_prefix: Option<String>,

    /// Grant the agent `use` on the privileged pod security policy
    #[arg(long)]
    pub psp: bool,

    /// OTLP endpoint for the control plane's own telemetry
    #[arg(long, env = "SPYGLASS_TELEMETRY_ENDPOINT")]
    pub telemetry_endpoint: Option<String>,

    /// Re-run the whole transaction this many times on a ledger conflict
    #[arg(long, default_value = "0")]
    pub conflict_retries: u32,
}

impl InstallArgs {
    /// Layer defaults, then the config file, then explicit flags
    pub fn product_config(&self) -> Result<ProductConfig> {
        let mut config = load_product_config(self.config.as_deref())?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut ProductConfig) {
        if let Some(version) = &self.target_version {
            config.version = version.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(prefix) = &self.image_prefix {
            config.image_prefix = prefix.clone();
        }
        if self.psp {
            config.features.psp = true;
        }
        if let Some(endpoint) = &self.telemetry_endpoint {
            config.features.own_telemetry_endpoint = Some(endpoint.clone());
        }
    }
}

pub async fn run(args: InstallArgs, kubeconfig: Option<PathBuf>, mode: Mode) -> Result<()> {
    let config = args.product_config()?;
    let registry = Registry::standard(&config)?;
    let client = connect(kubeconfig.as_deref()).await?;
    let engine = Engine::new(client, registry, &config.namespace);

    if mode == Mode::Upgrade {
        let entry = engine.ledger().read().await?;
        if !entry.found {
            return Err(Error::validation(format!(
                "no installation found in namespace '{}'; run `spyglass install` first",
                config.namespace
            )));
        }
    }

    println!(
        "Installing Spyglass {} into namespace '{}'",
        config.version, config.namespace
    );

    let cancel = cancel_on_ctrl_c();
    let engine = &engine;
    let version = config.version.as_str();
    let retry = RetryConfig::with_retries(args.conflict_retries);

    let report = retry_when(
        &retry,
        "install transaction",
        |e: &spyglass_common::Error| e.is_conflict(),
        move || attempt(engine, version, cancel.clone()),
    )
    .await?;

    for line in summarize(&report) {
        println!("{}", line);
    }
    finish(report)
}

/// One install transaction; a component that lost a race surfaces as the
/// conflict so the caller can re-run the whole transaction
async fn attempt(
    engine: &Engine,
    version: &str,
    cancel: CancellationToken,
) -> spyglass_common::Result<TransactionReport> {
    let mut report = engine.install(version, cancel).await?;
    match report.failure.take() {
        Some(failure) if failure.error.is_conflict() => Err(failure.error),
        failure => {
            report.failure = failure;
            Ok(report)
        }
    }
}

fn summarize(report: &TransactionReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.outcomes.len() + 2);
    if let Some(previous) = &report.previous_version {
        lines.push(format!(
            "Previous version: {} -> {}",
            previous, report.target_version
        ));
    }
    for outcome in &report.outcomes {
        let stats = outcome.stats;
        lines.push(format!(
            "  {:<18} {:<22} created {}, updated {}, unchanged {}, pruned {}",
            outcome.component,
            outcome.action.to_string(),
            stats.created,
            stats.updated,
            stats.unchanged,
            stats.pruned
        ));
    }
    if let Some(failure) = &report.failure {
        lines.push(format!("  {:<18} FAILED: {}", failure.component, failure.error));
    } else if report.ledger_written {
        lines.push(format!("Spyglass {} installed", report.target_version));
    } else {
        lines.push(format!(
            "Spyglass {} already installed, nothing to do",
            report.target_version
        ));
    }
    lines
}

fn finish(report: TransactionReport) -> Result<()> {
    let applied = report.outcomes.len();
    match report.into_result() {
        Ok(report) => {
            info!(
                version = %report.target_version,
                ledger_written = report.ledger_written,
                "install finished"
            );
            Ok(())
        }
        Err(failure) => Err(Error::PartialInstall {
            component: failure.component,
            applied,
            message: failure.error.to_string(),
        }),
    }
}
