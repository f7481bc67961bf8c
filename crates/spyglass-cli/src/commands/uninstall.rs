//! Uninstall command - remove every component and the ledger
//!
//! Usage: spyglass uninstall [--namespace <ns>] --yes
//!
//! Components are removed dependents first. Removal is best-effort: objects
//! that cannot be deleted are reported and the ledger is kept so a re-run
//! can finish the job.

use std::path::PathBuf;

use clap::Args;

use spyglass_common::DEFAULT_NAMESPACE;
use spyglass_install::{
    Engine, Ledger, ProductConfig, Registry, UninstallReport, UninstallSummary,
};

use super::{cancel_on_ctrl_c, connect};
use crate::{Error, Result};

/// Remove the Spyglass control plane
#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Installation namespace
    #[arg(short = 'n', long, env = "SPYGLASS_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Skip confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

pub async fn run(args: UninstallArgs, kubeconfig: Option<PathBuf>) -> Result<()> {
    let client = connect(kubeconfig.as_deref()).await?;
    let entry = Ledger::new(client.clone(), args.namespace.as_str())
        .read()
        .await?;

    // Object keys do not depend on the version; any valid tag builds them
    let config = ProductConfig {
        namespace: args.namespace.clone(),
        version: entry.version.clone().unwrap_or_else(|| "unknown".to_string()),
        ..Default::default()
    };
    let registry = Registry::standard(&config)?;

    if !args.yes {
        println!(
            "This will remove Spyglass {} from namespace '{}':",
            entry.version.as_deref().unwrap_or("(no recorded version)"),
            args.namespace
        );
        for installer in registry.iter().rev() {
            println!("  - {}", installer.name());
            for object in installer.desired_objects()? {
                println!("      {}", object.key);
            }
        }
        println!();
        println!("Run with --yes to confirm.");
        return Ok(());
    }

    let engine = Engine::new(client, registry, &args.namespace);
    let summary = engine.uninstall(cancel_on_ctrl_c()).await?;

    for line in summarize(&summary) {
        println!("{}", line);
    }
    finish(&summary)
}

fn summarize(summary: &UninstallSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary.reports.iter().map(describe_report).collect();
    for failure in &summary.errors {
        lines.push(format!("  {:<18} FAILED: {}", failure.component, failure.error));
    }
    if summary.ledger_cleared {
        lines.push("Spyglass uninstalled".to_string());
    } else {
        lines.push("Uninstall incomplete, installation record kept".to_string());
    }
    lines
}

fn describe_report(report: &UninstallReport) -> String {
    let mut line = format!(
        "  {:<18} removed {}, already absent {}",
        report.component,
        report.removed.len(),
        report.already_absent.len()
    );
    for (key, error) in &report.failures {
        line.push_str(&format!("\n      could not remove {}: {}", key, error));
    }
    line
}

fn finish(summary: &UninstallSummary) -> Result<()> {
    if summary.is_clean() {
        return Ok(());
    }
    let failed = summary.errors.len()
        + summary
            .reports
            .iter()
            .filter(|report| !report.is_clean())
            .count();
    Err(Error::PartialUninstall { failed })
}
