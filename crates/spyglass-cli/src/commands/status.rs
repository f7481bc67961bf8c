//! Status command - show what the ledger records
//!
//! Usage: spyglass status [--namespace <ns>]

use std::path::PathBuf;

use clap::Args;

use spyglass_common::DEFAULT_NAMESPACE;
use spyglass_install::{Ledger, LedgerEntry};

use super::connect;
use crate::Result;

/// Show the installed version
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Installation namespace
    #[arg(short = 'n', long, env = "SPYGLASS_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

pub async fn run(args: StatusArgs, kubeconfig: Option<PathBuf>) -> Result<()> {
    let client = connect(kubeconfig.as_deref()).await?;
    let entry = Ledger::new(client, args.namespace.as_str()).read().await?;
    for line in describe(&args.namespace, &entry) {
        println!("{}", line);
    }
    Ok(())
}

fn describe(namespace: &str, entry: &LedgerEntry) -> Vec<String> {
    if !entry.found {
        return vec![format!("Spyglass is not installed in namespace '{}'", namespace)];
    }
    let components = if entry.installed_components.is_empty() {
        "none".to_string()
    } else {
        entry.installed_components.join(", ")
    };
    vec![
        format!("Namespace:      {}", namespace),
        format!(
            "Version:        {}",
            entry.version.as_deref().unwrap_or("unknown")
        ),
        format!("Components:     {}", components),
        format!("Config version: {}", entry.config_version),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ledger_reads_as_not_installed() {
        let lines = describe("spyglass-system", &LedgerEntry::default());
        assert_eq!(
            lines,
            vec!["Spyglass is not installed in namespace 'spyglass-system'"]
        );
    }

    #[test]
    fn installed_entry_lists_version_and_components() {
        let entry = LedgerEntry {
            version: Some("0.4.1".to_string()),
            config_version: 3,
            installed_components: vec!["namespace".to_string(), "agent".to_string()],
            found: true,
        };

        let lines = describe("observability", &entry);

        assert!(lines.iter().any(|l| l.ends_with("0.4.1")));
        assert!(lines.iter().any(|l| l.ends_with("namespace, agent")));
        assert!(lines.iter().any(|l| l.ends_with(" 3")));
    }
}
