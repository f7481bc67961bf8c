//! Install, upgrade and uninstall transactions
//!
//! One transaction walks the registry in declared order, stops at the first
//! failing component, and stamps the ledger only when every component
//! succeeded. Earlier components stay applied on failure; recovery is to fix
//! the input and re-run, which converges because every apply is idempotent.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spyglass_common::{Error, Result};

use crate::apply::{ApplyStats, UninstallReport};
use crate::client::ClusterClient;
use crate::installer::{InstallContext, Registry};
use crate::ledger::Ledger;

/// How a component was driven
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentAction {
    /// Full apply of the desired set
    InstallFromScratch,
    /// Delta from a previously installed version
    Upgrade {
        /// Version recorded in the ledger before the transaction
        from: String,
    },
}

impl fmt::Display for ComponentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentAction::InstallFromScratch => write!(f, "install"),
            ComponentAction::Upgrade { from } => write!(f, "upgrade from {}", from),
        }
    }
}

/// A component that applied successfully
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentOutcome {
    /// Component name
    pub component: String,
    /// Path taken
    pub action: ComponentAction,
    /// What the apply did
    pub stats: ApplyStats,
}

/// The first component that failed, with the verbatim cause
#[derive(Debug, thiserror::Error)]
#[error("component '{component}' failed: {error}")]
pub struct ComponentFailure {
    /// Component name
    pub component: String,
    /// Underlying error
    #[source]
    pub error: Error,
}

/// Result of one install or upgrade transaction
#[derive(Debug)]
pub struct TransactionReport {
    /// Version the transaction applied
    pub target_version: String,
    /// Version the ledger held before, `None` for a fresh install
    pub previous_version: Option<String>,
    /// Components that succeeded, in order
    pub outcomes: Vec<ComponentOutcome>,
    /// First failing component, if any
    pub failure: Option<ComponentFailure>,
    /// Whether the ledger was stamped with the target version
    pub ledger_written: bool,
}

impl TransactionReport {
    /// Every component succeeded
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Some components were applied before one failed; a re-run is required
    pub fn is_partial(&self) -> bool {
        self.failure.is_some() && !self.outcomes.is_empty()
    }

    /// Whether the transaction changed nothing in the cluster
    pub fn is_noop(&self) -> bool {
        self.is_success() && !self.ledger_written && self.outcomes.iter().all(|o| o.stats.is_noop())
    }

    /// Turn a failed transaction into its first failure
    pub fn into_result(self) -> std::result::Result<Self, ComponentFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self),
        }
    }
}

/// Result of an uninstall transaction
#[derive(Debug, Default)]
pub struct UninstallSummary {
    /// Per-component object removal, in the order components were removed
    pub reports: Vec<UninstallReport>,
    /// Components whose removal could not even start
    pub errors: Vec<ComponentFailure>,
    /// Whether the ledger was removed
    pub ledger_cleared: bool,
}

impl UninstallSummary {
    /// Every object of every component is gone
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.reports.iter().all(UninstallReport::is_clean)
    }
}

/// Drives transactions over a registry
pub struct Engine {
    client: Arc<dyn ClusterClient>,
    registry: Registry,
    ledger: Ledger,
}

impl Engine {
    /// Engine whose ledger lives in `namespace`
    pub fn new(client: Arc<dyn ClusterClient>, registry: Registry, namespace: &str) -> Self {
        let ledger = Ledger::new(client.clone(), namespace);
        Self {
            client,
            registry,
            ledger,
        }
    }

    /// The ledger this engine reads and stamps
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The registry this engine drives
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Install or upgrade every component to `target_version`
    ///
    /// Component failures are reported in the returned
    /// [`TransactionReport`]; ledger failures and cancellation are `Err`.
    pub async fn install(
        &self,
        target_version: &str,
        cancel: CancellationToken,
    ) -> Result<TransactionReport> {
        let entry = self.ledger.read().await?;
        let previous = entry.version.clone();
        info!(
            target = target_version,
            previous = previous.as_deref().unwrap_or("none"),
            components = self.registry.len(),
            "starting install transaction"
        );

        let ctx = InstallContext::new(self.client.clone(), cancel, target_version);
        let mut report = TransactionReport {
            target_version: target_version.to_string(),
            previous_version: previous.clone(),
            outcomes: Vec::new(),
            failure: None,
            ledger_written: false,
        };

        for installer in self.registry.iter() {
            let component = installer.name();
            ctx.check_cancelled(component)?;

            let action = match &previous {
                Some(from) if installer.supports_upgrade() => ComponentAction::Upgrade {
                    from: from.clone(),
                },
                _ => ComponentAction::InstallFromScratch,
            };
            info!(component, action = %action, "applying component");

            let result = match &action {
                ComponentAction::Upgrade { from } => installer.upgrade(&ctx, from).await,
                ComponentAction::InstallFromScratch => installer.install_from_scratch(&ctx).await,
            };

            match result {
                Ok(stats) => report.outcomes.push(ComponentOutcome {
                    component: component.to_string(),
                    action,
                    stats,
                }),
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    error!(component, error = %e, "component failed, stopping transaction");
                    report.failure = Some(ComponentFailure {
                        component: component.to_string(),
                        error: e,
                    });
                    break;
                }
            }
        }

        if report.failure.is_some() {
            warn!(
                applied = report.outcomes.len(),
                "transaction incomplete, ledger left unchanged"
            );
            return Ok(report);
        }

        let components = self.registry.names();
        if previous.as_deref() == Some(target_version) && entry.installed_components == components {
            info!(version = target_version, "ledger already current");
            return Ok(report);
        }

        self.ledger
            .write(target_version, &components, entry.precondition())
            .await?;
        report.ledger_written = true;
        info!(version = target_version, "install transaction complete");
        Ok(report)
    }

    /// Remove every component, dependents first
    ///
    /// Removal is best-effort across objects and components. The ledger is
    /// cleared only when everything was removed.
    pub async fn uninstall(&self, cancel: CancellationToken) -> Result<UninstallSummary> {
        let entry = self.ledger.read().await?;
        let ctx = InstallContext::new(
            self.client.clone(),
            cancel,
            entry.version.unwrap_or_default(),
        );

        let mut summary = UninstallSummary::default();
        for installer in self.registry.iter().rev() {
            let component = installer.name();
            ctx.check_cancelled(component)?;
            info!(component, "removing component");

            match installer.uninstall(&ctx).await {
                Ok(report) => {
                    if !report.is_clean() {
                        warn!(
                            component,
                            failed = report.failures.len(),
                            "some objects could not be removed"
                        );
                    }
                    summary.reports.push(report);
                }
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    error!(component, error = %e, "component removal failed");
                    summary.errors.push(ComponentFailure {
                        component: component.to_string(),
                        error: e,
                    });
                }
            }
        }

        if summary.is_clean() {
            self.ledger.clear().await?;
            summary.ledger_cleared = true;
            info!("uninstall complete");
        } else {
            warn!("uninstall incomplete, ledger kept");
        }
        Ok(summary)
    }
}
