//! Component installer contract and registry
//!
//! Every product component implements [`ComponentInstaller`]. Concrete
//! installers usually provide only `name` and `desired_objects`; the default
//! method bodies apply, upgrade and remove those objects through the
//! per-object engine in [`crate::apply`].
//!
//! The [`Registry`] is the ordered list of installers for one invocation. It
//! is assembled once, validated, and never reordered.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use spyglass_common::{Error, Result};

use crate::apply::{
    apply_objects, delete_objects, owned_keys, prune_stale, ApplyStats, UninstallReport,
};
use crate::client::ClusterClient;
use crate::object::ClusterObject;

/// Everything an installer needs to touch the cluster for one transaction
#[derive(Clone)]
pub struct InstallContext {
    /// Cluster access
    pub client: Arc<dyn ClusterClient>,
    /// Caller-supplied cancellation, checked at every object boundary
    pub cancel: CancellationToken,
    /// Version stamped on every applied object
    pub target_version: String,
}

impl InstallContext {
    /// Create a context for a transaction targeting `target_version`
    pub fn new(
        client: Arc<dyn ClusterClient>,
        cancel: CancellationToken,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cancel,
            target_version: target_version.into(),
        }
    }

    /// Fail with `Cancelled` if the caller has cancelled the transaction
    pub fn check_cancelled(&self, context: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(context));
        }
        Ok(())
    }
}

/// One independently installable piece of the product
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentInstaller: Send + Sync {
    /// Stable, unique component name used for labels, ordering and reports
    fn name(&self) -> &'static str;

    /// Build the full desired object set (pure, no I/O)
    fn desired_objects(&self) -> Result<Vec<ClusterObject>>;

    /// Whether `upgrade` has a lighter path than `install_from_scratch`
    fn supports_upgrade(&self) -> bool {
        false
    }

    /// Apply every desired object
    async fn install_from_scratch(&self, ctx: &InstallContext) -> Result<ApplyStats> {
        let objects = self.desired_objects()?;
        apply_objects(ctx, self.name(), objects).await
    }

    /// Move from `previous_version`'s object shapes to the current ones
    ///
    /// Applies the desired set, then deletes objects this component left
    /// behind at an earlier version that are no longer desired.
    async fn upgrade(&self, ctx: &InstallContext, previous_version: &str) -> Result<ApplyStats> {
        let objects = self.desired_objects()?;
        let mut stats = apply_objects(ctx, self.name(), objects.clone()).await?;
        if previous_version != ctx.target_version {
            stats.pruned = prune_stale(ctx, self.name(), &objects).await?;
        }
        Ok(stats)
    }

    /// Remove every object this component owns; absent objects are fine
    ///
    /// Objects from an earlier shape that still carry this component's
    /// labels are removed along with the current desired set.
    async fn uninstall(&self, ctx: &InstallContext) -> Result<UninstallReport> {
        let objects = self.desired_objects()?;
        let keys = owned_keys(ctx, self.name(), &objects).await?;
        delete_objects(ctx, self.name(), keys).await
    }
}

/// Ordered list of component installers
pub struct Registry {
    installers: Vec<Box<dyn ComponentInstaller>>,
}

impl Registry {
    /// Build a registry, rejecting empty or duplicate component names
    pub fn new(installers: Vec<Box<dyn ComponentInstaller>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for installer in &installers {
            let name = installer.name();
            if name.trim().is_empty() {
                return Err(Error::validation("component name must not be empty"));
            }
            if !seen.insert(name) {
                return Err(Error::validation(format!(
                    "component '{}' is registered more than once",
                    name
                )));
            }
        }
        Ok(Self { installers })
    }

    /// Installers in declared order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &dyn ComponentInstaller> {
        self.installers.iter().map(|i| i.as_ref())
    }

    /// Component names in declared order
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|i| i.name().to_string()).collect()
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.installers.len()
    }

    /// Whether no components are registered
    pub fn is_empty(&self) -> bool {
        self.installers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.names())
            .finish()
    }
}
