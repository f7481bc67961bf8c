//! Per-object apply, prune, and delete
//!
//! For every desired object: `get` by identity, then `create` when absent,
//! skip when the live object already matches on owned fields, or `update`
//! with the owned fields merged into the live body. Nothing here retries; a
//! failed write is surfaced with the component and object identity.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use spyglass_common::{component_selector, ClientError, Error, Result};

use crate::client::ListScope;
use crate::diff::{matches_owned, merge_owned, owned_fields};
use crate::installer::InstallContext;
use crate::object::{ClusterObject, ObjectKey};

/// Counts of what one apply pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Objects created
    pub created: usize,
    /// Objects updated in place
    pub updated: usize,
    /// Objects that already matched
    pub unchanged: usize,
    /// Stale objects deleted after the apply
    pub pruned: usize,
}

impl ApplyStats {
    /// Whether the pass changed anything in the cluster
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.pruned == 0
    }
}

/// Outcome of removing one component's objects
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UninstallReport {
    /// Component the objects belong to
    pub component: String,
    /// Objects deleted by this run
    pub removed: Vec<ObjectKey>,
    /// Objects that were already gone
    pub already_absent: Vec<ObjectKey>,
    /// Every object that could not be deleted, with the cluster error
    pub failures: Vec<(ObjectKey, ClientError)>,
}

impl UninstallReport {
    /// Empty report for a component
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..Default::default()
        }
    }

    /// Whether every object is gone
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse the failures into a single error
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            return Ok(self);
        }
        let message = self
            .failures
            .iter()
            .map(|(key, err)| format!("{}: {}", key, err))
            .collect::<Vec<_>>()
            .join("; ");
        Err(Error::Uninstall {
            component: self.component,
            failed: self.failures.len(),
            message,
        })
    }
}

/// Apply order for a kind
///
/// Lower values apply first: namespaces, identities and RBAC before the
/// config the workloads read, and workloads last.
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" => 2,
        "ClusterRole" | "Role" => 3,
        "ClusterRoleBinding" | "RoleBinding" => 4,
        "ConfigMap" | "Secret" => 5,
        "Service" => 7,
        "Deployment" | "DaemonSet" | "StatefulSet" => 8,
        _ => 10,
    }
}

/// Apply a component's desired objects
///
/// Objects are stamped with the ownership labels for `component` at the
/// context's target version and applied in kind priority order. The
/// transaction is aborted with `Cancelled` at the next object boundary
/// once the context is cancelled.
pub async fn apply_objects(
    ctx: &InstallContext,
    component: &str,
    mut objects: Vec<ClusterObject>,
) -> Result<ApplyStats> {
    objects.sort_by_key(|o| kind_priority(&o.key.kind.kind));

    let mut stats = ApplyStats::default();
    for mut desired in objects {
        ctx.check_cancelled(component)?;
        desired.stamp_ownership(component, &ctx.target_version);
        let key = desired.key.clone();

        let live = ctx
            .client
            .get(&key)
            .await
            .map_err(|e| Error::apply(component, "get", key.to_string(), e))?;

        match live {
            None => {
                ctx.client
                    .create(&desired)
                    .await
                    .map_err(|e| Error::apply(component, "create", key.to_string(), e))?;
                debug!(component, object = %key, "created");
                stats.created += 1;
            }
            Some(live) => {
                let owned = owned_fields(&key.kind.kind);
                if matches_owned(&desired.body, &live.body, owned) {
                    debug!(component, object = %key, "unchanged");
                    stats.unchanged += 1;
                    continue;
                }
                let body = merge_owned(&desired.body, &live.body, owned);
                ctx.client
                    .update(&ClusterObject::from_parts(key.clone(), body))
                    .await
                    .map_err(|e| Error::apply(component, "update", key.to_string(), e))?;
                debug!(component, object = %key, "updated");
                stats.updated += 1;
            }
        }
    }

    info!(
        component,
        created = stats.created,
        updated = stats.updated,
        unchanged = stats.unchanged,
        "applied component objects"
    );
    Ok(stats)
}

/// Delete objects labelled for `component` that are not in `desired`
///
/// Only the kinds and namespaces present in `desired` are listed, so a
/// component that drops a kind entirely has to remove it itself.
pub async fn prune_stale(
    ctx: &InstallContext,
    component: &str,
    desired: &[ClusterObject],
) -> Result<usize> {
    let wanted: HashSet<&ObjectKey> = desired.iter().map(|o| &o.key).collect();
    let mut pruned = 0;
    for stale in list_owned(ctx, component, desired)
        .await?
        .into_iter()
        .filter(|key| !wanted.contains(key))
    {
        ctx.check_cancelled(component)?;
        match ctx.client.delete(&stale).await {
            Ok(()) => {
                info!(component, object = %stale, "deleted stale object");
                pruned += 1;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(Error::apply(component, "delete", stale.to_string(), e));
            }
        }
    }
    Ok(pruned)
}

/// Every object `component` owns: the desired keys plus whatever carries
/// its ownership labels, including objects left over from earlier shapes
///
/// Listing covers the kinds and namespaces present in `desired`.
pub async fn owned_keys(
    ctx: &InstallContext,
    component: &str,
    desired: &[ClusterObject],
) -> Result<Vec<ObjectKey>> {
    let mut keys: Vec<ObjectKey> = desired.iter().map(|o| o.key.clone()).collect();
    let mut known: HashSet<ObjectKey> = keys.iter().cloned().collect();
    for key in list_owned(ctx, component, desired).await? {
        if known.insert(key.clone()) {
            debug!(component, object = %key, "found owned object outside desired set");
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Keys of live objects labelled for `component`, per desired kind and namespace
async fn list_owned(
    ctx: &InstallContext,
    component: &str,
    desired: &[ClusterObject],
) -> Result<Vec<ObjectKey>> {
    let mut scopes = Vec::new();
    let mut seen = BTreeSet::new();
    for object in desired {
        let scope_id = (
            object.key.kind.api_version.clone(),
            object.key.kind.kind.clone(),
            object.key.namespace.clone(),
        );
        if seen.insert(scope_id) {
            scopes.push((object.key.kind.clone(), object.key.namespace.clone()));
        }
    }

    let selector = component_selector(component);
    let mut keys = Vec::new();
    for (kind, namespace) in scopes {
        let scope = ListScope {
            namespace,
            selector: selector.clone(),
        };
        let live = ctx
            .client
            .list_by_label(&kind, &scope)
            .await
            .map_err(|e| Error::apply(component, "list", kind.kind.clone(), e))?;
        keys.extend(live.into_iter().map(|o| o.key));
    }
    Ok(keys)
}

/// Delete `keys`, best-effort
///
/// Every key is attempted even after failures; workloads go first, the
/// namespace last. Only cancellation stops the pass early.
pub async fn delete_objects(
    ctx: &InstallContext,
    component: &str,
    mut keys: Vec<ObjectKey>,
) -> Result<UninstallReport> {
    keys.sort_by_key(|k| std::cmp::Reverse(kind_priority(&k.kind.kind)));

    let mut report = UninstallReport::new(component);
    for key in keys {
        ctx.check_cancelled(component)?;
        match ctx.client.delete(&key).await {
            Ok(()) => {
                debug!(component, object = %key, "deleted");
                report.removed.push(key);
            }
            Err(e) if e.is_not_found() => {
                debug!(component, object = %key, "already absent");
                report.already_absent.push(key);
            }
            Err(e) => {
                warn!(component, object = %key, error = %e, "failed to delete object");
                report.failures.push((key, e));
            }
        }
    }
    Ok(report)
}
