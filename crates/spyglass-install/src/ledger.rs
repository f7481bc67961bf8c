//! Installation version ledger
//!
//! A single ConfigMap in the installation namespace records the last
//! successfully applied product version and the components it covered. A
//! `configVersion` counter, bumped on every write, lets a run detect that
//! another run wrote the ledger after it was read. The write itself also
//! carries the live `resourceVersion`, so a race between the re-read and the
//! update fails with 409 Conflict instead of overwriting.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use tracing::info;

use spyglass_common::{Error, Result, LABEL_MANAGED_BY, MANAGER_NAME};

use crate::client::ClusterClient;
use crate::diff::{merge_owned, owned_fields};
use crate::object::{ClusterObject, ObjectKey, ObjectKind};

/// Name of the ledger ConfigMap
pub const LEDGER_NAME: &str = "spyglass-installation";

const KEY_VERSION: &str = "version";
const KEY_COMPONENTS: &str = "installedComponents";
const KEY_CONFIG_VERSION: &str = "configVersion";

/// What the ledger currently records
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Last successfully applied version, `None` when never installed
    pub version: Option<String>,
    /// Write counter, 0 when the ledger does not exist
    pub config_version: u64,
    /// Components covered by the last successful install
    pub installed_components: Vec<String>,
    /// Whether the ledger object exists
    pub found: bool,
}

impl LedgerEntry {
    /// Write precondition matching this read: the counter if the ledger
    /// existed, `None` if it did not
    pub fn precondition(&self) -> Option<u64> {
        self.found.then_some(self.config_version)
    }
}

/// Reads and writes the ledger ConfigMap
#[derive(Clone)]
pub struct Ledger {
    client: Arc<dyn ClusterClient>,
    namespace: String,
}

impl Ledger {
    /// Ledger stored in `namespace`
    pub fn new(client: Arc<dyn ClusterClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Identity of the ledger object
    pub fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(ObjectKind::of::<ConfigMap>(), &self.namespace, LEDGER_NAME)
    }

    /// Read the current entry; absence is a valid state, not an error
    pub async fn read(&self) -> Result<LedgerEntry> {
        let live = self
            .client
            .get(&self.key())
            .await
            .map_err(|e| Error::ledger_read(e.to_string()))?;
        match live {
            Some(object) => parse_entry(&object),
            None => Ok(LedgerEntry::default()),
        }
    }

    /// Record `version` as installed, guarded by `expected`
    ///
    /// `expected` is the `configVersion` seen when the ledger was read, or
    /// `None` when it did not exist (see [`LedgerEntry::precondition`]).
    /// Fails with `Conflict` when the ledger changed since then, including
    /// when it appeared or vanished.
    pub async fn write(
        &self,
        version: &str,
        installed_components: &[String],
        expected: Option<u64>,
    ) -> Result<()> {
        let key = self.key();
        let live = self
            .client
            .get(&key)
            .await
            .map_err(|e| Error::transport("ledger", e.to_string()))?;

        let current = match &live {
            Some(object) => Some(parse_entry(object)?.config_version),
            None => None,
        };
        match (expected, current) {
            (Some(_), None) => {
                return Err(Error::conflict(
                    key.to_string(),
                    "ledger was removed by another run",
                ));
            }
            (None, Some(_)) => {
                return Err(Error::conflict(
                    key.to_string(),
                    "ledger was created by another run",
                ));
            }
            (Some(expected), Some(current)) if expected != current => {
                return Err(Error::conflict(
                    key.to_string(),
                    format!("configVersion advanced from {} to {}", expected, current),
                ));
            }
            _ => {}
        }

        let next = expected.unwrap_or(0) + 1;
        let desired = self.desired(version, installed_components, next)?;
        let result = match live {
            None => self.client.create(&desired).await,
            Some(live) => {
                let body = merge_owned(&desired.body, &live.body, owned_fields("ConfigMap"));
                self.client
                    .update(&ClusterObject::from_parts(key.clone(), body))
                    .await
            }
        };
        result.map_err(|e| {
            if e.is_conflict() {
                Error::conflict(key.to_string(), e.message)
            } else {
                Error::transport("ledger", e.to_string())
            }
        })?;

        info!(
            version,
            config_version = next,
            components = installed_components.len(),
            "ledger written"
        );
        Ok(())
    }

    /// Delete the ledger; a missing ledger is fine
    pub async fn clear(&self) -> Result<()> {
        match self.client.delete(&self.key()).await {
            Ok(()) => {
                info!(namespace = %self.namespace, "ledger cleared");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::transport("ledger", e.to_string())),
        }
    }

    fn desired(
        &self,
        version: &str,
        installed_components: &[String],
        config_version: u64,
    ) -> Result<ClusterObject> {
        let components = serde_json::to_string(installed_components)
            .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))?;
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(LEDGER_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    LABEL_MANAGED_BY.to_string(),
                    MANAGER_NAME.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (KEY_VERSION.to_string(), version.to_string()),
                (KEY_COMPONENTS.to_string(), components),
                (KEY_CONFIG_VERSION.to_string(), config_version.to_string()),
            ])),
            ..Default::default()
        };
        ClusterObject::from_resource(&cm)
    }
}

fn parse_entry(object: &ClusterObject) -> Result<LedgerEntry> {
    let field = |name: &str| {
        object
            .body
            .pointer(&format!("/data/{name}"))
            .and_then(|v| v.as_str())
    };

    let config_version = match field(KEY_CONFIG_VERSION) {
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            Error::ledger_read(format!("malformed {}: {:?}: {}", KEY_CONFIG_VERSION, raw, e))
        })?,
        None => 0,
    };
    let installed_components = match field(KEY_COMPONENTS) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            Error::ledger_read(format!("malformed {}: {}", KEY_COMPONENTS, e))
        })?,
        None => Vec::new(),
    };
    let version = field(KEY_VERSION)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    Ok(LedgerEntry {
        version,
        config_version,
        installed_components,
        found: true,
    })
}
