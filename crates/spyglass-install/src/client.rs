//! Cluster client adapter
//!
//! The engine talks to the cluster only through [`ClusterClient`]: get,
//! create, update, delete, and list-by-label. Every failure is classified
//! into a [`ClientError`] here so nothing above this module needs to know
//! about kube-rs error shapes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
#[cfg(test)]
use mockall::automock;
use tracing::trace;

use spyglass_common::{ClientError, ClientErrorKind, Error, MANAGER_NAME};

use crate::object::{ClusterObject, ObjectKey, ObjectKind};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to list objects and which labels to match
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListScope {
    /// Namespace to list in, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Equality-based label selector (e.g. `a=b,c=d`)
    pub selector: String,
}

/// Minimal set of cluster primitives the apply engine relies on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch an object, `Ok(None)` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<ClusterObject>, ClientError>;

    /// Create an object
    async fn create(&self, object: &ClusterObject) -> Result<(), ClientError>;

    /// Replace an object; the body's `resourceVersion` guards against
    /// concurrent modification
    async fn update(&self, object: &ClusterObject) -> Result<(), ClientError>;

    /// Delete an object; a missing object yields a `NotFound` error
    async fn delete(&self, key: &ObjectKey) -> Result<(), ClientError>;

    /// List objects of a kind matching a label selector
    async fn list_by_label(
        &self,
        kind: &ObjectKind,
        scope: &ListScope,
    ) -> Result<Vec<ClusterObject>, ClientError>;
}

/// Classify a kube-rs error
pub fn classify(err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) => ClientError::new(ClientErrorKind::from_status(ae.code), ae.message),
        other => ClientError::transport(other.to_string()),
    }
}

/// [`ClusterClient`] backed by the Kubernetes API through kube-rs
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig, or the inferred default
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, Error> {
        let mut config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::transport("client", format!("failed to read kubeconfig: {}", e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        Error::transport("client", format!("failed to load kubeconfig: {}", e))
                    })?
            }
            None => Config::infer().await.map_err(|e| {
                Error::transport("client", format!("failed to infer config: {}", e))
            })?,
        };
        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

        let client = Client::try_from(config)
            .map_err(|e| Error::transport("client", format!("failed to create client: {}", e)))?;
        Ok(Self::new(client))
    }

    fn api(&self, kind: &ObjectKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(MANAGER_NAME.to_string()),
            ..Default::default()
        }
    }
}

fn to_dynamic(object: &ClusterObject) -> Result<DynamicObject, ClientError> {
    serde_json::from_value(object.body.clone()).map_err(|e| {
        ClientError::new(
            ClientErrorKind::Invalid,
            format!("{} is not a valid object: {}", object.key, e),
        )
    })
}

fn from_dynamic(key: ObjectKey, object: DynamicObject) -> Result<ClusterObject, ClientError> {
    let body = serde_json::to_value(object).map_err(|e| {
        ClientError::transport(format!("failed to decode {}: {}", key, e))
    })?;
    Ok(ClusterObject::from_parts(key, body))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ClusterObject>, ClientError> {
        let api = self.api(&key.kind, key.namespace.as_deref());
        match api.get_opt(&key.name).await.map_err(classify)? {
            Some(obj) => from_dynamic(key.clone(), obj).map(Some),
            None => Ok(None),
        }
    }

    async fn create(&self, object: &ClusterObject) -> Result<(), ClientError> {
        let api = self.api(&object.key.kind, object.key.namespace.as_deref());
        api.create(&Self::post_params(), &to_dynamic(object)?)
            .await
            .map_err(classify)?;
        trace!(object = %object.key, "created");
        Ok(())
    }

    async fn update(&self, object: &ClusterObject) -> Result<(), ClientError> {
        let api = self.api(&object.key.kind, object.key.namespace.as_deref());
        api.replace(&object.key.name, &Self::post_params(), &to_dynamic(object)?)
            .await
            .map_err(classify)?;
        trace!(object = %object.key, "replaced");
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), ClientError> {
        let api = self.api(&key.kind, key.namespace.as_deref());
        api.delete(&key.name, &DeleteParams::background())
            .await
            .map_err(classify)?;
        trace!(object = %key, "deleted");
        Ok(())
    }

    async fn list_by_label(
        &self,
        kind: &ObjectKind,
        scope: &ListScope,
    ) -> Result<Vec<ClusterObject>, ClientError> {
        let api = self.api(kind, scope.namespace.as_deref());
        let list = api
            .list(&ListParams::default().labels(&scope.selector))
            .await
            .map_err(classify)?;

        list.items
            .into_iter()
            .map(|item| {
                let key = ObjectKey {
                    kind: kind.clone(),
                    namespace: item.metadata.namespace.clone(),
                    name: item.metadata.name.clone().unwrap_or_default(),
                };
                from_dynamic(key, item)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn api_errors_are_classified_by_status() {
        let err = classify(api_error(403, "daemonsets.apps is forbidden"));
        assert_eq!(err.kind, ClientErrorKind::Forbidden);
        assert_eq!(err.message, "daemonsets.apps is forbidden");

        assert_eq!(classify(api_error(404, "nope")).kind, ClientErrorKind::NotFound);
        assert_eq!(
            classify(api_error(409, "the object has been modified")).kind,
            ClientErrorKind::Conflict
        );
        assert_eq!(classify(api_error(422, "spec.selector: Invalid")).kind, ClientErrorKind::Invalid);
        assert_eq!(classify(api_error(500, "etcd timeout")).kind, ClientErrorKind::Transport);
    }

    #[test]
    fn dynamic_conversion_keeps_identity() {
        let key = ObjectKey::namespaced(
            ObjectKind::of::<k8s_openapi::api::core::v1::ConfigMap>(),
            "spyglass-system",
            "cm",
        );
        let object = ClusterObject::from_parts(
            key.clone(),
            serde_json::json!({
                "metadata": {"name": "cm", "namespace": "spyglass-system"},
                "data": {"a": "b"}
            }),
        );

        let dynamic = to_dynamic(&object).unwrap();
        assert_eq!(dynamic.metadata.name.as_deref(), Some("cm"));

        let back = from_dynamic(key, dynamic).unwrap();
        assert_eq!(back.body["data"]["a"], "b");
        assert_eq!(back.body["kind"], "ConfigMap");
    }
}
