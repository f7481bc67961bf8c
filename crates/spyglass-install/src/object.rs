//! Typed, identified cluster objects
//!
//! A [`ClusterObject`] is the unit the apply engine works on: an identity
//! ([`ObjectKey`]) plus the full JSON body. Builders produce them from typed
//! `k8s_openapi` structs; the client adapter produces them from live API
//! responses.

use std::fmt;

use kube::discovery::ApiResource;
use serde::Serialize;
use serde_json::{Map, Value};

use spyglass_common::{Error, Result, LABEL_COMPONENT, LABEL_MANAGED_BY, LABEL_VERSION, MANAGER_NAME};

/// API version, kind and plural resource name of an object type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKind {
    /// Full API version (e.g. "apps/v1", "v1")
    pub api_version: String,
    /// Kind (e.g. "DaemonSet")
    pub kind: String,
    /// Plural resource name used in API paths (e.g. "daemonsets")
    pub plural: String,
}

impl ObjectKind {
    /// Derive the kind of a typed `k8s_openapi` resource
    pub fn of<K>() -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        }
    }

    /// Build the kube `ApiResource` for dynamic API access
    pub fn api_resource(&self) -> ApiResource {
        let (group, version) = match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        };
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// Identity of a cluster object: (kind, namespace, name)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object type
    pub kind: ObjectKind,
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Identity of a namespaced object
    pub fn namespaced(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Identity of a cluster-scoped object
    pub fn cluster(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind.kind, self.name),
        }
    }
}

/// A cluster object with its full JSON body
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterObject {
    /// Identity
    pub key: ObjectKey,
    /// Full body including `apiVersion`, `kind` and `metadata`
    pub body: Value,
}

impl ClusterObject {
    /// Convert a typed resource into a cluster object
    ///
    /// Fails if the resource has no name or cannot be serialized.
    pub fn from_resource<K>(resource: &K) -> Result<Self>
    where
        K: kube::Resource<DynamicType = ()> + Serialize,
    {
        let kind = ObjectKind::of::<K>();
        let meta = resource.meta();
        let name = meta.name.clone().ok_or_else(|| {
            Error::serialization_for_kind(kind.kind.clone(), "object has no metadata.name")
        })?;
        let namespace = meta.namespace.clone();
        let body = serde_json::to_value(resource)
            .map_err(|e| Error::serialization_for_kind(kind.kind.clone(), e.to_string()))?;

        Ok(Self::from_parts(
            ObjectKey {
                kind,
                namespace,
                name,
            },
            body,
        ))
    }

    /// Wrap a body returned by the API server
    ///
    /// `apiVersion` and `kind` are filled from `key` when absent, which is
    /// the case for items of a list response.
    pub fn from_parts(key: ObjectKey, mut body: Value) -> Self {
        if let Some(map) = body.as_object_mut() {
            map.entry("apiVersion")
                .or_insert_with(|| Value::String(key.kind.api_version.clone()));
            map.entry("kind")
                .or_insert_with(|| Value::String(key.kind.kind.clone()));
        }
        Self { key, body }
    }

    /// Value of a label, if set
    pub fn label(&self, key: &str) -> Option<&str> {
        self.body
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    /// Set a label, creating `metadata.labels` if needed
    pub fn set_label(&mut self, key: &str, value: &str) {
        if let Some(labels) = metadata_section(&mut self.body, "labels") {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// The live `metadata.resourceVersion`, if any
    pub fn resource_version(&self) -> Option<&str> {
        self.body
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
    }

    /// Stamp the ownership labels for `component` at `version`
    pub fn stamp_ownership(&mut self, component: &str, version: &str) {
        self.set_label(LABEL_MANAGED_BY, MANAGER_NAME);
        self.set_label(LABEL_COMPONENT, component);
        self.set_label(LABEL_VERSION, version);
    }
}

/// Get (creating if absent) a map under `metadata.<section>`
fn metadata_section<'a>(body: &'a mut Value, section: &str) -> Option<&'a mut Map<String, Value>> {
    let metadata = body
        .as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    let section = metadata
        .as_object_mut()?
        .entry(section)
        .or_insert_with(|| Value::Object(Map::new()));
    if section.is_null() {
        *section = Value::Object(Map::new());
    }
    section.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DaemonSet;
    use k8s_openapi::api::core::v1::ServiceAccount;
    use k8s_openapi::api::rbac::v1::ClusterRole;
    use kube::api::ObjectMeta;

    fn service_account(name: Option<&str>) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                namespace: Some("spyglass-system".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn kind_is_derived_from_typed_resource() {
        let kind = ObjectKind::of::<DaemonSet>();
        assert_eq!(kind.api_version, "apps/v1");
        assert_eq!(kind.kind, "DaemonSet");
        assert_eq!(kind.plural, "daemonsets");

        let ar = kind.api_resource();
        assert_eq!(ar.group, "apps");
        assert_eq!(ar.version, "v1");
    }

    #[test]
    fn core_group_kind_has_empty_group() {
        let ar = ObjectKind::of::<ServiceAccount>().api_resource();
        assert_eq!(ar.group, "");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.plural, "serviceaccounts");
    }

    #[test]
    fn from_resource_captures_identity_and_type_meta() {
        let obj = ClusterObject::from_resource(&service_account(Some("agent"))).unwrap();
        assert_eq!(obj.key.name, "agent");
        assert_eq!(obj.key.namespace.as_deref(), Some("spyglass-system"));
        assert_eq!(obj.body["apiVersion"], "v1");
        assert_eq!(obj.body["kind"], "ServiceAccount");
        assert_eq!(obj.key.to_string(), "ServiceAccount spyglass-system/agent");
    }

    #[test]
    fn cluster_scoped_objects_display_without_namespace() {
        let role = ClusterRole {
            metadata: ObjectMeta {
                name: Some("spyglass-agent".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let obj = ClusterObject::from_resource(&role).unwrap();
        assert!(obj.key.namespace.is_none());
        assert_eq!(obj.key.to_string(), "ClusterRole spyglass-agent");
    }

    #[test]
    fn unnamed_resource_is_rejected() {
        let err = ClusterObject::from_resource(&service_account(None)).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn stamp_ownership_sets_all_labels() {
        let mut obj = ClusterObject::from_resource(&service_account(Some("agent"))).unwrap();
        obj.stamp_ownership("agent", "1.2.0");

        assert_eq!(obj.label(LABEL_MANAGED_BY), Some("spyglass"));
        assert_eq!(obj.label(LABEL_COMPONENT), Some("agent"));
        assert_eq!(obj.label(LABEL_VERSION), Some("1.2.0"));
    }

    #[test]
    fn from_parts_fills_missing_type_meta() {
        let key = ObjectKey::namespaced(ObjectKind::of::<ServiceAccount>(), "ns", "sa");
        let obj = ClusterObject::from_parts(
            key,
            serde_json::json!({"metadata": {"name": "sa", "resourceVersion": "42"}}),
        );
        assert_eq!(obj.body["kind"], "ServiceAccount");
        assert_eq!(obj.resource_version(), Some("42"));
    }
}
