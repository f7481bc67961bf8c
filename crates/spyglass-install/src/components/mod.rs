//! Spyglass component installers and their object builders
//!
//! Builders are pure functions over [`ProductConfig`]. Each installer wraps
//! one component's builders; applying, upgrading and removing come from the
//! [`ComponentInstaller`] default methods.

pub mod agent;
pub mod controller;
pub mod namespace;
pub mod telemetry_config;

use std::collections::BTreeMap;

use serde::Serialize;

use spyglass_common::{Error, Result, LABEL_APP};

use crate::config::ProductConfig;
use crate::installer::{ComponentInstaller, Registry};
use crate::object::ClusterObject;

pub use agent::AgentInstaller;
pub use controller::ControllerInstaller;
pub use namespace::NamespaceInstaller;
pub use telemetry_config::TelemetryConfigInstaller;

/// Full image reference: `{prefix}/{name}:{tag}`
pub fn image_ref(prefix: &str, name: &str, tag: &str) -> String {
    format!("{}/{}:{}", prefix.trim_end_matches('/'), name, tag)
}

/// Pod selector labels for a workload
pub(crate) fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_APP.to_string(), app.to_string())])
}

/// Convert a typed resource, attributing failures to `component`
pub(crate) fn to_object<K>(component: &str, resource: &K) -> Result<ClusterObject>
where
    K: kube::Resource<DynamicType = ()> + Serialize,
{
    ClusterObject::from_resource(resource).map_err(|e| Error::build(component, e.to_string()))
}

impl Registry {
    /// The Spyglass control plane in dependency order
    ///
    /// The namespace comes first, then the telemetry ConfigMap the
    /// workloads import, then the controller and the node agent.
    pub fn standard(config: &ProductConfig) -> Result<Self> {
        config.validate()?;
        let installers: Vec<Box<dyn ComponentInstaller>> = vec![
            Box::new(NamespaceInstaller::new(config)),
            Box::new(TelemetryConfigInstaller::new(config)),
            Box::new(ControllerInstaller::new(config)),
            Box::new(AgentInstaller::new(config)),
        ];
        Registry::new(installers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProductConfig {
        ProductConfig {
            version: "1.2.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn image_ref_joins_prefix_name_and_tag() {
        assert_eq!(
            image_ref("ghcr.io/spyglass-dev", "spyglass-agent", "1.2.0"),
            "ghcr.io/spyglass-dev/spyglass-agent:1.2.0"
        );
        assert_eq!(image_ref("registry.local/", "a", "b"), "registry.local/a:b");
    }

    #[test]
    fn standard_registry_is_in_dependency_order() {
        let registry = Registry::standard(&config()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["namespace", "telemetry-config", "controller", "agent"]
        );
    }

    #[test]
    fn standard_registry_validates_config() {
        let config = ProductConfig {
            namespace: "Not_Valid".to_string(),
            ..config()
        };
        assert!(Registry::standard(&config).is_err());
    }

    /// Story: every standard component builds and labels its objects
    #[test]
    fn story_every_component_builds_named_objects() {
        let registry = Registry::standard(&config()).unwrap();
        for installer in registry.iter() {
            let objects = installer.desired_objects().unwrap();
            assert!(!objects.is_empty(), "{} has no objects", installer.name());
            for object in objects {
                assert!(!object.key.name.is_empty());
                assert_eq!(object.body["metadata"]["name"], object.key.name.as_str());
            }
        }
    }
}
