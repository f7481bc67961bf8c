//! Installation namespace

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;

use spyglass_common::Result;

use super::to_object;
use crate::config::ProductConfig;
use crate::installer::ComponentInstaller;
use crate::object::ClusterObject;

/// Component name
pub const COMPONENT: &str = "namespace";

/// The namespace every other component installs into
pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Installs the namespace
pub struct NamespaceInstaller {
    namespace: String,
}

impl NamespaceInstaller {
    /// Installer for `config.namespace`
    pub fn new(config: &ProductConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
        }
    }
}

#[async_trait]
impl ComponentInstaller for NamespaceInstaller {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn desired_objects(&self) -> Result<Vec<ClusterObject>> {
        Ok(vec![to_object(COMPONENT, &namespace(&self.namespace))?])
    }
}
