//! Instrumentation controller
//!
//! A single-replica Deployment that watches workloads and records which of
//! them are instrumented. It has no lighter upgrade path, so every run
//! re-applies its full object set.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapEnvSource, Container, EnvFromSource, PodSpec, PodTemplateSpec, SecurityContext,
    ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;

use spyglass_common::Result;

use super::telemetry_config::OWN_TELEMETRY_CONFIG;
use super::{app_labels, image_ref, to_object};
use crate::config::ProductConfig;
use crate::installer::ComponentInstaller;
use crate::object::ClusterObject;

/// Component name
pub const COMPONENT: &str = "controller";

/// Name shared by the controller's service account, role and deployment
pub const CONTROLLER_NAME: &str = "spyglass-controller";

fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(groups.iter().map(|s| s.to_string()).collect()),
        resources: Some(resources.iter().map(|s| s.to_string()).collect()),
        verbs: verbs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// Controller service account
pub fn service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Cluster-wide permissions of the controller
pub fn cluster_role() -> ClusterRole {
    const READ: &[&str] = &["get", "list", "watch"];
    const WRITE: &[&str] = &["get", "list", "watch", "patch", "update"];

    ClusterRole {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        },
        rules: Some(vec![
            rule(&[""], &["pods", "namespaces"], READ),
            rule(&["apps"], &["deployments", "statefulsets", "daemonsets"], WRITE),
            rule(&["apps"], &["replicasets"], READ),
            rule(
                &["spyglass.io"],
                &["instrumentedapplications"],
                &["create", "delete", "get", "list", "patch", "update", "watch"],
            ),
            rule(&["spyglass.io"], &["instrumentedapplications/status"], &["get", "patch", "update"]),
            rule(&[""], &["events"], &["create", "patch"]),
            rule(&["coordination.k8s.io"], &["leases"], &["get", "create", "update"]),
        ]),
        ..Default::default()
    }
}

/// Binds the controller role to its service account
pub fn cluster_role_binding(namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: CONTROLLER_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: CONTROLLER_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Controller deployment
pub fn deployment(config: &ProductConfig) -> Deployment {
    let labels = app_labels(CONTROLLER_NAME);

    Deployment {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_NAME.to_string()),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(CONTROLLER_NAME.to_string()),
                    containers: vec![Container {
                        name: "manager".to_string(),
                        image: Some(image_ref(
                            &config.image_prefix,
                            &config.images.controller,
                            &config.version,
                        )),
                        args: Some(vec!["--leader-elect".to_string()]),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env_from: Some(vec![EnvFromSource {
                            config_map_ref: Some(ConfigMapEnvSource {
                                name: OWN_TELEMETRY_CONFIG.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        security_context: Some(SecurityContext {
                            allow_privilege_escalation: Some(false),
                            run_as_non_root: Some(true),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Installs the instrumentation controller
pub struct ControllerInstaller {
    config: ProductConfig,
}

impl ControllerInstaller {
    /// Installer for the given product config
    pub fn new(config: &ProductConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ComponentInstaller for ControllerInstaller {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn desired_objects(&self) -> Result<Vec<ClusterObject>> {
        let ns = &self.config.namespace;
        Ok(vec![
            to_object(COMPONENT, &service_account(ns))?,
            to_object(COMPONENT, &cluster_role())?,
            to_object(COMPONENT, &cluster_role_binding(ns))?,
            to_object(COMPONENT, &deployment(&self.config))?,
        ])
    }
}
