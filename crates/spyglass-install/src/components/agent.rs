//! Node agent
//!
//! A privileged DaemonSet on every Linux node. It needs the host PID and
//! network namespaces and host mounts to attach probes to running
//! processes, so its role is read-mostly and its pod is not.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapEnvSource, Container, EnvFromSource, EnvVar, EnvVarSource,
    HostPathVolumeSource, ObjectFieldSelector, PodSpec, PodTemplateSpec, SecurityContext,
    ServiceAccount, Toleration, Volume, VolumeMount,
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
pub const COMPONENT: &str = "agent";

/// Name shared by the agent's service account, role and daemon set
pub const AGENT_NAME: &str = "spyglass-agent";

/// Container name inside the agent pod
pub const AGENT_CONTAINER: &str = "agent";

/// Host paths mounted into the agent: (volume name, path, bidirectional)
const HOST_MOUNTS: &[(&str, &str, bool)] = &[
    ("run-dir", "/run", true),
    ("var-dir", "/var", true),
    ("spyglass", "/var/spyglass", true),
    ("kernel-debug", "/sys/kernel/debug", false),
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

/// Agent service account
pub fn service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(AGENT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Agent permissions, plus `use` of the privileged PSP when `psp` is set
pub fn cluster_role(psp: bool) -> ClusterRole {
    const READ: &[&str] = &["get", "list", "watch"];

    let mut rules = vec![
        rule("", &["pods"], READ),
        rule("", &["pods/status"], &["get"]),
        rule("", &["nodes"], READ),
        rule("apps", &["replicasets"], READ),
        rule("apps", &["deployments"], READ),
        rule("apps", &["deployments/status"], &["get"]),
        rule("apps", &["statefulsets"], READ),
        rule("apps", &["statefulsets/status"], &["get"]),
        rule("apps", &["daemonsets"], READ),
        rule("apps", &["daemonsets/status"], &["get"]),
        rule(
            "spyglass.io",
            &["instrumentedapplications"],
            &["create", "get", "list", "patch", "update", "watch"],
        ),
        rule("", &["namespaces"], READ),
    ];

    if psp {
        rules.push(PolicyRule {
            api_groups: Some(strings(&["policy"])),
            resources: Some(strings(&["podsecuritypolicies"])),
            resource_names: Some(strings(&["privileged"])),
            verbs: strings(&["use"]),
            ..Default::default()
        });
    }

    ClusterRole {
        metadata: ObjectMeta {
            name: Some(AGENT_NAME.to_string()),
            ..Default::default()
        },
        rules: Some(rules),
        ..Default::default()
    }
}

/// Binds the agent role to its service account
pub fn cluster_role_binding(namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(AGENT_NAME.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: AGENT_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: AGENT_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The privileged node daemon set
pub fn daemon_set(config: &ProductConfig) -> DaemonSet {
    let labels = app_labels(AGENT_NAME);

    let volumes = HOST_MOUNTS
        .iter()
        .map(|(name, path, _)| Volume {
            name: name.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    let mounts = HOST_MOUNTS
        .iter()
        .map(|(name, path, bidirectional)| VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            mount_propagation: bidirectional.then(|| "Bidirectional".to_string()),
            ..Default::default()
        })
        .collect();

    DaemonSet {
        metadata: ObjectMeta {
            name: Some(AGENT_NAME.to_string()),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
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
                    node_selector: Some(BTreeMap::from([(
                        "kubernetes.io/os".to_string(),
                        "linux".to_string(),
                    )])),
                    tolerations: Some(vec![Toleration {
                        key: Some("node.kubernetes.io/os".to_string()),
                        operator: Some("Equal".to_string()),
                        value: Some("windows".to_string()),
                        effect: Some("NoSchedule".to_string()),
                        ..Default::default()
                    }]),
                    volumes: Some(volumes),
                    containers: vec![Container {
                        name: AGENT_CONTAINER.to_string(),
                        image: Some(image_ref(
                            &config.image_prefix,
                            &config.images.agent,
                            &config.version,
                        )),
                        env: Some(vec![
                            field_env("NODE_NAME", "spec.nodeName"),
                            field_env("NODE_IP", "status.hostIP"),
                        ]),
                        env_from: Some(vec![EnvFromSource {
                            config_map_ref: Some(ConfigMapEnvSource {
                                name: OWN_TELEMETRY_CONFIG.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        volume_mounts: Some(mounts),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        security_context: Some(SecurityContext {
                            privileged: Some(true),
                            capabilities: Some(Capabilities {
                                add: Some(strings(&["SYS_PTRACE"])),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    dns_policy: Some("ClusterFirstWithHostNet".to_string()),
                    service_account_name: Some(AGENT_NAME.to_string()),
                    host_network: Some(true),
                    host_pid: Some(true),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Installs the node agent
pub struct AgentInstaller {
    config: ProductConfig,
}

impl AgentInstaller {
    /// Installer for the given product config
    pub fn new(config: &ProductConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ComponentInstaller for AgentInstaller {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn desired_objects(&self) -> Result<Vec<ClusterObject>> {
        let ns = &self.config.namespace;
        Ok(vec![
            to_object(COMPONENT, &service_account(ns))?,
            to_object(COMPONENT, &cluster_role(self.config.features.psp))?,
            to_object(COMPONENT, &cluster_role_binding(ns))?,
            to_object(COMPONENT, &daemon_set(&self.config))?,
        ])
    }

    fn supports_upgrade(&self) -> bool {
        true
    }
}
