//! Shared own-telemetry ConfigMap
//!
//! The controller and the agent import this ConfigMap through `envFrom`, so
//! it has to exist before either workload starts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;

use spyglass_common::Result;

use super::to_object;
use crate::config::ProductConfig;
use crate::installer::ComponentInstaller;
use crate::object::ClusterObject;

/// Component name
pub const COMPONENT: &str = "telemetry-config";

/// Name of the ConfigMap workloads import
pub const OWN_TELEMETRY_CONFIG: &str = "spyglass-own-telemetry";

/// OTLP exporter environment for the control plane's own telemetry
///
/// Without an endpoint the SDK is disabled outright.
pub fn config_map(namespace: &str, endpoint: Option<&str>) -> ConfigMap {
    let data = match endpoint {
        Some(endpoint) => BTreeMap::from([
            ("OTEL_SDK_DISABLED".to_string(), "false".to_string()),
            ("OTEL_EXPORTER_OTLP_ENDPOINT".to_string(), endpoint.to_string()),
            ("OTEL_TRACES_EXPORTER".to_string(), "otlp".to_string()),
            ("OTEL_METRICS_EXPORTER".to_string(), "otlp".to_string()),
            ("OTEL_LOGS_EXPORTER".to_string(), "none".to_string()),
        ]),
        None => BTreeMap::from([("OTEL_SDK_DISABLED".to_string(), "true".to_string())]),
    };

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(OWN_TELEMETRY_CONFIG.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Installs the own-telemetry ConfigMap
pub struct TelemetryConfigInstaller {
    namespace: String,
    endpoint: Option<String>,
}

impl TelemetryConfigInstaller {
    /// Installer for the configured namespace and endpoint
    pub fn new(config: &ProductConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            endpoint: config.features.own_telemetry_endpoint.clone(),
        }
    }
}

#[async_trait]
impl ComponentInstaller for TelemetryConfigInstaller {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn desired_objects(&self) -> Result<Vec<ClusterObject>> {
        let cm = config_map(&self.namespace, self.endpoint.as_deref());
        Ok(vec![to_object(COMPONENT, &cm)?])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::installer::InstallContext;
    use crate::testing::MemoryCluster;

    #[test]
    fn endpoint_enables_otlp_export() {
        let cm = config_map("spyglass-system", Some("http://collector:4317"));
        let data = cm.data.unwrap();
        assert_eq!(data["OTEL_SDK_DISABLED"], "false");
        assert_eq!(data["OTEL_EXPORTER_OTLP_ENDPOINT"], "http://collector:4317");
    }

    #[test]
    fn missing_endpoint_disables_sdk() {
        let cm = config_map("spyglass-system", None);
        let data = cm.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data["OTEL_SDK_DISABLED"], "true");
    }

    /// Story: an operator turns the own-telemetry endpoint off; the agent
    /// must stop seeing the old exporter endpoint in the imported ConfigMap
    #[tokio::test]
    async fn story_disabling_endpoint_removes_exporter_keys() {
        let cluster = Arc::new(MemoryCluster::new());
        let enabled = TelemetryConfigInstaller {
            namespace: "spyglass-system".to_string(),
            endpoint: Some("http://collector:4317".to_string()),
        };
        let ctx = InstallContext::new(cluster.clone(), CancellationToken::new(), "1.0.0");
        enabled.install_from_scratch(&ctx).await.unwrap();

        let disabled = TelemetryConfigInstaller {
            namespace: "spyglass-system".to_string(),
            endpoint: None,
        };
        let ctx = InstallContext::new(cluster.clone(), CancellationToken::new(), "1.1.0");
        let stats = disabled.install_from_scratch(&ctx).await.unwrap();

        assert_eq!(stats.updated, 1);
        let key = disabled.desired_objects().unwrap().remove(0).key;
        let live = cluster.object(&key).unwrap();
        assert_eq!(
            live["data"],
            serde_json::json!({"OTEL_SDK_DISABLED": "true"})
        );

        // Converged: a re-run changes nothing
        let stats = disabled.install_from_scratch(&ctx).await.unwrap();
        assert_eq!(stats.unchanged, 1);
    }
}
