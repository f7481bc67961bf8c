//! Product-wide install configuration
//!
//! Constructed once per invocation and handed to every component installer.

use serde::{Deserialize, Serialize};

use spyglass_common::{Error, Result, DEFAULT_NAMESPACE};

/// Default image registry prefix
pub const DEFAULT_IMAGE_PREFIX: &str = "ghcr.io/spyglass-dev";

/// Everything the component builders are parameterized by
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductConfig {
    /// Installation namespace
    pub namespace: String,
    /// Product version, also the image tag
    pub version: String,
    /// Registry prefix for every image (no trailing slash)
    pub image_prefix: String,
    /// Image names per component
    pub images: ImageNames,
    /// Feature toggles
    pub features: FeatureFlags,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: String::new(),
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            images: ImageNames::default(),
            features: FeatureFlags::default(),
        }
    }
}

/// Image names under the registry prefix
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageNames {
    /// Node agent image
    pub agent: String,
    /// Instrumentation controller image
    pub controller: String,
}

impl Default for ImageNames {
    fn default() -> Self {
        Self {
            agent: "spyglass-agent".to_string(),
            controller: "spyglass-controller".to_string(),
        }
    }
}

/// Optional behavior
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    /// Grant `use` on the privileged pod security policy
    pub psp: bool,
    /// OTLP endpoint the control plane exports its own telemetry to
    pub own_telemetry_endpoint: Option<String>,
}

impl ProductConfig {
    /// Check the config before any builder runs
    pub fn validate(&self) -> Result<()> {
        validate_dns_label("namespace", &self.namespace)?;

        if self.version.trim().is_empty() {
            return Err(Error::validation_for_field("version", "must not be empty"));
        }
        if self.version.chars().any(|c| c.is_whitespace() || c == ':' || c == '/') {
            return Err(Error::validation_for_field(
                "version",
                format!("'{}' is not a valid image tag", self.version),
            ));
        }

        if self.image_prefix.trim().is_empty() {
            return Err(Error::validation_for_field("imagePrefix", "must not be empty"));
        }
        if self.image_prefix.ends_with('/') {
            return Err(Error::validation_for_field(
                "imagePrefix",
                "must not end with '/'",
            ));
        }

        for (field, value) in [
            ("images.agent", &self.images.agent),
            ("images.controller", &self.images.controller),
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation_for_field(field, "must not be empty"));
            }
        }

        if let Some(endpoint) = &self.features.own_telemetry_endpoint {
            if endpoint.trim().is_empty() {
                return Err(Error::validation_for_field(
                    "features.ownTelemetryEndpoint",
                    "must not be empty when set",
                ));
            }
        }
        Ok(())
    }
}

/// RFC 1123 label: lowercase alphanumerics and '-', 1-63 chars
fn validate_dns_label(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-');
    if !valid {
        return Err(Error::validation_for_field(
            field,
            format!("'{}' is not a valid DNS label", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProductConfig {
        ProductConfig {
            version: "1.2.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate_once_version_is_set() {
        assert!(valid().validate().is_ok());
        assert!(ProductConfig::default().validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ProductConfig = serde_json::from_str(
            r#"{"version": "1.2.0", "features": {"psp": true}}"#,
        )
        .unwrap();

        assert_eq!(config.namespace, "spyglass-system");
        assert_eq!(config.image_prefix, DEFAULT_IMAGE_PREFIX);
        assert_eq!(config.images.agent, "spyglass-agent");
        assert!(config.features.psp);
        assert_eq!(config.features.own_telemetry_endpoint, None);
    }

    #[test]
    fn camel_case_keys_are_used() {
        let config: ProductConfig = serde_json::from_str(
            r#"{"version": "1", "imagePrefix": "registry.local", "features": {"ownTelemetryEndpoint": "http://otel:4317"}}"#,
        )
        .unwrap();

        assert_eq!(config.image_prefix, "registry.local");
        assert_eq!(
            config.features.own_telemetry_endpoint.as_deref(),
            Some("http://otel:4317")
        );
    }

    #[test]
    fn invalid_namespace_is_rejected() {
        let too_long = "a".repeat(64);
        for bad in ["", "Spyglass", "-spyglass", "spyglass_system", too_long.as_str()] {
            let config = ProductConfig {
                namespace: bad.to_string(),
                ..valid()
            };
            let err = config.validate().unwrap_err();
            assert!(
                matches!(&err, Error::Validation { field: Some(f), .. } if f == "namespace"),
                "expected namespace error for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn image_prefix_with_trailing_slash_is_rejected() {
        let config = ProductConfig {
            image_prefix: "registry.local/".to_string(),
            ..valid()
        };
        assert!(config.validate().unwrap_err().to_string().contains("'/'"));
    }

    #[test]
    fn version_must_be_a_tag() {
        let config = ProductConfig {
            version: "1.2.0 beta".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_telemetry_endpoint_is_rejected() {
        let mut config = valid();
        config.features.own_telemetry_endpoint = Some(" ".to_string());
        assert!(config.validate().is_err());
    }
}
