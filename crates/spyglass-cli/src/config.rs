//! Kubeconfig resolution and product config files
//!
//! The kubeconfig resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `SPYGLASS_KUBECONFIG` environment variable
//! 3. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config` / in-cluster)

use std::path::{Path, PathBuf};

use spyglass_install::ProductConfig;

use crate::{Error, Result};

const SPYGLASS_KUBECONFIG_ENV: &str = "SPYGLASS_KUBECONFIG";

/// Resolve a kubeconfig path using the priority chain.
///
/// Returns `None` to use kube defaults.
pub fn resolve_kubeconfig(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_kubeconfig_from(explicit, std::env::var(SPYGLASS_KUBECONFIG_ENV).ok())
}

fn resolve_kubeconfig_from(explicit: Option<&Path>, env: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    env.filter(|path| !path.is_empty()).map(PathBuf::from)
}

/// Parse a product config file (YAML, camelCase keys)
///
/// Keys missing from the file keep their defaults.
pub fn parse_product_config(path: &Path, contents: &str) -> Result<ProductConfig> {
    if contents.trim().is_empty() {
        return Ok(ProductConfig::default());
    }
    serde_yaml::from_str(contents).map_err(|source| Error::ConfigFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a product config file, or the defaults when no file is given
pub fn load_product_config(path: Option<&Path>) -> Result<ProductConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                Error::command_failed(format!("failed to read {}: {}", path.display(), e))
            })?;
            parse_product_config(path, &contents)
        }
        None => Ok(ProductConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_kubeconfig_wins() {
        let resolved = resolve_kubeconfig_from(
            Some(Path::new("/tmp/explicit")),
            Some("/tmp/from-env".to_string()),
        );
        assert_eq!(resolved, Some(PathBuf::from("/tmp/explicit")));
    }

    #[test]
    fn env_kubeconfig_is_used_when_no_flag() {
        let resolved = resolve_kubeconfig_from(None, Some("/tmp/from-env".to_string()));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env")));
    }

    #[test]
    fn empty_env_falls_back_to_kube_default() {
        assert_eq!(resolve_kubeconfig_from(None, Some(String::new())), None);
        assert_eq!(resolve_kubeconfig_from(None, None), None);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let yaml = r#"
namespace: observability
version: 1.4.0
imagePrefix: registry.local/spyglass
features:
  psp: true
  ownTelemetryEndpoint: http://collector:4317
"#;
        let config = parse_product_config(Path::new("spyglass.yaml"), yaml).unwrap();

        assert_eq!(config.namespace, "observability");
        assert_eq!(config.version, "1.4.0");
        assert_eq!(config.image_prefix, "registry.local/spyglass");
        assert_eq!(config.images.agent, "spyglass-agent");
        assert!(config.features.psp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_product_config(Path::new("empty.yaml"), "\n").unwrap();
        assert_eq!(config, ProductConfig::default());
    }

    #[test]
    fn malformed_file_names_the_path() {
        let err = parse_product_config(Path::new("bad.yaml"), "features: [1, 2").unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_product_config(Some(Path::new("/nonexistent/spyglass.yaml"))).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(err.to_string().contains("/nonexistent/spyglass.yaml"));
    }
}
