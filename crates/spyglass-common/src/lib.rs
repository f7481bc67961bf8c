//! Common types for Spyglass: errors, ownership labels, retry, and logging

#![deny(missing_docs)]

pub mod error;
pub mod retry;
pub mod telemetry;

pub use error::{ClientError, ClientErrorKind, Error};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace for the Spyglass control plane
pub const DEFAULT_NAMESPACE: &str = "spyglass-system";

/// Field manager / managed-by value stamped on every installed object
pub const MANAGER_NAME: &str = "spyglass";

// =============================================================================
// Ownership labels
// =============================================================================

/// Standard Kubernetes label naming the tool managing an object
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label naming the Spyglass component that owns an object
pub const LABEL_COMPONENT: &str = "spyglass.io/component";

/// Label carrying the product version an object was applied at
pub const LABEL_VERSION: &str = "spyglass.io/version";

/// Pod selector label used by Spyglass workloads
pub const LABEL_APP: &str = "app";

/// Label selector matching objects owned by one component
pub fn component_selector(component: &str) -> String {
    format!("{LABEL_MANAGED_BY}={MANAGER_NAME},{LABEL_COMPONENT}={component}")
}
