//! Error types for the Spyglass installer
//!
//! Errors carry the component and object identity involved so a failed
//! transaction can be reported without re-reading logs. Cluster API failures
//! are classified once, at the client adapter boundary, into a
//! [`ClientErrorKind`] and travel verbatim from there.

use std::fmt;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Classification of a failed cluster API call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientErrorKind {
    /// The object does not exist
    NotFound,
    /// Optimistic-concurrency collision or object already exists
    Conflict,
    /// Authentication or authorization failure
    Forbidden,
    /// The API server rejected the object as malformed (400/422)
    Invalid,
    /// Connectivity, timeout, or any other server-side failure
    Transport,
}

impl ClientErrorKind {
    /// Classify an HTTP status code returned by the API server
    pub fn from_status(code: u16) -> Self {
        match code {
            404 => ClientErrorKind::NotFound,
            409 => ClientErrorKind::Conflict,
            401 | 403 => ClientErrorKind::Forbidden,
            400 | 422 => ClientErrorKind::Invalid,
            _ => ClientErrorKind::Transport,
        }
    }
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientErrorKind::NotFound => "not found",
            ClientErrorKind::Conflict => "conflict",
            ClientErrorKind::Forbidden => "forbidden",
            ClientErrorKind::Invalid => "invalid",
            ClientErrorKind::Transport => "transport",
        };
        f.write_str(s)
    }
}

/// A failed call through the cluster client adapter
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    /// Classification of the failure
    pub kind: ClientErrorKind,
    /// Message from the API server or transport, verbatim
    pub message: String,
}

impl ClientError {
    /// Create a client error of the given kind
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::NotFound, message)
    }

    /// Shorthand for a `Conflict` error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Conflict, message)
    }

    /// Shorthand for a `Forbidden` error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Forbidden, message)
    }

    /// Shorthand for a `Transport` error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Transport, message)
    }

    /// Whether the object was absent
    pub fn is_not_found(&self) -> bool {
        self.kind == ClientErrorKind::NotFound
    }

    /// Whether this is an optimistic-concurrency collision
    pub fn is_conflict(&self) -> bool {
        self.kind == ClientErrorKind::Conflict
    }
}

/// Main error type for Spyglass installer operations
#[derive(Debug, Error)]
pub enum Error {
    /// Desired-object construction failed (programmer or config error)
    #[error("build error [{component}]: {message}")]
    Build {
        /// Component whose builders failed
        component: String,
        /// Description of what failed
        message: String,
    },

    /// A single cluster operation failed while applying a component
    #[error("apply error [{component}] {operation} {object}: {source}")]
    Apply {
        /// Component being applied
        component: String,
        /// Operation that failed (get, create, update, delete, list)
        operation: &'static str,
        /// Identity of the offending object, e.g. `DaemonSet spyglass/agent`
        object: String,
        /// The classified cluster error
        source: ClientError,
    },

    /// Optimistic-concurrency collision on the ledger or an object
    #[error("conflict on {object}: {message}")]
    Conflict {
        /// Identity of the contested object
        object: String,
        /// Description of the collision
        message: String,
    },

    /// The installation ledger could not be read
    #[error("ledger read error: {message}")]
    LedgerRead {
        /// Underlying cause, verbatim
        message: String,
    },

    /// Connectivity or permission failure outside a component apply
    #[error("transport error [{context}]: {message}")]
    Transport {
        /// Where the failure happened (e.g. "client", "ledger")
        context: String,
        /// Underlying cause, verbatim
        message: String,
    },

    /// The caller cancelled the transaction
    #[error("cancelled during {context}")]
    Cancelled {
        /// Where cancellation was observed
        context: String,
    },

    /// One or more objects could not be removed during uninstall
    #[error("uninstall error [{component}]: {failed} object(s) could not be removed: {message}")]
    Uninstall {
        /// Component being removed
        component: String,
        /// Number of objects that failed to delete
        failed: usize,
        /// Joined failure descriptions
        message: String,
    },

    /// Invalid product or command configuration
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field, if known
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The object kind being serialized (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a build error for a component
    pub fn build(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Build {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create an apply error for a failed cluster operation
    ///
    /// A `Conflict` from the cluster is promoted to [`Error::Conflict`] so
    /// callers can decide to re-run the whole transaction.
    pub fn apply(
        component: impl Into<String>,
        operation: &'static str,
        object: impl Into<String>,
        source: ClientError,
    ) -> Self {
        let object = object.into();
        if source.is_conflict() {
            return Self::Conflict {
                object,
                message: source.message,
            };
        }
        Self::Apply {
            component: component.into(),
            operation,
            object,
            source,
        }
    }

    /// Create a conflict error
    pub fn conflict(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a ledger read error
    pub fn ledger_read(msg: impl Into<String>) -> Self {
        Self::LedgerRead {
            message: msg.into(),
        }
    }

    /// Create a transport error with context
    pub fn transport(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with object kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Check if re-running the whole transaction may succeed
    ///
    /// Conflicts and transport failures are transient. Build, validation and
    /// serialization errors need a config fix. Apply errors follow the
    /// classification of the underlying cluster error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Transport { .. } => true,
            Error::LedgerRead { .. } => true,
            Error::Apply { source, .. } => source.kind == ClientErrorKind::Transport,
            Error::Build { .. } => false,
            Error::Cancelled { .. } => false,
            Error::Uninstall { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
        }
    }

    /// Get the component name if this error is tied to a component
    pub fn component(&self) -> Option<&str> {
        match self {
            Error::Build { component, .. } => Some(component),
            Error::Apply { component, .. } => Some(component),
            Error::Uninstall { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Whether this error is an optimistic-concurrency collision
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_classify_into_client_error_kinds() {
        assert_eq!(ClientErrorKind::from_status(404), ClientErrorKind::NotFound);
        assert_eq!(ClientErrorKind::from_status(409), ClientErrorKind::Conflict);
        assert_eq!(ClientErrorKind::from_status(401), ClientErrorKind::Forbidden);
        assert_eq!(ClientErrorKind::from_status(403), ClientErrorKind::Forbidden);
        assert_eq!(ClientErrorKind::from_status(422), ClientErrorKind::Invalid);
        assert_eq!(ClientErrorKind::from_status(400), ClientErrorKind::Invalid);
        assert_eq!(ClientErrorKind::from_status(500), ClientErrorKind::Transport);
        assert_eq!(ClientErrorKind::from_status(503), ClientErrorKind::Transport);
    }

    /// Story: a rejected write names the component, object and cluster message
    #[test]
    fn story_apply_error_surfaces_cluster_message_verbatim() {
        let err = Error::apply(
            "agent",
            "create",
            "DaemonSet spyglass/spyglass-agent",
            ClientError::forbidden("daemonsets.apps is forbidden: User \"ci\" cannot create"),
        );

        let msg = err.to_string();
        assert!(msg.contains("[agent]"));
        assert!(msg.contains("DaemonSet spyglass/spyglass-agent"));
        assert!(msg.contains("cannot create"));
        assert_eq!(err.component(), Some("agent"));
        assert!(!err.is_retryable());
    }

    /// Story: a 409 during apply becomes a retryable transaction conflict
    #[test]
    fn story_cluster_conflict_is_promoted_to_conflict_error() {
        let err = Error::apply(
            "controller",
            "update",
            "Deployment spyglass/spyglass-controller",
            ClientError::conflict("the object has been modified"),
        );

        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("the object has been modified"));
    }

    #[test]
    fn transport_apply_errors_are_retryable() {
        let err = Error::apply(
            "agent",
            "get",
            "ServiceAccount spyglass/spyglass-agent",
            ClientError::transport("connection reset by peer"),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!Error::build("agent", "missing image").is_retryable());
        assert!(!Error::validation("namespace must not be empty").is_retryable());
        assert!(!Error::serialization("bad json").is_retryable());
        assert!(!Error::cancelled("agent").is_retryable());
    }

    #[test]
    fn validation_for_field_keeps_field_path() {
        match Error::validation_for_field("imagePrefix", "must not be empty") {
            Error::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("imagePrefix"));
                assert_eq!(message, "must not be empty");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn client_error_display_includes_kind() {
        let err = ClientError::not_found("configmaps \"x\" not found");
        assert_eq!(err.to_string(), "not found: configmaps \"x\" not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn component_accessor_is_none_for_ledger_errors() {
        assert_eq!(Error::ledger_read("boom").component(), None);
        assert_eq!(Error::conflict("ledger", "moved").component(), None);
    }
}
