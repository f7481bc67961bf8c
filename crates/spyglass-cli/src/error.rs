//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] spyglass_common::Error),

    #[error("invalid config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("logging setup failed: {0}")]
    Telemetry(#[from] spyglass_common::telemetry::TelemetryError),

    #[error(
        "install incomplete: component '{component}' failed after {applied} component(s) were applied; \
         fix the cause and re-run: {message}"
    )]
    PartialInstall {
        component: String,
        applied: usize,
        message: String,
    },

    #[error("uninstall incomplete: {failed} component(s) left objects behind; re-run to retry")]
    PartialUninstall { failed: usize },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }
}
