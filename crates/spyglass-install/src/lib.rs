//! Spyglass control-plane installer
//!
//! This crate provides:
//! - The cluster client adapter (`ClusterClient`, `KubeClusterClient`)
//! - Owned-field diffing and per-object apply, prune and delete
//! - The `ComponentInstaller` contract, the ordered `Registry`, and the
//!   standard Spyglass components with their object builders
//! - The installation version ledger
//! - The `Engine` that runs install, upgrade and uninstall transactions

#![deny(missing_docs)]

pub mod apply;
pub mod client;
pub mod components;
pub mod config;
pub mod diff;
pub mod engine;
pub mod installer;
pub mod ledger;
pub mod object;

#[cfg(test)]
pub(crate) mod testing;

// Re-export client types
pub use client::{ClusterClient, KubeClusterClient, ListScope};

#[cfg(test)]
pub use client::MockClusterClient;

// Re-export installer types
pub use installer::{ComponentInstaller, InstallContext, Registry};

#[cfg(test)]
pub use installer::MockComponentInstaller;

// Re-export engine and ledger types
pub use apply::{ApplyStats, UninstallReport};
pub use config::{FeatureFlags, ImageNames, ProductConfig};
pub use engine::{
    ComponentAction, ComponentFailure, ComponentOutcome, Engine, TransactionReport,
    UninstallSummary,
};
pub use ledger::{Ledger, LedgerEntry, LEDGER_NAME};
pub use object::{ClusterObject, ObjectKey, ObjectKind};
