//! CLI commands

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use spyglass_install::{ClusterClient, KubeClusterClient};

use crate::Result;

pub mod install;
pub mod status;
pub mod uninstall;

/// Connect to the cluster named by the resolved kubeconfig
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Arc<dyn ClusterClient>> {
    let client = KubeClusterClient::connect(kubeconfig).await?;
    Ok(Arc::new(client))
}

/// A token cancelled on the first Ctrl-C
///
/// The running transaction stops at the next object boundary.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current object");
            child.cancel();
        }
    });
    token
}
