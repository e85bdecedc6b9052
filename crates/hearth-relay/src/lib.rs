//! Hearth chat relay server.
//!
//! A WebSocket relay that admits chat messages through the `hearth-core`
//! pipeline, fans them out to every connection and keeps a JSON history.

pub mod blocklist;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod storage;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use hearth_core::Hub;

use config::RelayConfig;
use error::RelayError;
use relay::RelayState;
use storage::{CredentialStore, HistoryLog};

/// Load persisted state and build the hub.
pub async fn build_state(config: &RelayConfig) -> Result<Arc<RelayState>, RelayError> {
    let credentials = CredentialStore::new(&config.credential_path);
    let credential = credentials
        .bootstrap(config.admin_password.as_deref())
        .await?;
    let history = HistoryLog::load(&config.history_path).await;
    let hub = Hub::new(config.hub.clone(), credential);
    Ok(RelayState::new(hub, history, credentials, config.idle_sweep))
}

/// Fetch the blocklist in the background and serve until shutdown.
pub async fn run(
    listener: TcpListener,
    state: Arc<RelayState>,
    config: &RelayConfig,
) -> Result<(), RelayError> {
    if !config.blocklist_urls.is_empty() {
        let state = state.clone();
        let urls = config.blocklist_urls.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let filter = blocklist::load(&client, &urls).await;
            state.set_filter(filter).await;
        });
    } else {
        info!("No blocklist sources configured; content filter disabled");
    }
    relay::serve(listener, state, &config.static_dir).await
}
