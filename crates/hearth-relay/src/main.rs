//! Hearth relay server binary.

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_relay::config::{Args, RelayConfig};
use hearth_relay::error::RelayError;

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from(Args::parse());
    config.validate().map_err(RelayError::Config)?;
    info!("Hearth relay {}", env!("BUILD_VERSION"));

    let state = hearth_relay::build_state(&config).await?;

    let listener = TcpListener::bind(config.listen).await?;
    let addr = listener.local_addr()?;
    info!("Hearth relay listening on {addr}");
    info!("Web client: http://{addr}");
    info!("WebSocket:  ws://{addr}/ws");

    tokio::spawn({
        let state = state.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                state.request_shutdown();
            }
        }
    });

    hearth_relay::run(listener, state, &config).await
}
