//! Lobby hub server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:3000, upgrades on /ws
//! lobbyhub
//!
//! # Different port, verbose logs
//! PORT=8080 RUST_LOG=debug lobbyhub
//! ```

use lobbyhub::{HubError, LobbyServerBuilder, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), HubError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ServerConfig::from_env()?;
    tracing::info!(addr = %config.bind_addr(), path = %config.path, "lobby hub starting");

    let server = LobbyServerBuilder::from_config(config).build().await?;
    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("received Ctrl-C"),
                Err(e) => {
                    // Without a signal handler, run until killed.
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
}
