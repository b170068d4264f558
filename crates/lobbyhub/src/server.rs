//! `LobbyServer` builder and server loop.
//!
//! This is the entry point for running a lobby hub. It ties together all
//! the layers: transport → handler → lobby registry.

use std::future::Future;
use std::sync::Arc;

use lobbyhub_lobby::{LobbyConfig, Registry};
use lobbyhub_transport::{WebSocketConnection, WebSocketListener};

use crate::config::{DEFAULT_PATH, DEFAULT_PORT, ServerConfig};
use crate::handler::handle_connection;
use crate::HubError;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) registry: Registry<WebSocketConnection>,
    pub(crate) path: String,
}

/// Builder for configuring and starting a lobby hub.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), lobbyhub::HubError> {
/// use lobbyhub::LobbyServer;
///
/// let server = LobbyServer::builder()
///     .bind("0.0.0.0:3000")
///     .path("/ws")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct LobbyServerBuilder {
    bind_addr: String,
    path: String,
    lobby_config: LobbyConfig,
    registry: Option<Registry<WebSocketConnection>>,
}

impl LobbyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            path: DEFAULT_PATH.to_string(),
            lobby_config: LobbyConfig::default(),
            registry: None,
        }
    }

    /// Starts from a [`ServerConfig`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr(),
            path: config.path,
            lobby_config: config.lobby,
            registry: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the request path that accepts upgrades.
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the configuration for lobbies the server creates.
    ///
    /// Ignored if a registry is supplied with [`registry`](Self::registry).
    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.lobby_config = config;
        self
    }

    /// Uses an existing registry instead of creating one.
    pub fn registry(mut self, registry: Registry<WebSocketConnection>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Binds the listener and builds the server.
    pub async fn build(self) -> Result<LobbyServer, HubError> {
        let listener = WebSocketListener::bind(&self.bind_addr).await?;
        let registry = self
            .registry
            .unwrap_or_else(|| Registry::new(self.lobby_config));

        let state = Arc::new(ServerState {
            registry,
            path: self.path,
        });

        Ok(LobbyServer { listener, state })
    }
}

impl Default for LobbyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound lobby hub.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct LobbyServer {
    listener: WebSocketListener,
    state: Arc<ServerState>,
}

impl LobbyServer {
    /// Creates a new builder.
    pub fn builder() -> LobbyServerBuilder {
        LobbyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry holding this server's lobbies.
    pub fn registry(&self) -> &Registry<WebSocketConnection> {
        &self.state.registry
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), HubError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then closes every
    /// lobby.
    ///
    /// Each accepted connection is upgraded and dispatched on its own
    /// task, so a slow handshake never stalls the loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), HubError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            addr = ?self.local_addr().ok(),
            path = %self.state.path,
            "lobby hub running"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, state).await {
                                tracing::debug!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        self.state.registry.shutdown().await;
        Ok(())
    }
}
