//! # Lobby Hub
//!
//! Real-time relay hub for multiplayer lobbies.
//!
//! An owner connects without a `lobby` parameter and receives a fresh
//! six-letter lobby ID. Players connect with `?lobby=<ID>` (and optionally
//! `&player=<ID>` to reclaim a seat after reconnecting). Every
//! `registerPlayerInfo` a player sends is relayed to the owner as
//! `playerInfo`, tagged with the player's ID. When the owner goes away
//! the lobby and all of its players are closed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyhub::prelude::*;
//!
//! # async fn run() -> Result<(), HubError> {
//! let config = ServerConfig::from_env()?;
//! let server = LobbyServerBuilder::from_config(config).build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{DEFAULT_PATH, DEFAULT_PORT, ServerConfig};
pub use error::HubError;
pub use server::{LobbyServer, LobbyServerBuilder};

/// The types most users need.
pub mod prelude {
    pub use crate::{HubError, LobbyServer, LobbyServerBuilder, ServerConfig};
    pub use lobbyhub_lobby::{LobbyConfig, LobbyError, Registry};
    pub use lobbyhub_protocol::{Envelope, LobbyId, PlayerId};
    pub use lobbyhub_transport::CloseReason;
}
