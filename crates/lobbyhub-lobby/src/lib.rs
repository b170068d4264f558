//! Lobby lifecycle management for the lobby hub.
//!
//! Each lobby runs as an isolated Tokio task (actor model) that owns the
//! owner connection, the player map, and the lobby's mailboxes.
//!
//! # Key types
//!
//! - [`Registry`]: creates/deletes lobbies, routes players to them
//! - [`LobbyHandle`]: send commands to a running lobby actor
//! - [`LobbyConfig`]: mailbox sizing
//! - [`IdGenerator`]: where lobby and player IDs come from

mod config;
mod error;
mod ids;
mod lobby;
mod reader;
mod registry;

pub use config::{DEFAULT_MAILBOX_CAPACITY, LobbyConfig};
pub use error::LobbyError;
pub use ids::{IdGenerator, RandomIds};
pub use lobby::{LobbyHandle, LobbySnapshot};
pub use registry::Registry;
