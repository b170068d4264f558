//! Lobby configuration.

use serde::{Deserialize, Serialize};

/// Default capacity of each lobby mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Settings applied to every lobby a [`Registry`](crate::Registry) spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Capacity of each of a lobby's mailboxes (registrations, departures,
    /// inbound frames, control).
    ///
    /// A full inbound mailbox makes the player's reader stop reading its
    /// socket until the actor catches up, so this bounds per-lobby memory
    /// at roughly `mailbox_capacity` frames per mailbox.
    pub mailbox_capacity: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl LobbyConfig {
    /// The capacity actually used for channels. Tokio panics on a zero
    /// capacity, so zero is raised to one.
    pub(crate) fn effective_capacity(&self) -> usize {
        self.mailbox_capacity.max(1)
    }
}
