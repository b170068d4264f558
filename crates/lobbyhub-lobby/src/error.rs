//! Error types for the lobby layer.

use lobbyhub_protocol::{LobbyId, ProtocolError};

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// No active lobby has this ID.
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// The OS random source failed while generating a lobby or player ID.
    #[error("identifier generation failed: {0}")]
    IdGeneration(String),

    /// An envelope could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The lobby's mailbox is closed; its actor has stopped.
    #[error("lobby {0} is unavailable")]
    Unavailable(LobbyId),
}
