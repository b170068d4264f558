//! Unified error type for the lobby hub.

use lobbyhub_lobby::LobbyError;
use lobbyhub_protocol::ProtocolError;
use lobbyhub_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A transport-level error (bind, handshake, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lobby-level error (not found, ID generation).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The server configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use lobbyhub_protocol::LobbyId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Transport(_)));
        assert!(hub_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let hub_err: HubError = ProtocolError::MissingType.into();
        assert!(matches!(hub_err, HubError::Protocol(_)));
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::NotFound(LobbyId::new("ABCDEF"));
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Lobby(_)));
        assert_eq!(hub_err.to_string(), "lobby ABCDEF not found");
    }

    #[test]
    fn test_config_error_display() {
        let err = HubError::Config("PORT must be a number".into());
        assert_eq!(err.to_string(), "invalid configuration: PORT must be a number");
    }
}
