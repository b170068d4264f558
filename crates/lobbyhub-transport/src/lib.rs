//! Transport abstraction layer for the lobby hub.
//!
//! Provides the [`Connection`] trait that lobbies talk to, plus the
//! concrete transports that implement it.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `memory`: in-process connection pairs, used to drive lobbies in tests

mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    Rejection, UpgradeRequest, WebSocketConnection, WebSocketListener,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating process-unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next unused ID in this process.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Status code sent with a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: the connection served its purpose.
    Normal,
    /// 1008: the peer asked for something it is not allowed to have.
    PolicyViolation,
    /// 1011: the server hit an unexpected condition.
    InternalError,
}

impl CloseCode {
    /// The numeric code as it appears on the wire.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::PolicyViolation => 1008,
            Self::InternalError => 1011,
        }
    }
}

/// Why a connection is being closed: a status code plus a short
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The lobby this connection belonged to has been torn down.
    pub fn lobby_closed() -> Self {
        Self::new(CloseCode::Normal, "Lobby closed")
    }

    /// The lobby owner went away, taking the lobby with it.
    pub fn owner_disconnected() -> Self {
        Self::new(CloseCode::Normal, "Owner disconnected")
    }

    /// A newer connection registered under the same player ID.
    pub fn replaced() -> Self {
        Self::new(CloseCode::Normal, "replaced")
    }

    /// The requested lobby does not exist.
    pub fn lobby_not_found() -> Self {
        Self::new(CloseCode::PolicyViolation, "Lobby not found")
    }

    pub fn internal_error() -> Self {
        Self::new(CloseCode::InternalError, "Internal error")
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.code.as_u16())
    }
}

/// A single message-framed, full-duplex connection.
///
/// Implementations must tolerate one task receiving while another task
/// sends or closes: lobbies read each connection from a dedicated reader
/// task and write to it from the lobby's event loop.
///
/// The methods return `Send` futures so generic code can drive them from
/// `tokio::spawn`ed tasks.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection, telling the peer why.
    fn close(
        &self,
        reason: CloseReason,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_close_codes_match_websocket_numbers() {
        assert_eq!(CloseCode::Normal.as_u16(), 1000);
        assert_eq!(CloseCode::PolicyViolation.as_u16(), 1008);
        assert_eq!(CloseCode::InternalError.as_u16(), 1011);
    }

    #[test]
    fn test_lobby_not_found_is_policy_violation() {
        let reason = CloseReason::lobby_not_found();
        assert_eq!(reason.code, CloseCode::PolicyViolation);
        assert_eq!(reason.to_string(), "Lobby not found (1008)");
    }

    #[test]
    fn test_lifecycle_reasons_are_normal_closures() {
        for reason in [
            CloseReason::lobby_closed(),
            CloseReason::owner_disconnected(),
            CloseReason::replaced(),
        ] {
            assert_eq!(reason.code, CloseCode::Normal, "{reason}");
        }
    }
}
