//! Codec trait and its JSON implementation.
//!
//! A codec converts between [`Envelope`]s and raw frame bytes. Lobbies
//! only talk to the [`Codec`] trait, so the wire encoding is swappable
//! without touching the relay logic.

use crate::types::WireEnvelope;
use crate::{Envelope, ProtocolError};

/// Encodes envelopes to frame bytes and decodes frames back.
///
/// `Send + Sync + 'static` because a codec lives inside long-running
/// lobby tasks that Tokio may move between threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes an envelope into one frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one frame into an envelope.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] for malformed JSON
    /// - [`ProtocolError::MissingType`] / [`ProtocolError::UnknownType`]
    ///   when the `type` tag is absent or unrecognized
    /// - [`ProtocolError::MissingField`] when a required `id` is absent
    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks the browser clients' JSON dialect.
///
/// ## Example
///
/// ```rust
/// use lobbyhub_protocol::{Codec, Envelope, JsonCodec, LobbyId};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::LobbyInfo { id: LobbyId::new("ABCDEF") };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// assert_eq!(bytes, br#"{"type":"lobbyInfo","id":"ABCDEF"}"#);
///
/// let decoded = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(envelope).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        // Parse into the all-optional wire form first so tag and field
        // problems come back as typed errors rather than serde messages.
        let wire: WireEnvelope =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        Envelope::try_from(wire)
    }
}
