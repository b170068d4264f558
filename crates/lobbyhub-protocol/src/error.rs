//! Error types for the protocol layer.
//!
//! Each crate in the hub defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning frames into envelopes (or
//! back), not in networking or lobby management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning an envelope into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not valid JSON, or a field has the wrong JSON type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame is a JSON object without a `type` field.
    #[error("message has no type tag")]
    MissingType,

    /// The `type` field names none of the recognized envelopes.
    #[error("unknown message type {0:?}")]
    UnknownType(String),

    /// A recognized envelope is missing a field it requires.
    #[error("{kind} message is missing required field {field:?}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}
