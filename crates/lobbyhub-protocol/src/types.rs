//! Core protocol types for the hub's wire format.
//!
//! Every frame on every connection is one JSON object carrying a `type`
//! tag. The hub understands the tag and the `id` field; the `data` field
//! belongs to the application and is carried through untouched.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Number of characters in a lobby identifier.
pub const LOBBY_ID_LEN: usize = 6;

/// Characters a lobby identifier is drawn from.
pub const LOBBY_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of characters in a server-generated player identifier.
pub const PLAYER_ID_LEN: usize = 21;

/// Characters a server-generated player identifier is drawn from. All of
/// them are URL-safe, so the ID can be echoed back in a query string.
pub const PLAYER_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// The short, human-shareable identifier of a lobby, e.g. `"QWERTY"`.
///
/// Serialized as a plain JSON string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LobbyId(String);

impl LobbyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ID has the shape the hub generates: six uppercase
    /// ASCII letters. Lookups do not require it; it is a format check.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == LOBBY_ID_LEN
            && self.0.bytes().all(|b| b.is_ascii_uppercase())
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a player within a lobby. Either chosen by the client (to
/// reclaim a seat after reconnecting) or generated by the server.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Payload: opaque application data
// ---------------------------------------------------------------------------

/// Application data carried in `data` fields.
///
/// Holds the JSON text exactly as it arrived. The hub never parses it
/// into structured values; relaying re-emits the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Wraps a JSON fragment, checking that it is valid JSON.
    pub fn from_json(json: impl Into<String>) -> Result<Self, ProtocolError> {
        RawValue::from_string(json.into())
            .map(Self)
            .map_err(ProtocolError::Decode)
    }

    /// The JSON `null` payload, used when a sender omits `data`.
    pub fn null() -> Self {
        Self(RawValue::NULL.to_owned())
    }

    /// The payload's JSON text.
    pub fn as_json(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_json() == other.as_json()
    }
}

impl Eq for Payload {}

// ---------------------------------------------------------------------------
// Envelope: the top-level wire format
// ---------------------------------------------------------------------------

/// One frame on the wire.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, e.g.
/// `{"type":"playerJoined","id":"alice"}`.
///
/// ```text
/// lobbyInfo           server → owner            once, at lobby creation
/// playerJoined        server → owner, player    on every (re)join
/// registerPlayerInfo  player → server           any time after joining
/// playerInfo          server → owner            relayed registerPlayerInfo
/// ```
///
/// Deserializing goes through a permissive intermediate form: unknown
/// fields are ignored, a missing `data` becomes `null`, and an unknown or
/// missing `type` is an error rather than a panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// Tells the owner which lobby it just created.
    LobbyInfo { id: LobbyId },

    /// A player (re)joined. Sent to the owner and to the player itself,
    /// which is how a player learns a server-generated ID.
    PlayerJoined { id: PlayerId },

    /// A player reporting data it wants the owner to see.
    RegisterPlayerInfo { data: Payload },

    /// A `registerPlayerInfo` re-tagged with the sender's ID.
    PlayerInfo { id: PlayerId, data: Payload },
}

impl Envelope {
    /// The wire name of this envelope's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LobbyInfo { .. } => "lobbyInfo",
            Self::PlayerJoined { .. } => "playerJoined",
            Self::RegisterPlayerInfo { .. } => "registerPlayerInfo",
            Self::PlayerInfo { .. } => "playerInfo",
        }
    }
}

/// Every field any envelope may carry, all optional.
///
/// `id` is kept raw: only the variants that carry an ID need it to be a
/// string, and a stray `id` on `registerPlayerInfo` is ignored like any
/// other unknown field.
#[derive(Deserialize)]
pub(crate) struct WireEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<Box<RawValue>>,
    data: Option<Payload>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let WireEnvelope { kind, id, data } = wire;
        let kind = kind.ok_or(ProtocolError::MissingType)?;
        let data = data.unwrap_or_else(Payload::null);
        let require_id = |kind: &'static str| -> Result<String, ProtocolError> {
            let raw = id
                .as_deref()
                .ok_or(ProtocolError::MissingField { kind, field: "id" })?;
            serde_json::from_str(raw.get()).map_err(ProtocolError::Decode)
        };

        match kind.as_str() {
            "lobbyInfo" => Ok(Self::LobbyInfo {
                id: LobbyId(require_id("lobbyInfo")?),
            }),
            "playerJoined" => Ok(Self::PlayerJoined {
                id: PlayerId(require_id("playerJoined")?),
            }),
            "registerPlayerInfo" => Ok(Self::RegisterPlayerInfo { data }),
            "playerInfo" => Ok(Self::PlayerInfo {
                id: PlayerId(require_id("playerInfo")?),
                data,
            }),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let wire = WireEnvelope::deserialize(deserializer)?;
        Envelope::try_from(wire).map_err(de::Error::custom)
    }
}

// =========================================================================
// Tests
// =========================================================================
