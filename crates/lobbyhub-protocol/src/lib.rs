//! Wire protocol for the lobby hub.
//!
//! This crate defines the "language" that owners, players, and the hub
//! speak:
//!
//! - **Types** ([`Envelope`], [`LobbyId`], [`PlayerId`], [`Payload`]):
//!   the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are
//!   converted to/from frame bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and lobbies
//! (who receives what). It doesn't know about connections or lobbies.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Lobby (routing)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Envelope, LobbyId, Payload, PlayerId, LOBBY_ID_ALPHABET, LOBBY_ID_LEN,
    PLAYER_ID_ALPHABET, PLAYER_ID_LEN,
};
