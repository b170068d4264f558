//! Lobby and player identifier generation.
//!
//! Identifiers come from the OS random source. Each character is picked
//! by rejection sampling so every letter of the alphabet is equally
//! likely, even when the alphabet size is not a power of two.

use lobbyhub_protocol::{
    LOBBY_ID_ALPHABET, LOBBY_ID_LEN, LobbyId, PLAYER_ID_ALPHABET,
    PLAYER_ID_LEN, PlayerId,
};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::LobbyError;

/// Source of fresh identifiers.
///
/// The registry checks lobby IDs against the active set and asks again
/// on collision, so implementations only need to be random, not unique.
pub trait IdGenerator: Send + Sync + 'static {
    /// A new lobby ID: six uppercase letters.
    fn lobby_id(&self) -> Result<LobbyId, LobbyError>;

    /// A new player ID: 21 URL-safe characters.
    fn player_id(&self) -> Result<PlayerId, LobbyError>;
}

/// The default [`IdGenerator`], backed by [`OsRng`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn lobby_id(&self) -> Result<LobbyId, LobbyError> {
        random_string(LOBBY_ID_ALPHABET, LOBBY_ID_LEN).map(LobbyId::new)
    }

    fn player_id(&self) -> Result<PlayerId, LobbyError> {
        random_string(PLAYER_ID_ALPHABET, PLAYER_ID_LEN).map(PlayerId::new)
    }
}

fn random_string(alphabet: &[u8], len: usize) -> Result<String, LobbyError> {
    let mut rng = OsRng;
    sample(alphabet, len, |buf| {
        rng.try_fill_bytes(buf)
            .map_err(|e| LobbyError::IdGeneration(e.to_string()))
    })
}

/// Draws `len` characters from `alphabet`, pulling random bytes from
/// `fill` in batches.
///
/// Bytes are masked down to the smallest power of two covering the
/// alphabet; masked values past the end of the alphabet are discarded.
fn sample<F>(alphabet: &[u8], len: usize, mut fill: F) -> Result<String, LobbyError>
where
    F: FnMut(&mut [u8]) -> Result<(), LobbyError>,
{
    debug_assert!(!alphabet.is_empty() && alphabet.len() <= 256);
    let mask = alphabet.len().next_power_of_two() - 1;

    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        fill(&mut buf)?;
        for byte in buf {
            let index = usize::from(byte) & mask;
            if let Some(&c) = alphabet.get(index) {
                out.push(char::from(c));
                if out.len() == len {
                    break;
                }
            }
        }
    }
    Ok(out)
}
