//! Lobby registry: creates, tracks, and routes players to lobbies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lobbyhub_protocol::{Codec, Envelope, JsonCodec, LobbyId, PlayerId};
use lobbyhub_transport::{CloseReason, Connection, ConnectionId};

use crate::ids::{IdGenerator, RandomIds};
use crate::lobby::spawn_lobby;
use crate::{LobbyConfig, LobbyError, LobbyHandle};

/// All active lobbies, keyed by ID.
///
/// This is the entry point for lobby operations from the server. It is a
/// cheap, cloneable handle over shared state: clone it into every
/// connection task rather than wrapping it in another lock.
///
/// The map sits behind a synchronous mutex that is never held across an
/// `.await`, so [`get_lobby`](Self::get_lobby) can be called from
/// non-async contexts such as an HTTP upgrade callback.
pub struct Registry<C> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    lobbies: Mutex<HashMap<LobbyId, LobbyHandle<C>>>,
    ids: Arc<dyn IdGenerator>,
    codec: Arc<dyn Codec>,
    config: LobbyConfig,
}

impl<C> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> Registry<C> {
    /// Creates an empty registry with random IDs and the JSON codec.
    pub fn new(config: LobbyConfig) -> Self {
        Self::with_parts(config, Arc::new(RandomIds), Arc::new(JsonCodec))
    }

    /// Creates an empty registry with a custom ID source and codec.
    pub fn with_parts(
        config: LobbyConfig,
        ids: Arc<dyn IdGenerator>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lobbies: Mutex::new(HashMap::new()),
                ids,
                codec,
                config,
            }),
        }
    }

    fn lobbies(&self) -> MutexGuard<'_, HashMap<LobbyId, LobbyHandle<C>>> {
        // Nothing panics while holding the lock, and the map stays valid
        // either way.
        self.inner
            .lobbies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a lobby owned by `owner` and returns its ID.
    ///
    /// By the time this returns, `lobbyInfo` has been written to the
    /// owner. A watcher task then reads the owner connection: owner
    /// frames are discarded, and when the owner goes away the lobby is
    /// deleted with reason "Owner disconnected".
    pub async fn create_lobby(&self, owner: Arc<C>) -> Result<LobbyId, LobbyError> {
        let owner_id = owner.id();

        let (lobby_id, handle, ready) = {
            let mut lobbies = self.lobbies();
            let lobby_id = loop {
                let candidate = self.inner.ids.lobby_id()?;
                if !lobbies.contains_key(&candidate) {
                    break candidate;
                }
                tracing::debug!(lobby_id = %candidate, "lobby id collision, retrying");
            };

            let greeting = self.inner.codec.encode(&Envelope::LobbyInfo {
                id: lobby_id.clone(),
            })?;
            let (handle, ready) = spawn_lobby(
                lobby_id.clone(),
                Arc::clone(&owner),
                greeting,
                Arc::clone(&self.inner.codec),
                &self.inner.config,
            );
            lobbies.insert(lobby_id.clone(), handle.clone());
            (lobby_id, handle, ready)
        };

        let _ = ready.await;
        self.watch_owner(handle, owner);

        tracing::info!(%lobby_id, owner = %owner_id, "lobby created");
        Ok(lobby_id)
    }

    /// Adds a player connection to an existing lobby.
    ///
    /// Without a `player_id` a fresh one is generated. Joining with an ID
    /// that is already in the lobby replaces the old connection.
    ///
    /// # Errors
    /// [`LobbyError::NotFound`] if the lobby does not exist, including
    /// when it is deleted while the connection is being handed over.
    pub async fn join_lobby(
        &self,
        lobby_id: &LobbyId,
        conn: Arc<C>,
        player_id: Option<PlayerId>,
    ) -> Result<(LobbyHandle<C>, PlayerId), LobbyError> {
        let handle = self
            .get_lobby(lobby_id)
            .ok_or_else(|| LobbyError::NotFound(lobby_id.clone()))?;

        let player_id = match player_id {
            Some(id) => id,
            None => self.inner.ids.player_id()?,
        };

        // The lock is released here; a slow lobby only delays joins to
        // itself.
        handle
            .register(player_id.clone(), conn)
            .await
            .map_err(|_| LobbyError::NotFound(lobby_id.clone()))?;

        Ok((handle, player_id))
    }

    /// Looks up a lobby without touching it.
    pub fn get_lobby(&self, lobby_id: &LobbyId) -> Option<LobbyHandle<C>> {
        self.lobbies().get(lobby_id).cloned()
    }

    /// Removes a lobby and closes all of its connections with
    /// "Lobby closed".
    ///
    /// # Errors
    /// [`LobbyError::NotFound`] if no such lobby exists.
    pub async fn delete_lobby(&self, lobby_id: &LobbyId) -> Result<(), LobbyError> {
        let handle = self
            .lobbies()
            .remove(lobby_id)
            .ok_or_else(|| LobbyError::NotFound(lobby_id.clone()))?;

        Self::stop(handle, CloseReason::lobby_closed()).await;
        tracing::info!(%lobby_id, "lobby deleted");
        Ok(())
    }

    /// Returns the number of active lobbies.
    pub fn lobby_count(&self) -> usize {
        self.lobbies().len()
    }

    /// Lists all active lobby IDs, sorted.
    pub fn lobby_ids(&self) -> Vec<LobbyId> {
        let mut ids: Vec<LobbyId> = self.lobbies().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Deletes every lobby.
    pub async fn shutdown(&self) {
        let handles: Vec<LobbyHandle<C>> =
            self.lobbies().drain().map(|(_, handle)| handle).collect();
        tracing::info!(lobbies = handles.len(), "closing all lobbies");
        for handle in handles {
            Self::stop(handle, CloseReason::lobby_closed()).await;
        }
    }

    /// Removes `lobby_id` only if it is still the lobby owned by
    /// `owner_id`. IDs get reused, and a late watcher must not take down
    /// a newer lobby.
    async fn remove_owned(
        &self,
        lobby_id: &LobbyId,
        owner_id: ConnectionId,
        reason: CloseReason,
    ) {
        let handle = {
            let mut lobbies = self.lobbies();
            let owned = lobbies
                .get(lobby_id)
                .is_some_and(|handle| handle.owner_id() == owner_id);
            if owned { lobbies.remove(lobby_id) } else { None }
        };

        if let Some(handle) = handle {
            tracing::info!(%lobby_id, owner = %owner_id, "owner gone, closing lobby");
            Self::stop(handle, reason).await;
        }
    }

    async fn stop(handle: LobbyHandle<C>, reason: CloseReason) {
        if let Err(e) = handle.shutdown(reason).await {
            tracing::debug!(lobby_id = %handle.lobby_id(), error = %e, "lobby already stopped");
        }
    }

    /// Spawns the single reader of the owner connection.
    fn watch_owner(&self, handle: LobbyHandle<C>, owner: Arc<C>) {
        let registry = self.clone();
        tokio::spawn(async move {
            let lobby_id = handle.lobby_id().clone();
            let owner_id = owner.id();
            loop {
                let received = tokio::select! {
                    result = owner.recv() => result,
                    // Deleted some other way; the actor already closed
                    // the owner.
                    () = handle.closed() => return,
                };
                match received {
                    Ok(Some(_)) => {
                        tracing::trace!(%lobby_id, "discarding owner frame");
                    }
                    Ok(None) => {
                        tracing::debug!(%lobby_id, "owner connection closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%lobby_id, error = %e, "owner read failed");
                        break;
                    }
                }
            }
            registry
                .remove_owned(&lobby_id, owner_id, CloseReason::owner_disconnected())
                .await;
        });
    }
}

impl<C: Connection> Default for Registry<C> {
    fn default() -> Self {
        Self::new(LobbyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use lobbyhub_transport::memory::{self, MemoryConnection};

    use super::*;

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry: Registry<MemoryConnection> = Registry::default();
        assert_eq!(registry.lobby_count(), 0);
        assert!(registry.lobby_ids().is_empty());
        assert!(registry.get_lobby(&LobbyId::new("ABCDEF")).is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_lobby_is_not_found() {
        let registry: Registry<MemoryConnection> = Registry::default();
        let err = registry
            .delete_lobby(&LobbyId::new("ZZZZZZ"))
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_clones_share_lobbies() {
        let registry = Registry::default();
        let other = registry.clone();
        let (owner, _peer) = memory::pair();

        let lobby_id = registry.create_lobby(Arc::new(owner)).await.unwrap();

        assert!(other.get_lobby(&lobby_id).is_some());
        assert_eq!(other.lobby_ids(), vec![lobby_id]);
    }

    #[tokio::test]
    async fn test_shutdown_empties_registry() {
        let registry = Registry::default();
        let mut peers = Vec::new();
        for _ in 0..3 {
            let (owner, peer) = memory::pair();
            registry.create_lobby(Arc::new(owner)).await.unwrap();
            peers.push(peer);
        }
        assert_eq!(registry.lobby_count(), 3);

        registry.shutdown().await;
        assert_eq!(registry.lobby_count(), 0);
    }
}
