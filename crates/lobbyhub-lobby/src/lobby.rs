//! Lobby actor: an isolated Tokio task that owns one lobby.
//!
//! Each lobby runs in its own task and is reached only through its
//! mailboxes. The actor is the only writer to the owner and player
//! connections, so every state change and every outbound frame of a
//! lobby happens in one well-defined order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lobbyhub_protocol::{Codec, Envelope, LobbyId, PlayerId};
use lobbyhub_transport::{CloseReason, Connection, ConnectionId};
use tokio::sync::{mpsc, oneshot};

use crate::LobbyConfig;
use crate::LobbyError;
use crate::reader::{Departure, Inbound, ReaderLinks, spawn_reader};

/// A player connection handed to the lobby.
pub(crate) struct Registration<C> {
    player_id: PlayerId,
    conn: Arc<C>,
}

/// Requests that don't come from a connection.
pub(crate) enum Control {
    /// Close every player ("Lobby closed"), then the owner with the
    /// given reason, then stop.
    Shutdown(CloseReason),

    /// Report who is currently in the lobby.
    Snapshot(oneshot::Sender<LobbySnapshot>),
}

/// Point-in-time view of a lobby's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    pub lobby_id: LobbyId,
    /// Connection of the lobby owner.
    pub owner: ConnectionId,
    /// The connection currently registered under each player ID.
    pub players: BTreeMap<PlayerId, ConnectionId>,
}

/// Handle to a running lobby actor.
///
/// Cheap to clone; the [`Registry`](crate::Registry) holds one per lobby.
pub struct LobbyHandle<C> {
    lobby_id: LobbyId,
    owner_id: ConnectionId,
    registrations: mpsc::Sender<Registration<C>>,
    control: mpsc::Sender<Control>,
}

impl<C> Clone for LobbyHandle<C> {
    fn clone(&self) -> Self {
        Self {
            lobby_id: self.lobby_id.clone(),
            owner_id: self.owner_id,
            registrations: self.registrations.clone(),
            control: self.control.clone(),
        }
    }
}

impl<C> std::fmt::Debug for LobbyHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyHandle")
            .field("lobby_id", &self.lobby_id)
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> LobbyHandle<C> {
    pub fn lobby_id(&self) -> &LobbyId {
        &self.lobby_id
    }

    /// The owner's connection ID.
    pub fn owner_id(&self) -> ConnectionId {
        self.owner_id
    }

    /// Hands a player connection to the lobby.
    ///
    /// Waits while the registration mailbox is full.
    pub async fn register(
        &self,
        player_id: PlayerId,
        conn: Arc<C>,
    ) -> Result<(), LobbyError> {
        self.registrations
            .send(Registration { player_id, conn })
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))
    }

    /// Tells the lobby to close all its connections and stop.
    pub async fn shutdown(&self, reason: CloseReason) -> Result<(), LobbyError> {
        self.control
            .send(Control::Shutdown(reason))
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))
    }

    /// Asks the lobby who is in it.
    pub async fn snapshot(&self) -> Result<LobbySnapshot, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Control::Snapshot(reply_tx))
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    /// Completes when the actor stops.
    pub async fn closed(&self) {
        self.control.closed().await
    }
}

/// A registered player connection.
struct Player<C> {
    conn: Arc<C>,
    // Dropping this stops the connection's reader task.
    _reader_stop: oneshot::Sender<()>,
}

/// One iteration's worth of work for the actor.
enum Event<C> {
    Register(Registration<C>),
    Depart(Departure),
    Inbound(Inbound),
    Control(Option<Control>),
}

/// The internal lobby state. Runs inside a Tokio task.
struct LobbyActor<C: Connection> {
    lobby_id: LobbyId,
    owner: Arc<C>,
    players: HashMap<PlayerId, Player<C>>,
    codec: Arc<dyn Codec>,
    registrations: mpsc::Receiver<Registration<C>>,
    control: mpsc::Receiver<Control>,
    departures: mpsc::Receiver<Departure>,
    inbound: mpsc::Receiver<Inbound>,
    // Cloned into each reader task.
    departures_tx: mpsc::Sender<Departure>,
    inbound_tx: mpsc::Sender<Inbound>,
}

impl<C: Connection> LobbyActor<C> {
    /// Greets the owner, then processes events until shutdown.
    async fn run(mut self, greeting: Vec<u8>, ready: oneshot::Sender<()>) {
        tracing::info!(lobby_id = %self.lobby_id, owner = %self.owner.id(), "lobby actor started");

        if let Err(e) = self.owner.send(&greeting).await {
            tracing::warn!(lobby_id = %self.lobby_id, error = %e, "failed to send lobby info to owner");
        }
        let _ = ready.send(());

        loop {
            let event = tokio::select! {
                Some(registration) = self.registrations.recv() => Event::Register(registration),
                Some(departure) = self.departures.recv() => Event::Depart(departure),
                Some(inbound) = self.inbound.recv() => Event::Inbound(inbound),
                control = self.control.recv() => Event::Control(control),
            };

            match event {
                Event::Register(registration) => {
                    self.handle_register(registration).await;
                }
                Event::Depart(departure) => self.handle_departure(departure),
                Event::Inbound(inbound) => self.handle_inbound(inbound).await,
                Event::Control(Some(Control::Snapshot(reply))) => {
                    let _ = reply.send(self.snapshot());
                }
                Event::Control(Some(Control::Shutdown(reason))) => {
                    self.close_all(reason).await;
                    break;
                }
                Event::Control(None) => {
                    // Every handle was dropped.
                    self.close_all(CloseReason::lobby_closed()).await;
                    break;
                }
            }
        }

        tracing::info!(lobby_id = %self.lobby_id, "lobby actor stopped");
    }

    async fn handle_register(&mut self, registration: Registration<C>) {
        let Registration { player_id, conn } = registration;
        let conn_id = conn.id();
        let (reader_stop, stop) = oneshot::channel();
        let player = Player {
            conn: Arc::clone(&conn),
            _reader_stop: reader_stop,
        };

        if let Some(previous) = self.players.insert(player_id.clone(), player) {
            tracing::info!(
                lobby_id = %self.lobby_id,
                %player_id,
                old = %previous.conn.id(),
                new = %conn_id,
                "player replaced"
            );
            if let Err(e) = previous.conn.close(CloseReason::replaced()).await {
                tracing::debug!(%player_id, error = %e, "closing replaced connection failed");
            }
        } else {
            tracing::info!(
                lobby_id = %self.lobby_id,
                %player_id,
                conn = %conn_id,
                players = self.players.len(),
                "player joined"
            );
        }

        spawn_reader(
            Arc::clone(&conn),
            ReaderLinks {
                player_id: player_id.clone(),
                inbound: self.inbound_tx.clone(),
                departures: self.departures_tx.clone(),
                stop,
            },
        );

        let joined = match self.codec.encode(&Envelope::PlayerJoined {
            id: player_id.clone(),
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(lobby_id = %self.lobby_id, %player_id, error = %e, "failed to encode playerJoined");
                return;
            }
        };

        if let Err(e) = conn.send(&joined).await {
            tracing::debug!(%player_id, error = %e, "failed to send playerJoined to player");
        }
        if let Err(e) = self.owner.send(&joined).await {
            tracing::warn!(lobby_id = %self.lobby_id, error = %e, "failed to send playerJoined to owner");
        }
    }

    fn handle_departure(&mut self, departure: Departure) {
        let Departure { player_id, conn_id } = departure;
        if !self.is_current(&player_id, conn_id) {
            tracing::debug!(%player_id, conn = %conn_id, "ignoring departure of replaced connection");
            return;
        }
        self.players.remove(&player_id);
        tracing::info!(
            lobby_id = %self.lobby_id,
            %player_id,
            players = self.players.len(),
            "player left"
        );
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        let Inbound {
            player_id,
            conn_id,
            frame,
        } = inbound;
        if !self.is_current(&player_id, conn_id) {
            tracing::debug!(%player_id, conn = %conn_id, "dropping frame from replaced connection");
            return;
        }

        let data = match self.codec.decode(&frame) {
            Ok(Envelope::RegisterPlayerInfo { data }) => data,
            Ok(other) => {
                tracing::debug!(%player_id, kind = other.kind(), "ignoring unexpected message");
                return;
            }
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "dropping undecodable frame");
                return;
            }
        };

        let relayed = match self.codec.encode(&Envelope::PlayerInfo {
            id: player_id.clone(),
            data,
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(lobby_id = %self.lobby_id, %player_id, error = %e, "failed to encode playerInfo");
                return;
            }
        };

        if let Err(e) = self.owner.send(&relayed).await {
            tracing::warn!(lobby_id = %self.lobby_id, error = %e, "failed to relay playerInfo to owner");
        }
    }

    /// Whether `conn_id` is the connection registered under `player_id`.
    fn is_current(&self, player_id: &PlayerId, conn_id: ConnectionId) -> bool {
        self.players
            .get(player_id)
            .is_some_and(|player| player.conn.id() == conn_id)
    }

    async fn close_all(&mut self, owner_reason: CloseReason) {
        tracing::info!(
            lobby_id = %self.lobby_id,
            players = self.players.len(),
            reason = %owner_reason,
            "lobby closing"
        );

        // Registrations that arrived but were never processed still own a
        // live connection.
        while let Ok(Registration { player_id, conn }) = self.registrations.try_recv()
        {
            if let Err(e) = conn.close(CloseReason::lobby_closed()).await {
                tracing::debug!(%player_id, error = %e, "closing queued player connection failed");
            }
        }

        for (player_id, player) in self.players.drain() {
            if let Err(e) = player.conn.close(CloseReason::lobby_closed()).await {
                tracing::debug!(%player_id, error = %e, "closing player connection failed");
            }
        }

        if let Err(e) = self.owner.close(owner_reason).await {
            tracing::debug!(lobby_id = %self.lobby_id, error = %e, "closing owner connection failed");
        }
    }

    fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            lobby_id: self.lobby_id.clone(),
            owner: self.owner.id(),
            players: self
                .players
                .iter()
                .map(|(id, player)| (id.clone(), player.conn.id()))
                .collect(),
        }
    }
}

/// Spawns a lobby actor and returns its handle plus a receiver that
/// fires once `greeting` has been written to the owner.
pub(crate) fn spawn_lobby<C: Connection>(
    lobby_id: LobbyId,
    owner: Arc<C>,
    greeting: Vec<u8>,
    codec: Arc<dyn Codec>,
    config: &LobbyConfig,
) -> (LobbyHandle<C>, oneshot::Receiver<()>) {
    let capacity = config.effective_capacity();
    let (registrations_tx, registrations) = mpsc::channel(capacity);
    let (control_tx, control) = mpsc::channel(capacity);
    let (departures_tx, departures) = mpsc::channel(capacity);
    let (inbound_tx, inbound) = mpsc::channel(capacity);
    let (ready_tx, ready_rx) = oneshot::channel();

    let handle = LobbyHandle {
        lobby_id: lobby_id.clone(),
        owner_id: owner.id(),
        registrations: registrations_tx,
        control: control_tx,
    };

    let actor = LobbyActor {
        lobby_id,
        owner,
        players: HashMap::new(),
        codec,
        registrations,
        control,
        departures,
        inbound,
        departures_tx,
        inbound_tx,
    };
    tokio::spawn(actor.run(greeting, ready_tx));

    (handle, ready_rx)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lobbyhub_protocol::JsonCodec;
    use lobbyhub_transport::memory::{self, MemoryConnection, MemoryPeer, PeerEvent};
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    async fn next_frame(peer: &mut MemoryPeer) -> String {
        match timeout(WAIT, peer.recv()).await.expect("timed out") {
            Some(PeerEvent::Frame(bytes)) => String::from_utf8(bytes).unwrap(),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    async fn start() -> (LobbyHandle<MemoryConnection>, MemoryPeer) {
        let (owner, owner_peer) = memory::pair();
        let (handle, ready) = spawn_lobby(
            LobbyId::new("ABCDEF"),
            Arc::new(owner),
            br#"{"type":"lobbyInfo","id":"ABCDEF"}"#.to_vec(),
            Arc::new(JsonCodec),
            &LobbyConfig::default(),
        );
        timeout(WAIT, ready).await.unwrap().unwrap();
        (handle, owner_peer)
    }

    /// A client that never reads, never writes, and ignores being closed.
    struct SilentConnection {
        id: ConnectionId,
    }

    impl Connection for SilentConnection {
        type Error = lobbyhub_transport::TransportError;

        async fn send(&self, _data: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            std::future::pending().await
        }

        async fn close(&self, _reason: CloseReason) -> Result<(), Self::Error> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }
    }

    #[tokio::test]
    async fn test_greeting_is_first_owner_frame() {
        let (_handle, mut owner) = start().await;
        assert_eq!(
            next_frame(&mut owner).await,
            r#"{"type":"lobbyInfo","id":"ABCDEF"}"#
        );
    }

    #[tokio::test]
    async fn test_snapshot_reflects_registrations() {
        let (handle, _owner) = start().await;
        let (conn, mut peer) = memory::pair();
        let conn_id = conn.id();

        handle
            .register(PlayerId::new("bob"), Arc::new(conn))
            .await
            .unwrap();
        // Mailboxes are not ordered against each other; wait until the
        // registration has been processed.
        let _ = next_frame(&mut peer).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.lobby_id, LobbyId::new("ABCDEF"));
        assert_eq!(snapshot.owner, handle.owner_id());
        assert_eq!(snapshot.players.get(&PlayerId::new("bob")), Some(&conn_id));
    }

    #[tokio::test]
    async fn test_shutdown_closes_owner_with_reason() {
        let (handle, mut owner) = start().await;
        let _ = next_frame(&mut owner).await;

        handle
            .shutdown(CloseReason::owner_disconnected())
            .await
            .unwrap();

        assert_eq!(
            timeout(WAIT, owner.recv()).await.unwrap(),
            Some(PeerEvent::Closed(CloseReason::owner_disconnected()))
        );
        timeout(WAIT, handle.closed()).await.unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.snapshot().await,
            Err(LobbyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_dropping_every_handle_stops_the_lobby() {
        let (handle, mut owner) = start().await;
        let _ = next_frame(&mut owner).await;
        drop(handle);

        assert_eq!(
            timeout(WAIT, owner.recv()).await.unwrap(),
            Some(PeerEvent::Closed(CloseReason::lobby_closed()))
        );
    }

    #[tokio::test]
    async fn test_replaced_connection_is_released_without_close_ack() {
        let silent = || {
            Arc::new(SilentConnection {
                id: ConnectionId::next(),
            })
        };
        let (handle, ready) = spawn_lobby(
            LobbyId::new("ABCDEF"),
            silent(),
            br#"{"type":"lobbyInfo","id":"ABCDEF"}"#.to_vec(),
            Arc::new(JsonCodec),
            &LobbyConfig::default(),
        );
        timeout(WAIT, ready).await.unwrap().unwrap();

        let wait_for_player = |conn_id: ConnectionId| {
            let handle = handle.clone();
            async move {
                let alice = PlayerId::new("alice");
                timeout(WAIT, async {
                    while handle.snapshot().await.unwrap().players.get(&alice)
                        != Some(&conn_id)
                    {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                })
                .await
                .expect("registration not processed");
            }
        };

        let first = silent();
        handle
            .register(PlayerId::new("alice"), Arc::clone(&first))
            .await
            .unwrap();
        wait_for_player(first.id()).await;
        assert!(Arc::strong_count(&first) > 1);

        let second = silent();
        handle
            .register(PlayerId::new("alice"), Arc::clone(&second))
            .await
            .unwrap();
        wait_for_player(second.id()).await;

        // The first client never acknowledged its close; nothing in the
        // lobby may keep it alive.
        timeout(WAIT, async {
            while Arc::strong_count(&first) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("replaced connection still held");
        assert!(Arc::strong_count(&second) > 1);
    }
}
