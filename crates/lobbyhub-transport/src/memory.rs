//! In-process connections.
//!
//! [`pair`] returns a [`MemoryConnection`] (the server side, which
//! implements [`Connection`]) and a [`MemoryPeer`] (the client side, which
//! a test drives by hand). Frames travel over unbounded channels; closing
//! either side is observable from the other.

use tokio::sync::{mpsc, watch, Mutex};

use crate::{CloseReason, Connection, ConnectionId, TransportError};

/// What the peer sees arriving from the server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A data frame.
    Frame(Vec<u8>),
    /// The server closed the connection.
    Closed(CloseReason),
}

/// Creates a connected server/peer pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(false);

    let conn = MemoryConnection {
        id: ConnectionId::next(),
        inbound: Mutex::new(from_peer),
        outbound: to_peer,
        closed_tx,
        closed_rx,
    };
    let peer = MemoryPeer {
        outgoing: Some(to_server),
        incoming: from_server,
    };
    (conn, peer)
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<PeerEvent>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl MemoryConnection {
    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(
                "closed locally".into(),
            ));
        }
        self.outbound
            .send(PeerEvent::Frame(data.to_vec()))
            .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut closed = self.closed_rx.clone();
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => Ok(frame),
            _ = closed.wait_for(|closed| *closed) => Ok(None),
        }
    }

    async fn close(&self, reason: CloseReason) -> Result<(), Self::Error> {
        if self.closed_tx.send_replace(true) {
            return Err(TransportError::ConnectionClosed(
                "already closed".into(),
            ));
        }
        // The peer may already be gone; closing is still complete locally.
        let _ = self.outbound.send(PeerEvent::Closed(reason));
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    incoming: mpsc::UnboundedReceiver<PeerEvent>,
}

impl MemoryPeer {
    /// Sends a frame to the server side. Returns `false` if the server
    /// side has been dropped or this peer already disconnected.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        self.outgoing
            .as_ref()
            .is_some_and(|tx| tx.send(data.into()).is_ok())
    }

    /// Waits for the next event from the server side. `None` once the
    /// server side has been dropped and everything was drained.
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.incoming.recv().await
    }

    /// Returns an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.incoming.try_recv().ok()
    }

    /// Simulates the client going away: the server side's `recv`
    /// returns `Ok(None)`.
    pub fn disconnect(&mut self) {
        self.outgoing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (conn, mut peer) = pair();

        conn.send(b"hello peer").await.expect("send");
        assert_eq!(
            peer.recv().await,
            Some(PeerEvent::Frame(b"hello peer".to_vec()))
        );

        assert!(peer.send(b"hello server".to_vec()));
        let frame = conn.recv().await.expect("recv");
        assert_eq!(frame, Some(b"hello server".to_vec()));
    }

    #[tokio::test]
    async fn test_peer_disconnect_ends_recv() {
        let (conn, mut peer) = pair();
        peer.disconnect();
        assert_eq!(conn.recv().await.expect("recv"), None);
    }

    #[tokio::test]
    async fn test_close_notifies_peer_and_wakes_reader() {
        let (conn, mut peer) = pair();
        let conn = std::sync::Arc::new(conn);

        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::task::yield_now().await;

        conn.close(CloseReason::replaced()).await.expect("close");

        let result = reader.await.expect("reader task");
        assert_eq!(result.expect("recv"), None);
        assert_eq!(
            peer.recv().await,
            Some(PeerEvent::Closed(CloseReason::replaced()))
        );
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, _peer) = pair();
        conn.close(CloseReason::lobby_closed()).await.expect("close");
        assert!(conn.send(b"late").await.is_err());
        assert!(conn.close(CloseReason::lobby_closed()).await.is_err());
    }
}
