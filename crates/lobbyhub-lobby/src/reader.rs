//! Per-player reader tasks.
//!
//! The lobby actor only writes to connections. Each registered player
//! gets a reader task that pulls frames off its connection and forwards
//! them into the actor's inbound mailbox. The actor keeps the sending
//! half of a per-reader stop signal and drops it when the connection is
//! replaced, so a client that never answers the close cannot keep its
//! reader alive.

use std::sync::Arc;

use lobbyhub_protocol::PlayerId;
use lobbyhub_transport::{Connection, ConnectionId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A frame read from a player's connection.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub player_id: PlayerId,
    pub conn_id: ConnectionId,
    pub frame: Vec<u8>,
}

/// A player's connection closed or failed.
#[derive(Debug)]
pub(crate) struct Departure {
    pub player_id: PlayerId,
    pub conn_id: ConnectionId,
}

/// The mailboxes a reader feeds.
pub(crate) struct ReaderLinks {
    pub player_id: PlayerId,
    pub inbound: mpsc::Sender<Inbound>,
    pub departures: mpsc::Sender<Departure>,
    /// Resolves once the actor no longer wants this connection read.
    pub stop: oneshot::Receiver<()>,
}

pub(crate) fn spawn_reader<C: Connection>(
    conn: Arc<C>,
    links: ReaderLinks,
) -> JoinHandle<()> {
    tokio::spawn(read_loop(conn, links))
}

async fn read_loop<C: Connection>(conn: Arc<C>, links: ReaderLinks) {
    let conn_id = conn.id();
    let player_id = links.player_id;
    let mut stop = links.stop;

    loop {
        let received = tokio::select! {
            result = conn.recv() => result,
            _ = &mut stop => {
                tracing::debug!(%player_id, %conn_id, "connection dropped by lobby, reader stopping");
                return;
            }
            // The actor dropped its receivers: the lobby is gone.
            () = links.inbound.closed() => {
                tracing::debug!(%player_id, %conn_id, "lobby gone, reader stopping");
                return;
            }
        };

        match received {
            Ok(Some(frame)) => {
                let inbound = Inbound {
                    player_id: player_id.clone(),
                    conn_id,
                    frame,
                };
                // Waits while the mailbox is full, which stops us reading
                // the socket until the actor drains it.
                if links.inbound.send(inbound).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!(%player_id, %conn_id, "player connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%player_id, %conn_id, error = %e, "player read failed");
                break;
            }
        }
    }

    let _ = links
        .departures
        .send(Departure { player_id, conn_id })
        .await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lobbyhub_transport::memory;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn links(
        capacity: usize,
    ) -> (
        ReaderLinks,
        mpsc::Receiver<Inbound>,
        mpsc::Receiver<Departure>,
        oneshot::Sender<()>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (departures_tx, departures_rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let links = ReaderLinks {
            player_id: PlayerId::new("alice"),
            inbound: inbound_tx,
            departures: departures_tx,
            stop: stop_rx,
        };
        (links, inbound_rx, departures_rx, stop_tx)
    }

    #[tokio::test]
    async fn test_reader_forwards_frames_then_reports_departure() {
        let (conn, mut peer) = memory::pair();
        let conn_id = conn.id();
        let (links, mut inbound, mut departures, _stop) = links(8);
        let task = spawn_reader(Arc::new(conn), links);

        assert!(peer.send(b"one".to_vec()));
        assert!(peer.send(b"two".to_vec()));

        let first = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
        assert_eq!(first.frame, b"one");
        assert_eq!(first.conn_id, conn_id);
        assert_eq!(first.player_id, PlayerId::new("alice"));
        let second = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
        assert_eq!(second.frame, b"two");

        peer.disconnect();
        let departure =
            timeout(WAIT, departures.recv()).await.unwrap().unwrap();
        assert_eq!(departure.conn_id, conn_id);
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reader_stops_when_lobby_is_gone() {
        let (conn, _peer) = memory::pair();
        let (links, inbound, departures, _stop) = links(8);
        let task = spawn_reader(Arc::new(conn), links);

        drop(inbound);
        drop(departures);

        // The peer never speaks; the reader must still exit.
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reader_stops_when_dropped_by_lobby() {
        let (conn, _peer) = memory::pair();
        let conn = Arc::new(conn);
        let (links, _inbound, mut departures, stop) = links(8);
        let task = spawn_reader(Arc::clone(&conn), links);

        // The lobby is still running and the peer stays silent.
        drop(stop);

        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(Arc::strong_count(&conn), 1);
        assert!(departures.try_recv().is_err());
    }
}
