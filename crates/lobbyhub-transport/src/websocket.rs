//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Accepting is split in two steps so the accept loop never waits on a
//! slow client: [`WebSocketListener::accept`] hands back the raw TCP
//! stream, and [`WebSocketConnection::upgrade`] runs the HTTP handshake
//! (usually on a spawned task), letting the caller inspect the request
//! path and query and reject it before the upgrade completes.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::{CloseReason, Connection, ConnectionId, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Listens for incoming TCP connections destined for a WebSocket upgrade.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// Returns the address the listener is actually bound to (useful when
    /// binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection. The handshake has not happened
    /// yet; pass the stream to [`WebSocketConnection::upgrade`].
    pub async fn accept(
        &self,
    ) -> Result<(TcpStream, SocketAddr), TransportError> {
        self.listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)
    }
}

/// The parts of an HTTP upgrade request the hub routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    path: String,
    query: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Builds a request view from the URI's path and query string.
    pub fn from_uri(uri: &Uri) -> Self {
        Self::new(uri.path(), uri.query())
    }

    /// `query` is the raw, still percent-encoded query string; pairs are
    /// decoded as `application/x-www-form-urlencoded`.
    pub fn new(path: &str, query: Option<&str>) -> Self {
        let query = form_urlencoded::parse(query.unwrap_or("").as_bytes())
            .into_owned()
            .collect();
        Self {
            path: path.to_string(),
            query,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the first value for `name`. Empty values count as absent.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

/// An HTTP response refusing the upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub body: String,
}

impl Rejection {
    pub fn not_found(body: impl Into<String>) -> Self {
        Self {
            status: 404,
            body: body.into(),
        }
    }

    fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.body));
        *response.status_mut() = StatusCode::from_u16(self.status)
            .unwrap_or(StatusCode::BAD_REQUEST);
        response
    }
}

/// A single WebSocket connection.
///
/// The socket is split into its write half and read half, each behind
/// its own lock, so a reader blocked in [`recv`](Connection::recv) never
/// holds up writes from another task.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    /// Performs the WebSocket handshake on an accepted TCP stream.
    ///
    /// `inspect` sees the request path and query before the upgrade is
    /// answered; returning a [`Rejection`] sends that HTTP response instead
    /// of upgrading, and this function returns
    /// [`TransportError::HandshakeFailed`].
    pub async fn upgrade<F>(
        stream: TcpStream,
        peer: SocketAddr,
        inspect: F,
    ) -> Result<Self, TransportError>
    where
        F: FnOnce(&UpgradeRequest) -> Result<(), Rejection> + Send + Unpin,
    {
        let callback = move |req: &Request,
                             resp: Response|
              -> Result<Response, ErrorResponse> {
            let request = UpgradeRequest::from_uri(req.uri());
            match inspect(&request) {
                Ok(()) => Ok(resp),
                Err(rejection) => {
                    tracing::debug!(
                        %peer,
                        path = request.path(),
                        status = rejection.status,
                        "upgrade rejected"
                    );
                    Err(rejection.into_response())
                }
            }
        };

        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        let id = ConnectionId::next();
        tracing::debug!(%id, %peer, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(Self {
            id,
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    /// The remote address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Envelopes are JSON, so they normally go out as text frames.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self, reason: CloseReason) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: reason.code.as_u16().into(),
            reason: reason.reason.into(),
        };
        self.sink
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_request_parses_query_params() {
        let req = UpgradeRequest::new("/ws", Some("lobby=ABCDEF&player=alice"));
        assert_eq!(req.path(), "/ws");
        assert_eq!(req.query_param("lobby"), Some("ABCDEF"));
        assert_eq!(req.query_param("player"), Some("alice"));
    }

    #[test]
    fn test_upgrade_request_empty_value_is_absent() {
        let req = UpgradeRequest::new("/ws", Some("lobby=&player"));
        assert_eq!(req.query_param("lobby"), None);
        assert_eq!(req.query_param("player"), None);
    }

    #[test]
    fn test_upgrade_request_without_query() {
        let req = UpgradeRequest::new("/ws", None);
        assert_eq!(req.query_param("lobby"), None);
    }

    #[test]
    fn test_upgrade_request_decodes_query_values() {
        let req = UpgradeRequest::new(
            "/ws",
            Some("lobby=ABCDEF&player=J%C3%BCrgen+M"),
        );
        assert_eq!(req.query_param("lobby"), Some("ABCDEF"));
        assert_eq!(req.query_param("player"), Some("J\u{fc}rgen M"));
    }

    #[test]
    fn test_upgrade_request_decodes_reserved_characters() {
        let req = UpgradeRequest::new("/ws", Some("player=a%26b%3Dc%2Bd"));
        assert_eq!(req.query_param("player"), Some("a&b=c+d"));
    }

    #[test]
    fn test_upgrade_request_first_value_wins() {
        let req = UpgradeRequest::new("/", Some("lobby=AAAAAA&lobby=BBBBBB"));
        assert_eq!(req.query_param("lobby"), Some("AAAAAA"));
    }

    #[test]
    fn test_rejection_response_carries_status_and_body() {
        let response = Rejection::not_found("Lobby not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_deref(), Some("Lobby not found"));
    }
}
