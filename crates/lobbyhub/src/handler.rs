//! Per-connection handler: upgrade inspection and create/join dispatch.
//!
//! Each accepted TCP stream gets its own Tokio task running this handler.
//! The flow is:
//!   1. Inspect the upgrade request → reject wrong paths and unknown
//!      lobbies with a 404 before upgrading
//!   2. Upgrade to a WebSocket
//!   3. No `lobby` parameter → create a lobby owned by this connection;
//!      otherwise join the named lobby
//!
//! After step 3 the connection belongs to the lobby; this task ends.

use std::net::SocketAddr;
use std::sync::Arc;

use lobbyhub_lobby::{LobbyError, Registry};
use lobbyhub_protocol::{LobbyId, PlayerId};
use lobbyhub_transport::{
    CloseReason, Connection, Rejection, TransportError, UpgradeRequest,
    WebSocketConnection,
};
use tokio::net::TcpStream;

use crate::HubError;
use crate::server::ServerState;

/// What an upgrade request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    /// Become the owner of a new lobby.
    Create,
    /// Join an existing lobby, optionally reclaiming a player ID.
    Join {
        lobby_id: LobbyId,
        player_id: Option<PlayerId>,
    },
}

/// Decides what to do with an upgrade request, or refuses it.
pub(crate) fn route_request(
    request: &UpgradeRequest,
    path: &str,
    registry: &Registry<WebSocketConnection>,
) -> Result<Route, Rejection> {
    if request.path() != path {
        return Err(Rejection::not_found("Not found"));
    }

    let Some(lobby) = request.query_param("lobby") else {
        return Ok(Route::Create);
    };

    let lobby_id = LobbyId::new(lobby);
    if registry.get_lobby(&lobby_id).is_none() {
        return Err(Rejection::not_found("Lobby not found"));
    }

    Ok(Route::Join {
        lobby_id,
        player_id: request.query_param("player").map(PlayerId::new),
    })
}

/// Handles a single connection from accept to hand-off.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), HubError> {
    let mut route = None;
    let conn = WebSocketConnection::upgrade(stream, peer, |request| {
        route = Some(route_request(request, &state.path, &state.registry)?);
        Ok(())
    })
    .await?;

    let Some(route) = route else {
        return Err(TransportError::HandshakeFailed(
            "upgrade completed without inspection".into(),
        )
        .into());
    };

    let conn = Arc::new(conn);
    let conn_id = conn.id();

    match route {
        Route::Create => {
            match state.registry.create_lobby(Arc::clone(&conn)).await {
                Ok(lobby_id) => {
                    tracing::debug!(%conn_id, %peer, %lobby_id, "owner connected");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "failed to create lobby");
                    let _ = conn.close(CloseReason::internal_error()).await;
                    Err(e.into())
                }
            }
        }
        Route::Join {
            lobby_id,
            player_id,
        } => {
            match state
                .registry
                .join_lobby(&lobby_id, Arc::clone(&conn), player_id)
                .await
            {
                Ok((_, player_id)) => {
                    tracing::debug!(%conn_id, %peer, %lobby_id, %player_id, "player connected");
                    Ok(())
                }
                Err(LobbyError::NotFound(_)) => {
                    // Deleted between the upgrade check and the join.
                    tracing::debug!(%conn_id, %lobby_id, "lobby vanished during join");
                    let _ = conn.close(CloseReason::lobby_not_found()).await;
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(%conn_id, %lobby_id, error = %e, "failed to join lobby");
                    let _ = conn.close(CloseReason::internal_error()).await;
                    Err(e.into())
                }
            }
        }
    }
}
