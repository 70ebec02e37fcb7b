//! Manages the lifecycle of one relay session.
//!
//! A session moves through `Bootstrapping -> Forwarding -> Closing -> Closed`.
//! Bootstrapping reads the client's first frame, resolves the agent, opens
//! and configures the upstream socket, and only then tells the client it is
//! connected. Any bootstrap failure skips forwarding entirely.

use super::{
    error::RelayError,
    forward::{MAX_MESSAGE_BYTES, close_sink, relay},
    protocol::{ClientHello, ServerMessage},
    upstream::{self, UpstreamSocket},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{fmt, sync::Arc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Bootstrapping,
    Forwarding,
    Closing,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Bootstrapping => "bootstrapping",
            Phase::Forwarding => "forwarding",
            Phase::Closing => "closing",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How bootstrapping ended when it did not fail.
#[derive(Debug, PartialEq, Eq)]
enum Bootstrap {
    /// Upstream is open and configured; the client has been told.
    Ready,
    /// The client went away before sending its first frame.
    ClientLeft,
    /// The session was cancelled from outside.
    Cancelled,
}

/// Axum handler to upgrade an HTTP connection to a relay WebSocket.
///
/// The session task is registered with `AppState::sessions` so that server
/// shutdown can wait for its sockets to close.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let sessions = state.sessions.clone();
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .max_frame_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| sessions.track_future(handle_socket(socket, state)))
}

/// Runs one relay session from upgrade to close.
///
/// Both sockets are owned here. Whatever path the session takes, each of
/// them is closed exactly once before this function returns.
#[instrument(name = "relay_session", skip_all, fields(session_id, agent_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id);
    info!(phase = %Phase::Bootstrapping, "New relay connection. Awaiting session configuration...");

    let cancel = state.shutdown.child_token();
    let (mut client_tx, mut client_rx) = socket.split();
    let mut upstream: Option<UpstreamSocket> = None;

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(Bootstrap::Cancelled),
        result = bootstrap(&mut client_rx, &mut client_tx, &state, &mut upstream) => result,
    };

    match (result, upstream.take()) {
        (Ok(Bootstrap::Ready), Some(socket)) => {
            info!(phase = %Phase::Forwarding, "Relay established");
            let (mut upstream_tx, mut upstream_rx) = socket.split();
            let outcome = relay(
                &mut client_rx,
                &mut client_tx,
                &mut upstream_rx,
                &mut upstream_tx,
                &cancel,
            )
            .await;
            info!(phase = %Phase::Closing, ?outcome, "Relay stopped");
        }
        (result, socket) => {
            match result {
                Err(e) => {
                    error!(error = %e, "Relay bootstrap failed");
                    if send_msg(&mut client_tx, ServerMessage::error(e.to_string()))
                        .await
                        .is_err()
                    {
                        debug!("Client already gone; error frame not delivered");
                    }
                }
                Ok(outcome) => info!(?outcome, "Relay ended during bootstrap"),
            }
            info!(phase = %Phase::Closing, "Closing relay sockets");
            if let Some(mut socket) = socket {
                close_sink("upstream", &mut socket).await;
            }
            close_sink("client", &mut client_tx).await;
        }
    }

    info!(phase = %Phase::Closed, "Relay session finished");
}

/// Resolves the agent, opens the upstream socket and configures it.
///
/// The upstream socket is stored into `upstream` as soon as it is open, so
/// the caller can close it even if a later step fails.
async fn bootstrap(
    client_rx: &mut SplitStream<WebSocket>,
    client_tx: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    upstream: &mut Option<UpstreamSocket>,
) -> Result<Bootstrap, RelayError> {
    let agent_id = match client_rx.next().await {
        Some(Ok(Message::Text(text))) => ClientHello::agent_id(text.as_str()),
        Some(Ok(Message::Close(_))) | None => {
            info!("Client disconnected before sending its first frame.");
            return Ok(Bootstrap::ClientLeft);
        }
        Some(Ok(_)) => {
            debug!("First frame is not text; continuing without an agent id");
            None
        }
        Some(Err(e)) => {
            warn!(error = %e, "Failed to read first client frame");
            return Ok(Bootstrap::ClientLeft);
        }
    };

    let agent = agent_id.as_deref().and_then(|id| state.registry.get(id));
    match (&agent_id, &agent) {
        (Some(id), Some(_)) => {
            tracing::Span::current().record("agent_id", id.as_str());
            info!("Agent resolved");
        }
        (Some(id), None) => warn!(agent_id = %id, "Unknown agent id; using service defaults"),
        (None, _) => info!("No agent id supplied; using service defaults"),
    }

    let request = upstream::build_request(agent.as_deref(), &state.config.voice_live)?;
    let socket = upstream.insert(upstream::connect(&request).await?);

    let session_update = serde_json::to_string(&request.session_update)?;
    socket
        .send(WsMessage::Text(session_update.into()))
        .await
        .map_err(|e| RelayError::Protocol(e.to_string()))?;
    debug!("Session configuration sent upstream");

    send_msg(
        client_tx,
        ServerMessage::ProxyConnected {
            message: "Connected to voice service".to_string(),
        },
    )
    .await
    .map_err(|e| RelayError::Protocol(format!("Failed to notify client: {e}")))?;

    Ok(Bootstrap::Ready)
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
