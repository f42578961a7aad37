//! WebSocket handler — drawing session transport.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID, registers an unauthenticated
//! connection, and enters a `select!` loop:
//! - Incoming client messages → `ingest::process_inbound_text` → apply Outcome
//! - Frames queued on this connection's channel (broadcasts) → forward to client
//!
//! The ingest layer decides; this layer owns the socket. A `Close` outcome
//! sends a `1008` close frame with the violation text as its reason and ends
//! the loop without reading further messages.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register in the connection registry (no identity yet)
//! 2. `authenticate` frame → identity bound, rooms can be joined
//! 3. Shapes admitted → queued; persisted shapes arrive via the channel
//! 4. Close or error → unregister, dropping every room membership

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{CLOSE_POLICY_VIOLATION, ErrorCode, ServerFrame};
use crate::services::ingest::{self, Outcome, ProtocolViolation, Session};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();

    // Per-connection channel for frames fanned out by the drain worker.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerFrame>(state.engine.client_channel_capacity);
    state.registry.register(connection_id, client_tx).await;
    info!(%connection_id, "ws: client connected");

    let mut session = Session::new(connection_id);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let outcome = match msg {
                    Message::Text(text) => ingest::process_inbound_text(&state, &mut session, text.as_str()).await,
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => ingest::process_inbound_text(&state, &mut session, text).await,
                        Err(e) => {
                            warn!(%connection_id, error = %e, "ws: binary message is not utf-8");
                            Outcome::Close(ProtocolViolation::MalformedFrame(e.into()))
                        }
                    },
                    Message::Close(_) => break,
                    _ => continue,
                };
                match outcome {
                    Outcome::Continue => {}
                    Outcome::Reply(frame) => {
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Outcome::Close(violation) => {
                        close_with_violation(&mut socket, connection_id, &violation).await;
                        break;
                    }
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.unregister(connection_id).await;
    let online = state.registry.connection_count().await;
    info!(
        connection_id = %session.connection_id(),
        user_id = session.user_id().unwrap_or("-"),
        authenticated = session.is_authenticated(),
        online,
        "ws: client disconnected"
    );
}

// =============================================================================
// SEND
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), ()> {
    let json = match frame.to_json() {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn close_with_violation(socket: &mut WebSocket, connection_id: Uuid, violation: &ProtocolViolation) {
    warn!(%connection_id, code = violation.error_code(), reason = %violation, "ws: closing connection");
    let frame = CloseFrame { code: CLOSE_POLICY_VIOLATION, reason: violation.to_string().into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
