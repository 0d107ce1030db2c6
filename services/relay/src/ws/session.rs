//! Manages the WebSocket connection lifecycle for one agent.
//!
//! Each connection gets a writer task fed by an unbounded channel; the
//! session state machine only ever holds that channel's sender, never the
//! socket itself. The read loop decodes envelopes and dispatches them into
//! the shared session under its lock.

use super::turns;
use crate::session::RegisterOutcome;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use dealtalk_core::negotiation::Role;
use dealtalk_core::protocol::Envelope;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "relay_conn", skip_all, fields(conn_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id: u32 = rand::random();
    tracing::Span::current().record("conn_id", conn_id);
    info!("new connection; awaiting registration");

    let (mut socket_tx, mut socket_rx) = socket.split();

    // Writer task: pump envelopes from the session into the socket.
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Envelope>();
    let writer = tokio::spawn(
        async move {
            while let Some(envelope) = outbox_rx.recv().await {
                let serialized = match serde_json::to_string(&envelope) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "failed to serialize envelope");
                        continue;
                    }
                };
                if socket_tx.send(Message::Text(serialized.into())).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    // Set once this connection successfully claims a role slot.
    let mut registered: Option<(Role, String)> = None;

    while let Some(msg_result) = socket_rx.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "error receiving from connection");
                break;
            }
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                Ok(Envelope::Register { role, name }) => {
                    if registered.is_some() {
                        warn!("duplicate register on an already-registered connection; ignoring");
                        continue;
                    }
                    let mut session = state.session.lock().await;
                    match session.register(role, name.clone(), conn_id, outbox_tx.clone()) {
                        RegisterOutcome::RoleTaken => {
                            warn!(%role, agent = %name, "role already taken; closing connection");
                            break;
                        }
                        RegisterOutcome::Joined { session_ready } => {
                            info!(%role, agent = %name, "agent registered");
                            registered = Some((role, name));
                            if session_ready {
                                // The start broadcast doubles as the opening
                                // directive for the company agent.
                                if let Some(start) = session.start_event() {
                                    session.broadcast(start);
                                }
                                info!("both agents present; session started");
                            }
                        }
                    }
                }
                Ok(envelope @ Envelope::Message { .. }) => {
                    let Some((own_role, own_name)) = &registered else {
                        warn!("message-turn before registration; ignoring");
                        continue;
                    };
                    // A connection only ever speaks as the identity it
                    // registered; the envelope's claim is not trusted.
                    if let Envelope::Message { sender, role, .. } = &envelope {
                        if role != own_role || sender != own_name {
                            warn!(
                                claimed_role = %role,
                                claimed_sender = %sender,
                                registered_role = %own_role,
                                "message-turn does not match registered identity; ignoring"
                            );
                            continue;
                        }
                    }
                    turns::handle_turn(&state, conn_id, envelope).await;
                }
                Ok(Envelope::Error { error, sender }) => {
                    warn!(agent = %sender, error = %error, "agent reported a generation error");
                }
                Ok(other) => {
                    warn!(envelope = ?other, "unexpected envelope from agent; ignoring");
                }
                Err(e) => {
                    warn!(error = %e, "undecodable frame; ignoring");
                }
            },
            Message::Close(_) => {
                info!("connection sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    if let Some((role, name)) = registered {
        turns::handle_disconnect(&state, conn_id, role, &name).await;
    }
    writer.abort();
    info!("connection closed");
}
