//! WebSocket endpoint for live board updates.
//!
//! The connection lifecycle:
//! 1. The caller is identified from headers or query parameters during the
//!    upgrade and the session is registered with the room registry.
//! 2. The client sends `join-project` for every board it displays; the
//!    server answers `joined`, or `error` if the caller has no access.
//! 3. Board events for joined projects and the caller's own notification
//!    events are pushed as `event` frames.
//! 4. On disconnect the session leaves every room.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use kanban_proto::codec;
use kanban_proto::event::{ClientMessage, ServerFrame};
use kanban_proto::ids::{SessionId, UserId};
use tokio::sync::mpsc;

use crate::server::SharedState;
use crate::service::Principal;

/// Upgrades the request; the caller must be identified like any API call.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    principal: Principal,
) -> impl IntoResponse {
    ws.max_message_size(codec::MAX_FRAME_LEN)
        .on_upgrade(move |socket| handle_socket(socket, state, principal.id))
}

/// Drives one connected session until either side closes.
pub async fn handle_socket(socket: WebSocket, state: SharedState, user: UserId) {
    let session = SessionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.rooms.connect(session, user, tx);
    tracing::info!(session_id = %session, user_id = %user, "live session connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(session_id = %session, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = SharedState::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text(&reader_state, session, user, text.as_str()).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    let rooms_left = state.rooms.disconnect(session);
    tracing::info!(session_id = %session, rooms_left, "live session disconnected");
}

async fn handle_text(state: &SharedState, session: SessionId, user: UserId, text: &str) {
    let msg = match codec::decode_client(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(session_id = %session, error = %e, "failed to decode client frame");
            reply_error(state, session, e.to_string());
            return;
        }
    };

    match msg {
        ClientMessage::JoinProject { project_id } => {
            if !state.service.can_access(user, project_id).await {
                reply_error(state, session, "access denied".to_string());
                return;
            }
            match state.rooms.join(session, project_id) {
                Ok(_) => {
                    tracing::debug!(session_id = %session, project_id = %project_id, "joined project room");
                    state
                        .rooms
                        .send_to(session, &ServerFrame::Joined { project_id });
                }
                Err(e) => reply_error(state, session, e.to_string()),
            }
        }
        ClientMessage::LeaveProject { project_id } => {
            state.rooms.leave(session, project_id);
            state.rooms.send_to(session, &ServerFrame::Left { project_id });
        }
        ClientMessage::Relay { event } => match state.rooms.relay_from(session, &event) {
            Ok(delivered) => {
                tracing::debug!(session_id = %session, event = event.name(), delivered, "relayed client event");
            }
            Err(e) => reply_error(state, session, e.to_string()),
        },
    }
}

fn reply_error(state: &SharedState, session: SessionId, reason: String) {
    state.rooms.send_to(session, &ServerFrame::Error { reason });
}
