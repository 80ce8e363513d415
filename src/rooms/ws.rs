use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::directory::{self, GENERAL_ALIAS};
use super::events::{ClientEvent, Gate, RoomSession, ServerEvent, moderation_gate};
use super::hub::RoomHub;
use super::msg::{self, SendError};
use crate::{AppState, users};

#[axum::debug_handler(state = AppState)]
pub async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| handle_socket(state, stream))
}

async fn handle_socket(state: AppState, stream: WebSocket) {
    let (mut sender, mut receiver) = stream.split();
    let (conn, mut outbound) = RoomHub::channel();

    // Everything addressed to this connection, whether a direct reply or a
    // room broadcast, funnels through one outbound queue.
    let push_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::from(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<RoomSession> = None;
    while let Some(Ok(frame)) = receiver.next().await {
        let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
            continue;
        };
        handle_event(&state, &conn, &mut session, event).await;
    }

    push_task.abort();
    if let Some(session) = session {
        state.hub.prune(&session.room_id).await;
        debug!(
            room = session.room_id.as_str(),
            user = session.user_id.as_str(),
            "chat connection closed"
        );
    }
}

/// Dispatch one client frame against the connection's session.
pub(crate) async fn handle_event(
    state: &AppState,
    conn: &mpsc::Sender<ServerEvent>,
    session: &mut Option<RoomSession>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinRoom { mission_id, user_id } => {
            join_room(state, conn, session, mission_id, user_id).await;
        }
        ClientEvent::ChatMessage { sender_id, content } => {
            chat_message(state, conn, session.as_ref(), sender_id, content).await;
        }
        ClientEvent::BlockUser {
            room_id,
            target_user_id,
        } => set_blocked(state, session.as_ref(), &room_id, &target_user_id, true).await,
        ClientEvent::UnblockUser {
            room_id,
            target_user_id,
        } => set_blocked(state, session.as_ref(), &room_id, &target_user_id, false).await,
        ClientEvent::LockRoom(room_id) => set_locked(state, session.as_ref(), &room_id, true).await,
        ClientEvent::UnlockRoom(room_id) => {
            set_locked(state, session.as_ref(), &room_id, false).await;
        }
        ClientEvent::PinMessage { room_id, content } => {
            pin_message(state, conn, session.as_ref(), &room_id, &content).await;
        }
        ClientEvent::ClearPin { room_id } => clear_pin(state, session.as_ref(), &room_id).await,
    }
}

async fn emit(conn: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    let _ = conn.send(event).await;
}

async fn join_room(
    state: &AppState,
    conn: &mpsc::Sender<ServerEvent>,
    session: &mut Option<RoomSession>,
    mission_id: Option<String>,
    user_id: Option<String>,
) {
    if session.is_some() {
        emit(
            conn,
            ServerEvent::JoinError {
                message: "already in a room".to_owned(),
            },
        )
        .await;
        return;
    }

    let (mission_id, user_id) = match (mission_id, user_id) {
        (Some(mission_id), Some(user_id))
            if !mission_id.trim().is_empty() && !user_id.trim().is_empty() =>
        {
            (mission_id, user_id)
        }
        _ => {
            emit(
                conn,
                ServerEvent::JoinError {
                    message: "missing mission or user id".to_owned(),
                },
            )
            .await;
            return;
        }
    };

    let elevated = users::elevation_of(&state.db_pool, &user_id).await;

    let resolved = if mission_id == GENERAL_ALIAS {
        directory::resolve_general(&state.db_pool).await
    } else {
        directory::resolve_mission(&state.db_pool, &mission_id, &user_id).await
    };
    let room = match resolved {
        Ok(room) => room,
        Err(err) => {
            warn!(mission = mission_id.as_str(), error = %err, "room resolution failed on join");
            emit(
                conn,
                ServerEvent::JoinError {
                    message: "could not join the room".to_owned(),
                },
            )
            .await;
            return;
        }
    };

    if state.moderation.is_blocked(&room.uuid, &user_id).await {
        emit(
            conn,
            ServerEvent::Blocked {
                message: "you have been blocked in this room".to_owned(),
            },
        )
        .await;
        return;
    }

    if let Err(err) = directory::add_participant(&state.db_pool, &room.uuid, &user_id).await {
        // Joining still proceeds; the participant row is bookkeeping.
        warn!(room = room.uuid.as_str(), error = %err, "could not record participant");
    }

    state.hub.subscribe(&room.uuid, conn.clone()).await;
    *session = Some(RoomSession {
        room_id: room.uuid.clone(),
        user_id,
        elevated,
    });

    emit(
        conn,
        ServerEvent::JoinedRoom {
            room_id: room.uuid,
            title: room.title,
            pinned_message: room.pinned_message,
            locked: room.locked,
        },
    )
    .await;
}

async fn chat_message(
    state: &AppState,
    conn: &mpsc::Sender<ServerEvent>,
    session: Option<&RoomSession>,
    sender_id: Option<String>,
    content: Option<String>,
) {
    let Some(session) = session else {
        emit(
            conn,
            ServerEvent::MessageError {
                message: "invalid message or no room".to_owned(),
            },
        )
        .await;
        return;
    };

    if let Some(claimed) = sender_id.as_deref()
        && claimed != session.user_id
    {
        debug!(
            claimed,
            user = session.user_id.as_str(),
            "chatMessage sender differs from session user; using the session"
        );
    }

    let content = content.unwrap_or_default();
    if let Err(err) =
        msg::send_message(state, &session.room_id, &session.user_id, session.elevated, &content)
            .await
    {
        let message = match &err {
            SendError::EmptyContent => "invalid message or no room",
            SendError::Locked => "chat is locked",
            SendError::Blocked => "cannot send in this room",
            SendError::Persistence(db_err) => {
                error!(room = session.room_id.as_str(), error = %db_err, "message persistence failed");
                "could not send the message"
            }
        };
        emit(
            conn,
            ServerEvent::MessageError {
                message: message.to_owned(),
            },
        )
        .await;
    }
}

async fn set_blocked(
    state: &AppState,
    session: Option<&RoomSession>,
    room_id: &str,
    target_user_id: &str,
    blocked: bool,
) {
    let Gate::Authorized(_) = moderation_gate(session) else {
        debug!(room = room_id, "block command from non-elevated connection ignored");
        return;
    };

    if blocked {
        state.moderation.block(room_id, target_user_id).await;
        state
            .hub
            .broadcast(
                room_id,
                ServerEvent::UserBlocked {
                    target_user_id: target_user_id.to_owned(),
                },
            )
            .await;
    } else {
        state.moderation.unblock(room_id, target_user_id).await;
        state
            .hub
            .broadcast(
                room_id,
                ServerEvent::UserUnblocked {
                    target_user_id: target_user_id.to_owned(),
                },
            )
            .await;
    }
}

async fn set_locked(state: &AppState, session: Option<&RoomSession>, room_id: &str, locked: bool) {
    let Gate::Authorized(_) = moderation_gate(session) else {
        debug!(room = room_id, "lock command from non-elevated connection ignored");
        return;
    };

    if let Err(err) = directory::set_locked(&state.db_pool, room_id, locked).await {
        error!(room = room_id, error = %err, "could not update room lock");
        return;
    }

    let event = if locked {
        ServerEvent::ChatLocked {
            message: "the chat has been locked".to_owned(),
        }
    } else {
        ServerEvent::ChatUnlocked {
            message: "the chat has been unlocked".to_owned(),
        }
    };
    state.hub.broadcast(room_id, event).await;
}

async fn pin_message(
    state: &AppState,
    conn: &mpsc::Sender<ServerEvent>,
    session: Option<&RoomSession>,
    room_id: &str,
    content: &str,
) {
    let Gate::Authorized(session) = moderation_gate(session) else {
        debug!(room = room_id, "pin command from non-elevated connection ignored");
        return;
    };

    let content = content.trim();
    if content.is_empty() {
        return;
    }

    if let Err(err) = directory::set_pinned(&state.db_pool, room_id, content).await {
        error!(room = room_id, error = %err, "could not pin the message");
        emit(
            conn,
            ServerEvent::MessageError {
                message: "could not pin the message".to_owned(),
            },
        )
        .await;
        return;
    }

    state
        .hub
        .broadcast(
            room_id,
            ServerEvent::MessagePinned {
                content: content.to_owned(),
                pinned_by: session.user_id.clone(),
            },
        )
        .await;
}

async fn clear_pin(state: &AppState, session: Option<&RoomSession>, room_id: &str) {
    let Gate::Authorized(session) = moderation_gate(session) else {
        debug!(room = room_id, "clear-pin command from non-elevated connection ignored");
        return;
    };

    if let Err(err) = directory::set_pinned(&state.db_pool, room_id, "").await {
        error!(room = room_id, error = %err, "could not clear the pin");
        return;
    }

    state
        .hub
        .broadcast(
            room_id,
            ServerEvent::PinCleared {
                cleared_by: session.user_id.clone(),
            },
        )
        .await;
}
