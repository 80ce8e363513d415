use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tower_sessions::Session;
use uuid::Uuid;

use crate::rooms::directory;
use crate::rooms::events::{SenderInfo, ServerEvent};
use crate::{AppResult, AppState, ChatError, db, session, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
    Emoji,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: i64,
}

/// Why a send attempt did not produce a message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message content is required")]
    EmptyContent,
    #[error("chat is locked")]
    Locked,
    #[error("cannot send in this room")]
    Blocked,
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),
}

/// The one send path, shared by the realtime gateway and the HTTP post
/// handler so lock/block enforcement cannot drift between the two.
///
/// Order: trim, lock gate (elevated senders pass), block gate, persist,
/// broadcast. The broadcast happens strictly after the row is durable; a
/// rejected or failed send never fans out.
pub async fn send_message(
    state: &AppState,
    room_id: &str,
    sender_id: &str,
    elevated: bool,
    content: &str,
) -> Result<MessageRecord, SendError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(SendError::EmptyContent);
    }

    let (locked,): (bool,) = sqlx::query_as("SELECT locked FROM rooms WHERE uuid=?")
        .bind(room_id)
        .fetch_one(&state.db_pool)
        .await?;
    if locked && !elevated {
        return Err(SendError::Locked);
    }

    if state.moderation.is_blocked(room_id, sender_id).await {
        return Err(SendError::Blocked);
    }

    let record = insert_message(&state.db_pool, room_id, sender_id, content).await?;

    let username = users::fetch_user(&state.db_pool, sender_id)
        .await
        .ok()
        .flatten()
        .map(|user| user.username)
        .unwrap_or_else(|| "Anonymous".to_owned());

    state
        .hub
        .broadcast(
            room_id,
            ServerEvent::NewMessage {
                sender: SenderInfo {
                    id: record.sender_id.clone(),
                    username,
                },
                content: record.content.clone(),
                kind: record.kind,
                time: format_clock(record.created_at),
                created_at: record.created_at,
            },
        )
        .await;

    Ok(record)
}

async fn insert_message(
    pool: &SqlitePool,
    room_id: &str,
    sender_id: &str,
    content: &str,
) -> Result<MessageRecord, sqlx::Error> {
    let record = MessageRecord {
        id: Uuid::now_v7().to_string(),
        room_id: room_id.to_owned(),
        sender_id: sender_id.to_owned(),
        content: content.to_owned(),
        kind: MessageKind::Text,
        created_at: db::unix_ms_now(),
    };

    sqlx::query("INSERT INTO messages (id,room_id,sender_id,content,kind,created_at) VALUES (?,?,?,?,?,?)")
        .bind(&record.id)
        .bind(&record.room_id)
        .bind(&record.sender_id)
        .bind(&record.content)
        .bind(record.kind)
        .bind(record.created_at)
        .execute(pool)
        .await?;

    Ok(record)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryMessage {
    pub id: String,
    pub sender_id: String,
    pub username: Option<String>,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: i64,
}

/// A room's messages in the order they were accepted. Creation time orders,
/// v7 ids break same-millisecond ties in insertion order.
pub async fn room_history(
    pool: &SqlitePool,
    room_id: &str,
) -> Result<Vec<HistoryMessage>, sqlx::Error> {
    sqlx::query_as(
        "SELECT m.id, m.sender_id, u.username, m.content, m.kind, m.created_at
         FROM messages m
         LEFT JOIN users u ON u.uuid = m.sender_id
         WHERE m.room_id = ?
         ORDER BY m.created_at ASC, m.id ASC",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await
}

pub(crate) fn format_clock(unix_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix_ms.div_euclid(1000))
        .ok()
        .and_then(|stamp| {
            stamp
                .format(format_description!("[hour]:[minute]:[second]"))
                .ok()
        })
        .unwrap_or_default()
}

fn history_json(message: &HistoryMessage) -> serde_json::Value {
    serde_json::json!({
        "id": message.id,
        "sender": {
            "id": message.sender_id,
            "username": message.username.as_deref().unwrap_or("Anonymous"),
        },
        "content": message.content,
        "type": message.kind,
        "time": format_clock(message.created_at),
        "createdAt": message.created_at,
    })
}

#[axum::debug_handler(state = AppState)]
pub(crate) async fn room_messages(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(id): Path<String>,
) -> AppResult<Response> {
    session::require_user(&session).await?;

    let room = directory::resolve(&db_pool, &id).await?;
    let history = room_history(&db_pool, &room.uuid).await?;
    let body: Vec<serde_json::Value> = history.iter().map(history_json).collect();
    Ok(Json(body).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostMessageBody {
    content: String,
}

#[axum::debug_handler(state = AppState)]
pub(crate) async fn post_message(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(PostMessageBody { content }): Json<PostMessageBody>,
) -> AppResult<Response> {
    let user_id = session::require_user(&session).await?;

    let room = directory::resolve(&state.db_pool, &id).await?;
    let elevated = users::elevation_of(&state.db_pool, &user_id).await;

    let record = send_message(&state, &room.uuid, &user_id, elevated, &content)
        .await
        .map_err(|err| match err {
            SendError::EmptyContent => ChatError::Validation(err.to_string()),
            SendError::Locked | SendError::Blocked => ChatError::Forbidden(err.to_string()),
            SendError::Persistence(err) => ChatError::from(err),
        })?;

    let username = users::fetch_user(&state.db_pool, &record.sender_id)
        .await
        .ok()
        .flatten()
        .map(|user| user.username);

    Ok(Json(serde_json::json!({
        "msg": "message sent",
        "message": history_json(&HistoryMessage {
            id: record.id,
            sender_id: record.sender_id,
            username,
            content: record.content,
            kind: record.kind,
            created_at: record.created_at,
        }),
    }))
    .into_response())
}
