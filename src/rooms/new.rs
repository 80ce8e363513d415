use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use super::directory;
use crate::{AppResult, AppState, ChatError, session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewRoomBody {
    title: String,
    mission_id: Option<String>,
}

#[axum::debug_handler(state = AppState)]
pub(crate) async fn create_room(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(NewRoomBody { title, mission_id }): Json<NewRoomBody>,
) -> AppResult<Json<Value>> {
    let user_id = session::require_user(&session).await?;

    let title = title.trim();
    if title.is_empty() {
        return Err(ChatError::Validation("room title is required".to_owned()));
    }

    let room =
        directory::create_room(&db_pool, title, mission_id.as_deref(), Some(&user_id)).await?;
    info!(room = room.uuid.as_str(), by = user_id.as_str(), "room created");

    Ok(Json(json!({ "msg": "room created", "room": room })))
}

#[axum::debug_handler(state = AppState)]
pub(crate) async fn create_mission_room(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(NewRoomBody { title, mission_id }): Json<NewRoomBody>,
) -> AppResult<Json<Value>> {
    let user_id = session::require_user(&session).await?;

    let title = title.trim();
    if title.is_empty() {
        return Err(ChatError::Validation("room title is required".to_owned()));
    }
    let mission_id = mission_id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
        ChatError::Validation("a mission id is required for a mission room".to_owned())
    })?;

    // One room per mission: a second create hands back the standing room.
    let room = directory::create_room(&db_pool, title, Some(&mission_id), Some(&user_id)).await?;
    info!(
        room = room.uuid.as_str(),
        mission = mission_id.as_str(),
        "mission room resolved"
    );

    Ok(Json(json!({ "msg": "mission room created", "room": room })))
}
