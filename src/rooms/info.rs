use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use super::directory::{self, Room, RoomListing};
use crate::{AppResult, AppState, session};

#[axum::debug_handler(state = AppState)]
pub(crate) async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<RoomListing>>> {
    session::require_user(&session).await?;
    Ok(Json(directory::list_rooms(&db_pool).await?))
}

#[axum::debug_handler(state = AppState)]
pub(crate) async fn room_info(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(id): Path<String>,
) -> AppResult<Json<Room>> {
    session::require_user(&session).await?;
    Ok(Json(directory::resolve(&db_pool, &id).await?))
}

/// Unauthenticated probe used when a client cannot tell whether a room id it
/// holds is stale, malformed, or fine.
#[axum::debug_handler(state = AppState)]
pub(crate) async fn debug_room(
    State(db_pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    if Uuid::parse_str(&id).is_err() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "valid": false, "msg": "invalid room identifier" })),
        )
            .into_response());
    }

    let Some(room) = directory::fetch_by_id(&db_pool, &id).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "valid": true, "exists": false })),
        )
            .into_response());
    };

    let (message_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=?")
            .bind(&room.uuid)
            .fetch_one(&db_pool)
            .await?;

    Ok(Json(json!({
        "valid": true,
        "exists": true,
        "title": room.title,
        "messageCount": message_count,
        "locked": room.locked,
    }))
    .into_response())
}
