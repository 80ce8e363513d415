use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::{AppResult, ChatError};

pub const GENERAL_ALIAS: &str = "general";
pub const GENERAL_TITLE: &str = "Chat General";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(rename = "id")]
    pub uuid: String,
    pub title: String,
    pub mission_id: Option<String>,
    pub created_by: Option<String>,
    pub pinned_message: String,
    pub locked: bool,
    pub created_at: i64,
}

/// Resolve a room by durable id or the "general" alias.
///
/// The alias path lazily creates the general room and never fails; the id
/// path rejects malformed identifiers before touching storage.
pub async fn resolve(pool: &SqlitePool, id_or_alias: &str) -> AppResult<Room> {
    if id_or_alias == GENERAL_ALIAS {
        return Ok(resolve_general(pool).await?);
    }

    if Uuid::parse_str(id_or_alias).is_err() {
        warn!(id = id_or_alias, "malformed room identifier");
        return Err(ChatError::InvalidIdentifier);
    }

    fetch_by_id(pool, id_or_alias)
        .await?
        .ok_or(ChatError::NotFound("room"))
}

pub async fn fetch_by_id(pool: &SqlitePool, uuid: &str) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as(
        "SELECT uuid,title,mission_id,created_by,pinned_message,locked,created_at
         FROM rooms WHERE uuid=?",
    )
    .bind(uuid)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_by_mission(
    pool: &SqlitePool,
    mission_id: &str,
) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as(
        "SELECT uuid,title,mission_id,created_by,pinned_message,locked,created_at
         FROM rooms WHERE mission_id=?",
    )
    .bind(mission_id)
    .fetch_optional(pool)
    .await
}

/// The general room: found by its invariant title, created on first access
/// with no creator and no participants.
pub async fn resolve_general(pool: &SqlitePool) -> Result<Room, sqlx::Error> {
    if let Some(room) = fetch_general(pool).await? {
        return Ok(room);
    }

    let room = create_room(pool, GENERAL_TITLE, None, None).await?;
    info!(room = room.uuid.as_str(), "created the general room");
    Ok(room)
}

async fn fetch_general(pool: &SqlitePool) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as(
        "SELECT uuid,title,mission_id,created_by,pinned_message,locked,created_at
         FROM rooms WHERE title=? AND mission_id IS NULL",
    )
    .bind(GENERAL_TITLE)
    .fetch_optional(pool)
    .await
}

/// The join-flow entry point: one room per mission, created on first join
/// with the joining user as creator and sole participant.
pub async fn resolve_mission(
    pool: &SqlitePool,
    mission_id: &str,
    user_id: &str,
) -> Result<Room, sqlx::Error> {
    if let Some(room) = fetch_by_mission(pool, mission_id).await? {
        return Ok(room);
    }

    let title = format!("Sala misión {mission_id}");
    let room = create_room(pool, &title, Some(mission_id), Some(user_id)).await?;
    info!(mission = mission_id, room = room.uuid.as_str(), "created mission room");
    Ok(room)
}

/// Persist a new room. On a uniqueness conflict (the general title or an
/// already-bound mission) the insert is ignored and the standing room is
/// returned instead, so concurrent creation collapses to one record.
pub async fn create_room(
    pool: &SqlitePool,
    title: &str,
    mission_id: Option<&str>,
    created_by: Option<&str>,
) -> Result<Room, sqlx::Error> {
    let uuid = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT OR IGNORE INTO rooms (uuid,title,mission_id,created_by,pinned_message,locked,created_at)
         VALUES (?,?,?,?,'',0,?)",
    )
    .bind(&uuid)
    .bind(title)
    .bind(mission_id)
    .bind(created_by)
    .bind(db::unix_ms_now())
    .execute(pool)
    .await?;

    if let Some(room) = fetch_by_id(pool, &uuid).await? {
        if let Some(user_id) = created_by {
            add_participant(pool, &room.uuid, user_id).await?;
        }
        return Ok(room);
    }

    // The insert lost against a unique index; hand back the standing room.
    match mission_id {
        Some(mission) => fetch_by_mission(pool, mission)
            .await?
            .ok_or(sqlx::Error::RowNotFound),
        None => fetch_general(pool).await?.ok_or(sqlx::Error::RowNotFound),
    }
}

pub async fn add_participant(
    pool: &SqlitePool,
    room_id: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO room_participants (room_id,user_id,joined_at) VALUES (?,?,?)")
        .bind(room_id)
        .bind(user_id)
        .bind(db::unix_ms_now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_locked(pool: &SqlitePool, room_id: &str, locked: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rooms SET locked=? WHERE uuid=?")
        .bind(locked)
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_pinned(pool: &SqlitePool, room_id: &str, content: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rooms SET pinned_message=? WHERE uuid=?")
        .bind(content)
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionSummary {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatorSummary {
    pub id: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    pub id: String,
    pub title: String,
    pub mission: Option<MissionSummary>,
    pub created_by: Option<CreatorSummary>,
    pub pinned_message: String,
    pub locked: bool,
    pub created_at: i64,
}

/// All rooms with creator and mission summaries attached.
pub async fn list_rooms(pool: &SqlitePool) -> Result<Vec<RoomListing>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct Row {
        uuid: String,
        title: String,
        mission_id: Option<String>,
        mission_title: Option<String>,
        created_by: Option<String>,
        creator_username: Option<String>,
        pinned_message: String,
        locked: bool,
        created_at: i64,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT r.uuid, r.title, r.mission_id, m.title AS mission_title,
                r.created_by, u.username AS creator_username,
                r.pinned_message, r.locked, r.created_at
         FROM rooms r
         LEFT JOIN users u ON u.uuid = r.created_by
         LEFT JOIN missions m ON m.uuid = r.mission_id
         ORDER BY r.created_at ASC, r.uuid ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RoomListing {
            id: row.uuid,
            title: row.title,
            mission: row.mission_id.map(|id| MissionSummary {
                id,
                title: row.mission_title,
            }),
            created_by: row.created_by.map(|id| CreatorSummary {
                id,
                username: row.creator_username,
            }),
            pinned_message: row.pinned_message,
            locked: row.locked,
            created_at: row.created_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_user, test_pool};

    #[tokio::test]
    async fn general_resolution_is_idempotent() {
        let pool = test_pool().await;

        let first = resolve(&pool, GENERAL_ALIAS).await.expect("first resolve");
        let second = resolve(&pool, GENERAL_ALIAS).await.expect("second resolve");
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(first.title, GENERAL_TITLE);
        assert_eq!(first.created_by, None);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn mission_resolution_reuses_the_room() {
        let pool = test_pool().await;
        let mission = Uuid::now_v7().to_string();

        let first = resolve_mission(&pool, &mission, "u1").await.expect("first");
        let second = resolve_mission(&pool, &mission, "u2").await.expect("second");
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(first.mission_id.as_deref(), Some(mission.as_str()));
        assert_eq!(first.created_by.as_deref(), Some("u1"));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn creation_seeds_the_creator_as_participant() {
        let pool = test_pool().await;
        let room = create_room(&pool, "Tareas", None, Some("u1"))
            .await
            .expect("create");

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM room_participants WHERE room_id=? AND user_id='u1'")
                .bind(&room.uuid)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(count, 1);

        // Joining again is a no-op.
        add_participant(&pool, &room.uuid, "u1").await.expect("rejoin");
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM room_participants WHERE room_id=?")
                .bind(&room.uuid)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn malformed_and_missing_ids_are_distinguished() {
        let pool = test_pool().await;

        match resolve(&pool, "not-a-uuid").await {
            Err(ChatError::InvalidIdentifier) => {}
            other => panic!("expected InvalidIdentifier, got {other:?}"),
        }

        let absent = Uuid::now_v7().to_string();
        match resolve(&pool, &absent).await {
            Err(ChatError::NotFound("room")) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lock_and_pin_round_trip() {
        let pool = test_pool().await;
        let room = create_room(&pool, "Sala", None, None).await.expect("create");
        assert!(!room.locked);
        assert_eq!(room.pinned_message, "");

        set_locked(&pool, &room.uuid, true).await.expect("lock");
        set_pinned(&pool, &room.uuid, "Read chapter 3").await.expect("pin");

        let room = resolve(&pool, &room.uuid).await.expect("resolve");
        assert!(room.locked);
        assert_eq!(room.pinned_message, "Read chapter 3");

        set_pinned(&pool, &room.uuid, "").await.expect("clear");
        let room = resolve(&pool, &room.uuid).await.expect("resolve");
        assert_eq!(room.pinned_message, "");
    }

    #[tokio::test]
    async fn listing_attaches_summaries() {
        let pool = test_pool().await;
        seed_user(&pool, "u1", "profe", "teacher").await;
        sqlx::query("INSERT INTO missions (uuid,title) VALUES ('m1','Fotosíntesis')")
            .execute(&pool)
            .await
            .expect("seed mission");

        create_room(&pool, "Sala misión m1", Some("m1"), Some("u1"))
            .await
            .expect("create");
        resolve_general(&pool).await.expect("general");

        let listing = list_rooms(&pool).await.expect("list");
        assert_eq!(listing.len(), 2);

        let mission_room = listing
            .iter()
            .find(|room| room.mission.is_some())
            .expect("mission room listed");
        let mission = mission_room.mission.as_ref().expect("summary");
        assert_eq!(mission.id, "m1");
        assert_eq!(mission.title.as_deref(), Some("Fotosíntesis"));
        let creator = mission_room.created_by.as_ref().expect("creator");
        assert_eq!(creator.username.as_deref(), Some("profe"));

        let general = listing
            .iter()
            .find(|room| room.mission.is_none())
            .expect("general listed");
        assert!(general.created_by.is_none());
    }
}
