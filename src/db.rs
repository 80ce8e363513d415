use sqlx::SqlitePool;
use time::OffsetDateTime;

/// Idempotent schema bootstrap, run once at startup.
///
/// `users` and `missions` are the read-side slice of tables owned by the
/// account and mission services; this crate never writes them outside tests.
pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rooms (
            uuid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            mission_id TEXT,
            created_by TEXT,
            pinned_message TEXT NOT NULL DEFAULT '',
            locked INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // One room per mission, and a single "Chat General" room. Enforcing this
    // here makes concurrent lazy creation collapse to a single row.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS rooms_by_mission
         ON rooms(mission_id) WHERE mission_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS rooms_general
         ON rooms(title) WHERE mission_id IS NULL AND title = 'Chat General'",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS room_participants (
            room_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            joined_at INTEGER NOT NULL,
            PRIMARY KEY (room_id, user_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'text',
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS messages_by_room
         ON messages(room_id, created_at, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            uuid TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user'
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS missions (
            uuid TEXT PRIMARY KEY,
            title TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Current Unix time in milliseconds.
#[inline]
pub fn unix_ms_now() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
