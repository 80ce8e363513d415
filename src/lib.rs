pub mod db;
pub mod error;
pub mod moderation;
pub mod rooms;
pub mod session;
pub mod users;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use error::{AppResult, ChatError};
pub use moderation::ModerationRegistry;
pub use rooms::hub::RoomHub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: RoomHub,
    pub moderation: ModerationRegistry,
}
