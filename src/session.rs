use tower_sessions::Session;

use crate::{AppResult, ChatError};

/// Session key under which the auth layer stores the signed-in user's id.
pub const USER_ID: &str = "user_id";

pub async fn require_user(session: &Session) -> AppResult<String> {
    session
        .get::<String>(USER_ID)
        .await?
        .ok_or(ChatError::Unauthorized)
}
