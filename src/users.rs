use sqlx::SqlitePool;

/// Roles mirrored from the account service; admins and teachers hold
/// moderation powers in chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    Teacher,
}

impl Role {
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }

    fn parse(role: &str) -> Role {
        match role {
            "admin" => Role::Admin,
            "teacher" => Role::Teacher,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserSummary {
    pub uuid: String,
    pub username: String,
    pub role: Role,
}

pub async fn fetch_user(
    db_pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<UserSummary>, sqlx::Error> {
    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT uuid,username,role FROM users WHERE uuid=?")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;

    Ok(row.map(|(uuid, username, role)| UserSummary {
        uuid,
        username,
        role: Role::parse(&role),
    }))
}

/// Elevation for a user id. Unknown users and lookup failures count as not
/// elevated; joining must not hard-fail on a user lookup.
pub async fn elevation_of(db_pool: &SqlitePool, user_id: &str) -> bool {
    match fetch_user(db_pool, user_id).await {
        Ok(Some(user)) => user.role.is_elevated(),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(user = user_id, error = %err, "user lookup failed, treating as not elevated");
            false
        }
    }
}
