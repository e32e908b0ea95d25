//! User store backing the user listing endpoint

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::DatabaseResult;

/// A loyalty program member. The password hash is never loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Read access to users
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users ordered by id
    async fn list_users(&self) -> DatabaseResult<Vec<User>>;
}

/// PostgreSQL `users` table
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LIST_USERS_SQL: &str = "SELECT id::BIGINT AS id, email, first_name, last_name, \
     created_at, updated_at FROM users ORDER BY id";

#[async_trait]
impl UserStore for PgUserStore {
    async fn list_users(&self) -> DatabaseResult<Vec<User>> {
        let rows = sqlx::query(LIST_USERS_SQL).fetch_all(&self.pool).await?;

        let users = rows
            .iter()
            .map(User::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_json_has_no_password() {
        let created = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let user = User {
            id: 7,
            email: "ada@example.com".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            created_at: created,
            updated_at: created,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["first_name"], "Ada");
        assert!(json["last_name"].is_null());
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_list_query_skips_password_column() {
        assert!(!LIST_USERS_SQL.contains("password"));
        assert!(LIST_USERS_SQL.ends_with("ORDER BY id"));
    }
}
