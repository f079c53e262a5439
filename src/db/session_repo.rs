use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, timestamp};

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

/// A stored session joined with its user's email.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RawSessionRow {
    token: String,
    user_id: String,
    email: String,
    created_at: String,
    expires_at: String,
}

impl RawSessionRow {
    fn into_session(self) -> Result<SessionRow, sqlx::Error> {
        Ok(SessionRow {
            token: self.token,
            user_id: parse_uuid(&self.user_id)?,
            email: self.email,
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
        })
    }
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token)
        .bind(user_id.to_string())
        .bind(timestamp(&Utc::now()))
        .bind(timestamp(&expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, token: &str) -> Result<Option<SessionRow>, sqlx::Error> {
        let row: Option<RawSessionRow> = sqlx::query_as(
            r#"
            SELECT s.token, s.user_id, u.email, s.created_at, s.expires_at
            FROM sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RawSessionRow::into_session).transpose()
    }

    /// Replaces `old` with `new`, keeping the user. Returns false when `old`
    /// does not exist.
    pub async fn rotate(
        &self,
        old: &str,
        new: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET token = ?, created_at = ?, expires_at = ? WHERE token = ?",
        )
        .bind(new)
        .bind(timestamp(&Utc::now()))
        .bind(timestamp(&expires_at))
        .bind(old)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drops every session of a user, e.g. after a password reset.
    pub async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{create_user, setup_store};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_create_get_rotate_delete() {
        let db = setup_store().await;
        let actor = create_user(&db.store, "a@x.com").await;
        let sessions = &db.store.sessions;

        sessions
            .create("tok1", actor.user_id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let row = sessions.get("tok1").await.unwrap().unwrap();
        assert_eq!(row.user_id, actor.user_id);
        assert_eq!(row.email, "a@x.com");

        assert!(sessions
            .rotate("tok1", "tok2", Utc::now() + Duration::hours(2))
            .await
            .unwrap());
        assert!(sessions.get("tok1").await.unwrap().is_none());
        assert!(sessions.get("tok2").await.unwrap().is_some());

        assert!(sessions.delete("tok2").await.unwrap());
        assert!(!sessions.delete("tok2").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let db = setup_store().await;
        let actor = create_user(&db.store, "a@x.com").await;
        let sessions = &db.store.sessions;

        sessions
            .create("old", actor.user_id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        sessions
            .create("fresh", actor.user_id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(sessions.delete_expired().await.unwrap(), 1);
        assert!(sessions.get("fresh").await.unwrap().is_some());
        assert_eq!(sessions.delete_for_user(actor.user_id).await.unwrap(), 1);
    }
}
