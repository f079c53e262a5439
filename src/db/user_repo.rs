use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, timestamp};
use crate::models::User;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    display_name: Option<String>,
    is_admin: bool,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn into_user(self) -> Result<User, sqlx::Error> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            email: self.email,
            display_name: self.display_name,
            is_admin: self.is_admin,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

const USER_COLUMNS: &str = "id, email, display_name, is_admin, created_at, updated_at";

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a user. Fails with a unique violation when the email is taken.
    pub async fn create(&self, user: &User, password_hash: Option<&str>) -> Result<User, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, display_name, is_admin, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(password_hash)
        .bind(&user.display_name)
        .bind(user.is_admin)
        .bind(timestamp(&user.created_at))
        .bind(timestamp(&user.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(user.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Case-insensitive lookup.
    pub async fn by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_user).transpose()
    }

    pub async fn password_hash(&self, id: Uuid) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(hash,)| hash))
    }

    pub async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash)
            .bind(timestamp(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Grants or revokes admin. Returns false when no such user exists.
    pub async fn set_admin(&self, email: &str, is_admin: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_admin = ?, updated_at = ? WHERE email = ?")
            .bind(is_admin)
            .bind(timestamp(&Utc::now()))
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All users, oldest first.
    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC, rowid ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Deletes a user along with their lists, sessions and accepted shares.
    ///
    /// Returns false when no such user exists.
    pub async fn delete_by_email(&self, email: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some((id,)): Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM shopping_list_shares WHERE accepted_by = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        // CASCADE handles lists (and their items/shares) and sessions
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// True when `err` is a uniqueness constraint failure.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_store;
    use crate::models::{Item, ShoppingList};

    #[tokio::test]
    async fn test_create_and_lookup_case_insensitive() {
        let db = setup_store().await;
        let user = User::new("Alice@Example.com").with_display_name(Some("Alice".into()));

        db.store.users.create(&user, Some("hash")).await.unwrap();

        let found = db
            .store
            .users
            .by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.display_name.as_deref(), Some("Alice"));
        assert!(!found.is_admin);

        let hash = db.store.users.password_hash(user.id).await.unwrap();
        assert_eq!(hash.as_deref(), Some("hash"));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let db = setup_store().await;
        db.store
            .users
            .create(&User::new("a@x.com"), None)
            .await
            .unwrap();

        let err = db
            .store
            .users
            .create(&User::new("A@X.COM"), None)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_set_admin() {
        let db = setup_store().await;
        db.store
            .users
            .create(&User::new("a@x.com"), None)
            .await
            .unwrap();

        assert!(db.store.users.set_admin("a@x.com", true).await.unwrap());
        assert!(!db.store.users.set_admin("nobody@x.com", true).await.unwrap());

        let user = db.store.users.by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.is_admin);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = setup_store().await;
        let owner = User::new("a@x.com");
        db.store.users.create(&owner, None).await.unwrap();
        let actor = owner.actor();

        let list = db
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &actor))
            .await
            .unwrap();
        db.store
            .items
            .add(&Item::new(list.id, "Milk", &actor), &actor)
            .await
            .unwrap();

        assert!(db.store.users.delete_by_email("a@x.com").await.unwrap());
        assert!(!db.store.users.delete_by_email("a@x.com").await.unwrap());

        assert_eq!(db.store.users.count().await.unwrap(), 0);
        assert_eq!(db.store.lists.count().await.unwrap(), 0);
        assert_eq!(db.store.items.count().await.unwrap(), 0);
    }
}
