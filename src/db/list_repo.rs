use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, timestamp};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, Record};
use crate::models::{Actor, ShoppingList};

#[derive(Debug, Clone)]
pub struct ListRepository {
    pool: SqlitePool,
    feed: Arc<ChangeFeed>,
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    name: String,
    note: Option<String>,
    owner_id: String,
    owner_email: String,
    created_at: String,
    updated_at: String,
    updated_by_email: Option<String>,
}

impl ListRow {
    fn into_list(self) -> Result<ShoppingList, sqlx::Error> {
        Ok(ShoppingList {
            id: parse_uuid(&self.id)?,
            name: self.name,
            note: self.note,
            owner_id: parse_uuid(&self.owner_id)?,
            owner_email: self.owner_email,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            updated_by_email: self.updated_by_email,
        })
    }
}

impl ListRepository {
    pub fn new(pool: SqlitePool, feed: Arc<ChangeFeed>) -> Self {
        Self { pool, feed }
    }

    pub async fn create(&self, list: &ShoppingList) -> Result<ShoppingList, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO shopping_lists (id, name, note, owner_id, owner_email, created_at, updated_at, updated_by_email)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(list.id.to_string())
        .bind(&list.name)
        .bind(&list.note)
        .bind(list.owner_id.to_string())
        .bind(&list.owner_email)
        .bind(timestamp(&list.created_at))
        .bind(timestamp(&list.updated_at))
        .bind(&list.updated_by_email)
        .execute(&self.pool)
        .await?;

        let created = self.get(list.id).await?.ok_or(sqlx::Error::RowNotFound)?;

        self.feed.publish(ChangeEvent::new(
            ChangeKind::Insert,
            Record::List(created.clone()),
            Some(&list.owner_email),
        ));

        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ShoppingList>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_list(&mut *conn, id).await
    }

    /// Lists owned by a user, newest first.
    pub async fn owned_by(&self, owner_id: Uuid) -> Result<Vec<ShoppingList>, sqlx::Error> {
        let rows: Vec<ListRow> = sqlx::query_as(
            "SELECT * FROM shopping_lists WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ListRow::into_list).collect()
    }

    /// Lists whose id is in `ids`, newest first.
    pub async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<ShoppingList>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM shopping_lists WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY created_at DESC, rowid DESC");

        let rows: Vec<ListRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ListRow::into_list).collect()
    }

    /// Replaces the list note and stamps the list as updated by `actor`.
    pub async fn update_note(
        &self,
        id: Uuid,
        note: Option<&str>,
        actor: &Actor,
    ) -> Result<ShoppingList, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE shopping_lists SET note = ? WHERE id = ?")
            .bind(note)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        touch(&mut *tx, id, actor).await?;

        let updated = fetch_list(&mut *tx, id).await?.ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        self.feed.publish(ChangeEvent::new(
            ChangeKind::Update,
            Record::List(updated.clone()),
            Some(&actor.email),
        ));

        Ok(updated)
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shopping_lists")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub(crate) async fn fetch_list(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<ShoppingList>, sqlx::Error> {
    let row: Option<ListRow> = sqlx::query_as("SELECT * FROM shopping_lists WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(ListRow::into_list).transpose()
}

/// Stamps `updated_at` / `updated_by_email`. Runs inside the caller's
/// transaction so the stamp commits together with the mutation.
pub(crate) async fn touch(
    conn: &mut SqliteConnection,
    id: Uuid,
    actor: &Actor,
) -> Result<(), sqlx::Error> {
    let result =
        sqlx::query("UPDATE shopping_lists SET updated_at = ?, updated_by_email = ? WHERE id = ?")
            .bind(timestamp(&Utc::now()))
            .bind(&actor.email)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{create_user, setup_store};
    use crate::feed::{Notification, Table, Topic};
    use crate::models::ShoppingList;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_create_and_get_list() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;

        let list = ShoppingList::new("Groceries", &owner).with_note("Saturday");
        let created = db.store.lists.create(&list).await.unwrap();

        assert_eq!(created.name, "Groceries");
        assert_eq!(created.note.as_deref(), Some("Saturday"));
        assert_eq!(created.owner_email, "a@x.com");

        let fetched = db.store.lists.get(list.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_get_missing_list() {
        let db = setup_store().await;
        assert!(db.store.lists.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owned_by_newest_first() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        let other = create_user(&db.store, "b@x.com").await;

        db.store
            .lists
            .create(&ShoppingList::new("First", &owner))
            .await
            .unwrap();
        db.store
            .lists
            .create(&ShoppingList::new("Second", &owner))
            .await
            .unwrap();
        db.store
            .lists
            .create(&ShoppingList::new("Not mine", &other))
            .await
            .unwrap();

        let lists = db.store.lists.owned_by(owner.user_id).await.unwrap();
        let names: Vec<&str> = lists.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_by_ids() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;

        let a = db
            .store
            .lists
            .create(&ShoppingList::new("A", &owner))
            .await
            .unwrap();
        db.store
            .lists
            .create(&ShoppingList::new("B", &owner))
            .await
            .unwrap();

        let found = db.store.lists.by_ids(&[a.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        assert!(db.store.lists.by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_note_stamps_and_publishes() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        let editor = create_user(&db.store, "b@x.com").await;
        let list = db
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner))
            .await
            .unwrap();

        let mut sub = db.store.feed().subscribe(Topic::row(Table::Lists, list.id));

        let updated = db
            .store
            .lists
            .update_note(list.id, Some("Buy early"), &editor)
            .await
            .unwrap();

        assert_eq!(updated.note.as_deref(), Some("Buy early"));
        assert_eq!(updated.updated_by_email.as_deref(), Some("b@x.com"));
        assert!(updated.updated_at >= list.updated_at);

        match sub.try_recv() {
            Some(Notification::Change(event)) => {
                assert_eq!(event.actor_email.as_deref(), Some("b@x.com"))
            }
            other => panic!("expected change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_note_missing_list() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;

        let result = db
            .store
            .lists
            .update_note(Uuid::new_v4(), None, &owner)
            .await;
        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_count() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        assert_eq!(db.store.lists.count().await.unwrap(), 0);

        db.store
            .lists
            .create(&ShoppingList::new("A", &owner))
            .await
            .unwrap();
        assert_eq!(db.store.lists.count().await.unwrap(), 1);
    }
}
