use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::list_repo::{fetch_list, touch};
use super::{parse_timestamp, parse_uuid, timestamp};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, Record};
use crate::models::{Actor, Item};

/// Item repository.
///
/// Every mutation stamps the parent list in the same transaction and then
/// publishes two events: one for the item and one for the list.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
    feed: Arc<ChangeFeed>,
}

/// Fields an edit may change.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub name: String,
    pub note: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    list_id: String,
    name: String,
    note: Option<String>,
    checked: bool,
    added_by: String,
    added_by_email: String,
    created_at: String,
}

impl ItemRow {
    fn into_item(self) -> Result<Item, sqlx::Error> {
        Ok(Item {
            id: parse_uuid(&self.id)?,
            list_id: parse_uuid(&self.list_id)?,
            name: self.name,
            note: self.note,
            checked: self.checked,
            added_by: parse_uuid(&self.added_by)?,
            added_by_email: self.added_by_email,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl ItemRepository {
    pub fn new(pool: SqlitePool, feed: Arc<ChangeFeed>) -> Self {
        Self { pool, feed }
    }

    /// Items of a list in creation order.
    pub async fn for_list(&self, list_id: Uuid) -> Result<Vec<Item>, sqlx::Error> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT * FROM shopping_list_items WHERE list_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(list_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    pub async fn get(&self, list_id: Uuid, id: Uuid) -> Result<Option<Item>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_item(&mut *conn, list_id, id).await
    }

    pub async fn add(&self, item: &Item, actor: &Actor) -> Result<Item, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO shopping_list_items (id, list_id, name, note, checked, added_by, added_by_email, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.list_id.to_string())
        .bind(&item.name)
        .bind(&item.note)
        .bind(item.checked)
        .bind(item.added_by.to_string())
        .bind(&item.added_by_email)
        .bind(timestamp(&item.created_at))
        .execute(&mut *tx)
        .await?;

        let created = fetch_item(&mut *tx, item.list_id, item.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        self.commit_with_touch(tx, ChangeKind::Insert, created, actor)
            .await
    }

    /// Flips the checked flag.
    pub async fn toggle(&self, list_id: Uuid, id: Uuid, actor: &Actor) -> Result<Item, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE shopping_list_items SET checked = NOT checked WHERE id = ? AND list_id = ?",
        )
        .bind(id.to_string())
        .bind(list_id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let updated = fetch_item(&mut *tx, list_id, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        self.commit_with_touch(tx, ChangeKind::Update, updated, actor)
            .await
    }

    pub async fn update(
        &self,
        list_id: Uuid,
        id: Uuid,
        update: &ItemUpdate,
        actor: &Actor,
    ) -> Result<Item, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE shopping_list_items SET name = ?, note = ? WHERE id = ? AND list_id = ?",
        )
        .bind(&update.name)
        .bind(&update.note)
        .bind(id.to_string())
        .bind(list_id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let updated = fetch_item(&mut *tx, list_id, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        self.commit_with_touch(tx, ChangeKind::Update, updated, actor)
            .await
    }

    /// Deletes an item and returns the removed row.
    pub async fn delete(&self, list_id: Uuid, id: Uuid, actor: &Actor) -> Result<Item, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let removed = fetch_item(&mut *tx, list_id, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        sqlx::query("DELETE FROM shopping_list_items WHERE id = ? AND list_id = ?")
            .bind(id.to_string())
            .bind(list_id.to_string())
            .execute(&mut *tx)
            .await?;

        self.commit_with_touch(tx, ChangeKind::Delete, removed, actor)
            .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shopping_list_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Stamps the parent list, commits, then publishes the item and list
    /// events.
    async fn commit_with_touch(
        &self,
        mut tx: sqlx::Transaction<'static, sqlx::Sqlite>,
        kind: ChangeKind,
        item: Item,
        actor: &Actor,
    ) -> Result<Item, sqlx::Error> {
        touch(&mut *tx, item.list_id, actor).await?;
        let list = fetch_list(&mut *tx, item.list_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        tx.commit().await?;

        self.feed.publish(ChangeEvent::new(
            kind,
            Record::Item(item.clone()),
            Some(&actor.email),
        ));
        self.feed.publish(ChangeEvent::new(
            ChangeKind::Update,
            Record::List(list),
            Some(&actor.email),
        ));

        tracing::debug!(item = %item.id, list = %item.list_id, ?kind, "item mutation committed");

        Ok(item)
    }
}

async fn fetch_item(
    conn: &mut SqliteConnection,
    list_id: Uuid,
    id: Uuid,
) -> Result<Option<Item>, sqlx::Error> {
    let row: Option<ItemRow> =
        sqlx::query_as("SELECT * FROM shopping_list_items WHERE id = ? AND list_id = ?")
            .bind(id.to_string())
            .bind(list_id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

    row.map(ItemRow::into_item).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{create_user, setup_store};
    use crate::feed::{Notification, Table, Topic};
    use crate::models::ShoppingList;

    #[tokio::test]
    async fn test_add_and_list_in_creation_order() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        let list = db
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner))
            .await
            .unwrap();

        for name in ["Milk", "Bread", "Eggs"] {
            db.store
                .items
                .add(&Item::new(list.id, name, &owner), &owner)
                .await
                .unwrap();
        }

        let items = db.store.items.for_list(list.id).await.unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Bread", "Eggs"]);
        assert!(items.iter().all(|i| i.added_by_email == "a@x.com"));
    }

    #[tokio::test]
    async fn test_each_mutation_touches_list_once() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        let editor = create_user(&db.store, "b@x.com").await;
        let list = db
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner))
            .await
            .unwrap();

        let mut list_events = db.store.feed().subscribe(Topic::row(Table::Lists, list.id));
        let mut item_events = db
            .store
            .feed()
            .subscribe(Topic::in_list(Table::Items, list.id));

        let item = db
            .store
            .items
            .add(&Item::new(list.id, "Milk", &editor), &editor)
            .await
            .unwrap();
        db.store.items.toggle(list.id, item.id, &editor).await.unwrap();
        db.store
            .items
            .update(
                list.id,
                item.id,
                &ItemUpdate {
                    name: "Oat milk".into(),
                    note: Some("2 l".into()),
                },
                &editor,
            )
            .await
            .unwrap();
        db.store.items.delete(list.id, item.id, &editor).await.unwrap();

        let mut list_updates = 0;
        while let Some(Notification::Change(event)) = list_events.try_recv() {
            assert_eq!(event.actor_email.as_deref(), Some("b@x.com"));
            list_updates += 1;
        }
        let mut item_changes = 0;
        while item_events.try_recv().is_some() {
            item_changes += 1;
        }

        assert_eq!(item_changes, 4);
        assert_eq!(list_updates, 4);

        let stamped = db.store.lists.get(list.id).await.unwrap().unwrap();
        assert_eq!(stamped.updated_by_email.as_deref(), Some("b@x.com"));
    }

    #[tokio::test]
    async fn test_toggle_flips_checked() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        let list = db
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner))
            .await
            .unwrap();
        let item = db
            .store
            .items
            .add(&Item::new(list.id, "Milk", &owner), &owner)
            .await
            .unwrap();

        let toggled = db.store.items.toggle(list.id, item.id, &owner).await.unwrap();
        assert!(toggled.checked);
        let toggled = db.store.items.toggle(list.id, item.id, &owner).await.unwrap();
        assert!(!toggled.checked);
    }

    #[tokio::test]
    async fn test_mutation_scoped_to_list() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;
        let list = db
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner))
            .await
            .unwrap();
        let other = db
            .store
            .lists
            .create(&ShoppingList::new("Hardware", &owner))
            .await
            .unwrap();
        let item = db
            .store
            .items
            .add(&Item::new(list.id, "Milk", &owner), &owner)
            .await
            .unwrap();

        let result = db.store.items.delete(other.id, item.id, &owner).await;
        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
        assert!(db.store.items.get(list.id, item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_to_missing_list_rolls_back() {
        let db = setup_store().await;
        let owner = create_user(&db.store, "a@x.com").await;

        let result = db
            .store
            .items
            .add(&Item::new(Uuid::new_v4(), "Milk", &owner), &owner)
            .await;

        // foreign key violation
        assert!(result.is_err());
        assert_eq!(db.store.items.count().await.unwrap(), 0);
    }
}
