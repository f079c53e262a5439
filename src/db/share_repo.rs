use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_optional_timestamp, parse_timestamp, parse_uuid, timestamp};
use crate::auth::generate_token;
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, Record};
use crate::models::{Actor, Role, Share};

#[derive(Debug, Clone)]
pub struct ShareRepository {
    pool: SqlitePool,
    feed: Arc<ChangeFeed>,
}

/// Result of claiming a share token.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    /// The share was unclaimed and is now stamped with the visitor.
    Accepted(Share),
    /// The visitor already holds an accepted share on this list. Nothing changed.
    AlreadyAccepted(Share),
    /// The link was claimed by someone else. The visitor got their own
    /// accepted share with the same role.
    Joined(Share),
    /// The token belongs to an invitation addressed to another email.
    InviteMismatch { invited_email: String },
}

impl AcceptOutcome {
    pub fn share(&self) -> Option<&Share> {
        match self {
            AcceptOutcome::Accepted(s)
            | AcceptOutcome::AlreadyAccepted(s)
            | AcceptOutcome::Joined(s) => Some(s),
            AcceptOutcome::InviteMismatch { .. } => None,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    id: String,
    list_id: String,
    share_token: Option<String>,
    role: String,
    invited_email: Option<String>,
    accepted_by: Option<String>,
    accepted_email: Option<String>,
    accepted_at: Option<String>,
    created_at: String,
}

impl ShareRow {
    fn into_share(self) -> Result<Share, sqlx::Error> {
        Ok(Share {
            id: parse_uuid(&self.id)?,
            list_id: parse_uuid(&self.list_id)?,
            share_token: self.share_token,
            role: self
                .role
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            invited_email: self.invited_email,
            accepted_by: self.accepted_by.as_deref().map(parse_uuid).transpose()?,
            accepted_email: self.accepted_email,
            accepted_at: parse_optional_timestamp(self.accepted_at.as_deref())?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl ShareRepository {
    pub fn new(pool: SqlitePool, feed: Arc<ChangeFeed>) -> Self {
        Self { pool, feed }
    }

    /// All shares of a list in creation order.
    pub async fn for_list(&self, list_id: Uuid) -> Result<Vec<Share>, sqlx::Error> {
        let rows: Vec<ShareRow> = sqlx::query_as(
            "SELECT * FROM shopping_list_shares WHERE list_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(list_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ShareRow::into_share).collect()
    }

    pub async fn by_token(&self, token: &str) -> Result<Option<Share>, sqlx::Error> {
        let row: Option<ShareRow> =
            sqlx::query_as("SELECT * FROM shopping_list_shares WHERE share_token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        row.map(ShareRow::into_share).transpose()
    }

    /// Ids of lists the user has accepted a share for.
    pub async fn accepted_list_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT list_id FROM shopping_list_shares WHERE accepted_by = ?",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    /// Returns the list's link share, minting one when none exists yet.
    ///
    /// The oldest link share is reused whether or not it has been claimed, so
    /// a list never has more than one link.
    pub async fn ensure_link(&self, list_id: Uuid, actor: &Actor) -> Result<Share, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<ShareRow> = sqlx::query_as(
            r#"
            SELECT * FROM shopping_list_shares
            WHERE list_id = ? AND invited_email IS NULL AND share_token IS NOT NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
            "#,
        )
        .bind(list_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            return row.into_share();
        }

        let share = Share::link(list_id, generate_token(), Role::Viewer);
        insert(&mut *tx, &share).await?;
        tx.commit().await?;

        tracing::info!(list = %list_id, "minted share link");
        self.publish(ChangeKind::Insert, &share, actor);
        Ok(share)
    }

    /// Creates an invitation for `email` with its own token.
    pub async fn invite(
        &self,
        list_id: Uuid,
        email: &str,
        role: Role,
        actor: &Actor,
    ) -> Result<Share, sqlx::Error> {
        let share = Share::invitation(list_id, generate_token(), email, role);

        let mut conn = self.pool.acquire().await?;
        insert(&mut *conn, &share).await?;

        self.publish(ChangeKind::Insert, &share, actor);
        Ok(share)
    }

    /// Claims a share token for `actor`.
    ///
    /// Acceptance is monotonic: acceptance fields are only ever written on a
    /// row that has none, so repeating the claim cannot move `accepted_at`
    /// or clear anything. Returns `None` for an unknown token.
    pub async fn accept(
        &self,
        token: &str,
        actor: &Actor,
    ) -> Result<Option<AcceptOutcome>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(share) = fetch_by_token(&mut *tx, token).await? else {
            return Ok(None);
        };

        if let Some(invited) = &share.invited_email {
            if !invited.eq_ignore_ascii_case(&actor.email) {
                return Ok(Some(AcceptOutcome::InviteMismatch {
                    invited_email: invited.clone(),
                }));
            }
        }

        if share.accepted_by == Some(actor.user_id) || share.accepted_by_email(&actor.email) {
            return Ok(Some(AcceptOutcome::AlreadyAccepted(share)));
        }

        if !share.is_accepted() {
            let result = sqlx::query(
                r#"
                UPDATE shopping_list_shares
                SET accepted_by = ?, accepted_email = ?, accepted_at = ?
                WHERE id = ? AND accepted_at IS NULL
                "#,
            )
            .bind(actor.user_id.to_string())
            .bind(&actor.email)
            .bind(timestamp(&Utc::now()))
            .bind(share.id.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                let accepted = fetch_by_id(&mut *tx, share.id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                tx.commit().await?;

                self.publish(ChangeKind::Update, &accepted, actor);
                return Ok(Some(AcceptOutcome::Accepted(accepted)));
            }
        }

        // Someone else holds this link. Reuse the visitor's own share on the
        // list if there is one, otherwise give them a row of their own.
        let own: Option<ShareRow> = sqlx::query_as(
            "SELECT * FROM shopping_list_shares WHERE list_id = ? AND accepted_by = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(share.list_id.to_string())
        .bind(actor.user_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = own {
            return Ok(Some(AcceptOutcome::AlreadyAccepted(row.into_share()?)));
        }

        let mut joined = Share::link(share.list_id, String::new(), share.role);
        joined.share_token = None;
        joined.accepted_by = Some(actor.user_id);
        joined.accepted_email = Some(actor.email.clone());
        joined.accepted_at = Some(Utc::now());

        insert(&mut *tx, &joined).await?;
        let joined = fetch_by_id(&mut *tx, joined.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        self.publish(ChangeKind::Insert, &joined, actor);
        Ok(Some(AcceptOutcome::Joined(joined)))
    }

    pub async fn set_role(
        &self,
        list_id: Uuid,
        id: Uuid,
        role: Role,
        actor: &Actor,
    ) -> Result<Share, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE shopping_list_shares SET role = ? WHERE id = ? AND list_id = ?")
                .bind(role.as_str())
                .bind(id.to_string())
                .bind(list_id.to_string())
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let updated = fetch_by_id(&mut *tx, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        self.publish(ChangeKind::Update, &updated, actor);
        Ok(updated)
    }

    /// Removes a share and returns the deleted row.
    pub async fn delete(&self, list_id: Uuid, id: Uuid, actor: &Actor) -> Result<Share, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let removed = fetch_by_id(&mut *tx, id)
            .await?
            .filter(|s| s.list_id == list_id)
            .ok_or(sqlx::Error::RowNotFound)?;

        sqlx::query("DELETE FROM shopping_list_shares WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.publish(ChangeKind::Delete, &removed, actor);
        Ok(removed)
    }

    fn publish(&self, kind: ChangeKind, share: &Share, actor: &Actor) {
        self.feed.publish(ChangeEvent::new(
            kind,
            Record::Share(share.clone()),
            Some(&actor.email),
        ));
    }
}

async fn insert(conn: &mut SqliteConnection, share: &Share) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO shopping_list_shares (id, list_id, share_token, role, invited_email, accepted_by, accepted_email, accepted_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(share.id.to_string())
    .bind(share.list_id.to_string())
    .bind(&share.share_token)
    .bind(share.role.as_str())
    .bind(&share.invited_email)
    .bind(share.accepted_by.map(|id| id.to_string()))
    .bind(&share.accepted_email)
    .bind(share.accepted_at.as_ref().map(timestamp))
    .bind(timestamp(&share.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Share>, sqlx::Error> {
    let row: Option<ShareRow> = sqlx::query_as("SELECT * FROM shopping_list_shares WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(ShareRow::into_share).transpose()
}

async fn fetch_by_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<Option<Share>, sqlx::Error> {
    let row: Option<ShareRow> =
        sqlx::query_as("SELECT * FROM shopping_list_shares WHERE share_token = ?")
            .bind(token)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(ShareRow::into_share).transpose()
}
