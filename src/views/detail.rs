//! The list detail screen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{optional, required, AppContext, Notice, ViewError};
use crate::access::{effective_role, resolve_role, Capabilities};
use crate::auth::{validate, Session};
use crate::db::ItemUpdate;
use crate::feed::{Notification, Subscription, Table, Topic};
use crate::models::{Actor, Item, Role, Share, ShoppingList};

/// One list as seen by one user.
///
/// Holds the last fetched list row, its items and its shares. The role is
/// derived from those on every call to [`ListDetail::role`].
#[derive(Debug)]
pub struct ListDetail {
    ctx: AppContext,
    session: Session,
    list: ShoppingList,
    items: Vec<Item>,
    shares: Vec<Share>,
}

/// Serializable state of a [`ListDetail`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub list: ShoppingList,
    pub items: Vec<Item>,
    pub role: Role,
    pub capabilities: Capabilities,
    /// Empty unless the viewer may manage shares.
    pub shares: Vec<Share>,
}

impl ListDetail {
    /// Loads a list for `session`. Users with no relationship to the list
    /// get [`ViewError::AccessDenied`].
    pub async fn open(
        ctx: &AppContext,
        session: &Session,
        list_id: Uuid,
    ) -> Result<Self, ViewError> {
        let list = ctx
            .store
            .lists
            .get(list_id)
            .await?
            .ok_or(ViewError::NotFound)?;
        let shares = ctx.store.shares.for_list(list_id).await?;

        if effective_role(&session.email, &list, &shares).is_none() {
            tracing::debug!(list = %list_id, email = %session.email, "list access denied");
            return Err(ViewError::AccessDenied);
        }

        let items = ctx.store.items.for_list(list_id).await?;

        Ok(Self {
            ctx: ctx.clone(),
            session: session.clone(),
            list,
            items,
            shares,
        })
    }

    pub fn list(&self) -> &ShoppingList {
        &self.list
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Every share of the list, regardless of the viewer's role.
    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    pub fn role(&self) -> Role {
        resolve_role(&self.session.email, &self.list, &self.shares)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_role(self.role())
    }

    pub fn snapshot(&self) -> ListSnapshot {
        let role = self.role();
        let capabilities = Capabilities::for_role(role);
        ListSnapshot {
            list: self.list.clone(),
            items: self.items.clone(),
            role,
            capabilities,
            shares: if capabilities.manage_shares {
                self.shares.clone()
            } else {
                Vec::new()
            },
        }
    }

    pub async fn add_item(&mut self, name: &str, note: Option<&str>) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.add_item)?;
        let name = required("name", name)?;

        let item = Item::new(self.list.id, name, &actor).with_note(optional(note));
        let added = self.ctx.store.items.add(&item, &actor).await?;

        self.refresh_items().await?;
        self.refresh_list().await?;
        Ok(Notice::success(format!("Added: {}", added.name)))
    }

    pub async fn toggle_item(&mut self, item_id: Uuid) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.toggle_item)?;
        let item = self
            .ctx
            .store
            .items
            .toggle(self.list.id, item_id, &actor)
            .await?;

        self.refresh_items().await?;
        self.refresh_list().await?;

        let verb = if item.checked { "Checked" } else { "Unchecked" };
        Ok(Notice::info(format!("{}: {}", verb, item.name)))
    }

    pub async fn edit_item(
        &mut self,
        item_id: Uuid,
        name: &str,
        note: Option<&str>,
    ) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.edit_item)?;
        let update = ItemUpdate {
            name: required("name", name)?,
            note: optional(note),
        };

        self.ctx
            .store
            .items
            .update(self.list.id, item_id, &update, &actor)
            .await?;

        self.refresh_items().await?;
        self.refresh_list().await?;
        Ok(Notice::info("Item updated"))
    }

    pub async fn delete_item(&mut self, item_id: Uuid) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.delete_item)?;
        self.ctx
            .store
            .items
            .delete(self.list.id, item_id, &actor)
            .await?;

        self.refresh_items().await?;
        self.refresh_list().await?;
        Ok(Notice::info("Item deleted"))
    }

    /// Replaces the list note. A blank note clears it.
    pub async fn update_note(&mut self, note: Option<&str>) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.edit_note)?;
        let note = optional(note);

        self.list = self
            .ctx
            .store
            .lists
            .update_note(self.list.id, note.as_deref(), &actor)
            .await?;
        Ok(Notice::success("Note saved"))
    }

    /// Returns the list's capability link, minting it on first use.
    pub async fn share(&mut self) -> Result<String, ViewError> {
        let actor = self.require(|c| c.share)?;
        let share = self.ctx.store.shares.ensure_link(self.list.id, &actor).await?;
        self.refresh_shares().await?;

        let token = share.share_token.ok_or(ViewError::NotFound)?;
        Ok(self.ctx.share_link(&token))
    }

    /// Invites `email` with `role` and returns the invitation link.
    ///
    /// The link is also mailed when SMTP is configured. A mail failure is
    /// logged and the invitation stands.
    pub async fn invite(&mut self, email: &str, role: Role) -> Result<String, ViewError> {
        let actor = self.require(|c| c.share)?;
        let email = validate::email(email)?;

        let share = self
            .ctx
            .store
            .shares
            .invite(self.list.id, &email, role, &actor)
            .await?;
        self.refresh_shares().await?;

        let token = share.share_token.ok_or(ViewError::NotFound)?;
        let link = self.ctx.share_link(&token);

        if let Some(mailer) = self.ctx.identity.mailer() {
            if let Err(e) = mailer
                .send_invitation(&email, &actor.email, &self.list.name, role, &link)
                .await
            {
                tracing::warn!(%email, error = %e, "failed to mail invitation");
            }
        }

        tracing::info!(list = %self.list.id, %email, %role, "invitation created");
        Ok(link)
    }

    pub async fn change_role(&mut self, share_id: Uuid, role: Role) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.manage_shares)?;
        self.ctx
            .store
            .shares
            .set_role(self.list.id, share_id, role, &actor)
            .await?;

        self.refresh_shares().await?;
        Ok(Notice::success("Role changed"))
    }

    pub async fn remove_share(&mut self, share_id: Uuid) -> Result<Notice, ViewError> {
        let actor = self.require(|c| c.manage_shares)?;
        self.ctx
            .store
            .shares
            .delete(self.list.id, share_id, &actor)
            .await?;

        self.refresh_shares().await?;
        Ok(Notice::info("User removed"))
    }

    /// Reloads the list, its items and its shares.
    pub async fn refresh(&mut self) -> Result<(), ViewError> {
        self.refresh_list().await?;
        self.refresh_items().await?;
        self.refresh_shares().await
    }

    pub async fn refresh_list(&mut self) -> Result<(), ViewError> {
        self.list = self
            .ctx
            .store
            .lists
            .get(self.list.id)
            .await?
            .ok_or(ViewError::NotFound)?;
        Ok(())
    }

    pub async fn refresh_items(&mut self) -> Result<(), ViewError> {
        self.items = self.ctx.store.items.for_list(self.list.id).await?;
        Ok(())
    }

    pub async fn refresh_shares(&mut self) -> Result<(), ViewError> {
        self.shares = self.ctx.store.shares.for_list(self.list.id).await?;
        Ok(())
    }

    /// Subscribes to changes of this list, its items and its shares.
    pub fn watch(&self) -> DetailWatch {
        let feed = self.ctx.store.feed();
        DetailWatch {
            viewer_email: self.session.email.clone(),
            list: feed.subscribe(Topic::row(Table::Lists, self.list.id)),
            items: feed.subscribe(Topic::in_list(Table::Items, self.list.id)),
            shares: feed.subscribe(Topic::in_list(Table::Shares, self.list.id)),
        }
    }

    /// Refetches whatever `update` says changed.
    pub async fn apply(&mut self, update: &DetailUpdate) -> Result<(), ViewError> {
        match update.entity {
            Entity::List => self.refresh_list().await,
            Entity::Items => self.refresh_items().await,
            Entity::Shares => self.refresh_shares().await,
        }
    }

    fn require(&self, allowed: impl Fn(&Capabilities) -> bool) -> Result<Actor, ViewError> {
        let role = effective_role(&self.session.email, &self.list, &self.shares)
            .ok_or(ViewError::AccessDenied)?;
        if !allowed(&Capabilities::for_role(role)) {
            return Err(ViewError::Forbidden(role));
        }
        Ok(self.session.actor())
    }
}

/// Which part of a list detail changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    List,
    Items,
    Shares,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailUpdate {
    pub entity: Entity,
    /// Set when someone other than the viewer made the change.
    pub notice: Option<Notice>,
}

/// Live subscriptions backing a [`ListDetail`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct DetailWatch {
    viewer_email: String,
    list: Subscription,
    items: Subscription,
    shares: Subscription,
}

impl DetailWatch {
    /// Waits for the next change. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<DetailUpdate> {
        let (entity, notification) = tokio::select! {
            n = self.list.recv() => (Entity::List, n?),
            n = self.items.recv() => (Entity::Items, n?),
            n = self.shares.recv() => (Entity::Shares, n?),
        };

        let notice = match &notification {
            Notification::Change(event) if event.is_foreign_to(&self.viewer_email) => {
                match entity {
                    Entity::Items => Some(Notice::info("List updated by another user")),
                    Entity::List => Some(Notice::info("List edited by another user")),
                    Entity::Shares => None,
                }
            }
            Notification::Change(_) => None,
            Notification::Lagged(missed) => {
                tracing::debug!(?entity, missed, "detail watch lagged");
                None
            }
        };

        Some(DetailUpdate { entity, notice })
    }
}
