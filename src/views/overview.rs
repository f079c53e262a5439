use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{required, AppContext, ViewError};
use crate::auth::Session;
use crate::feed::{Subscription, Table, Topic};
use crate::models::ShoppingList;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewEntry {
    pub list: ShoppingList,
    pub owned: bool,
}

/// Every list a user owns or has joined. Owned lists come first, newest
/// first within each group.
#[derive(Debug)]
pub struct ListsOverview {
    ctx: AppContext,
    session: Session,
    entries: Vec<OverviewEntry>,
}

impl ListsOverview {
    pub async fn load(ctx: &AppContext, session: &Session) -> Result<Self, ViewError> {
        let mut overview = Self {
            ctx: ctx.clone(),
            session: session.clone(),
            entries: Vec::new(),
        };
        overview.refresh().await?;
        Ok(overview)
    }

    pub fn entries(&self) -> &[OverviewEntry] {
        &self.entries
    }

    pub async fn refresh(&mut self) -> Result<(), ViewError> {
        let store = &self.ctx.store;

        let owned = store.lists.owned_by(self.session.user_id).await?;
        let joined_ids = store.shares.accepted_list_ids(self.session.user_id).await?;
        let joined = store.lists.by_ids(&joined_ids).await?;

        let mut seen = HashSet::new();
        self.entries = owned
            .into_iter()
            .map(|list| (list, true))
            .chain(joined.into_iter().map(|list| (list, false)))
            .filter(|(list, _)| seen.insert(list.id))
            .map(|(list, owned)| OverviewEntry { list, owned })
            .collect();
        Ok(())
    }

    /// Creates a list owned by the session user.
    pub async fn create_list(&mut self, name: &str) -> Result<ShoppingList, ViewError> {
        let name = required("name", name)?;
        let list = ShoppingList::new(name, &self.session.actor());
        let created = self.ctx.store.lists.create(&list).await?;

        tracing::info!(list = %created.id, owner = %created.owner_email, "list created");
        self.refresh().await?;
        Ok(created)
    }

    pub fn watch(&self) -> OverviewWatch {
        let feed = self.ctx.store.feed();
        OverviewWatch {
            lists: feed.subscribe(Topic::table(Table::Lists)),
            shares: feed.subscribe(Topic::table(Table::Shares)),
        }
    }
}

/// Unscoped subscriptions backing a [`ListsOverview`].
#[derive(Debug)]
pub struct OverviewWatch {
    lists: Subscription,
    shares: Subscription,
}

impl OverviewWatch {
    /// Resolves when anything that may affect the overview changed. `None`
    /// once the feed is gone.
    pub async fn next(&mut self) -> Option<()> {
        tokio::select! {
            n = self.lists.recv() => n.map(|_| ()),
            n = self.shares.recv() => n.map(|_| ()),
        }
    }
}
