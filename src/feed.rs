//! Row-level change feed.
//!
//! Every committed write publishes a [`ChangeEvent`]. Subscribers listen on a
//! [`Topic`]: a table, optionally narrowed to one row id or one parent list.
//! Each topic is backed by its own broadcast channel, created on first
//! subscribe and removed once the last [`Subscription`] is dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Item, Share, ShoppingList};

/// Buffered events per topic before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Lists,
    Items,
    Shares,
}

/// Row filter for a scoped topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// `id = eq.<uuid>`
    Id(Uuid),
    /// `list_id = eq.<uuid>`
    ListId(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub table: Table,
    pub filter: Option<Filter>,
}

impl Topic {
    /// Every change on a table.
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filter: None,
        }
    }

    /// Changes on one row.
    pub fn row(table: Table, id: Uuid) -> Self {
        Self {
            table,
            filter: Some(Filter::Id(id)),
        }
    }

    /// Changes on rows belonging to one list.
    pub fn in_list(table: Table, list_id: Uuid) -> Self {
        Self {
            table,
            filter: Some(Filter::ListId(list_id)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The row a change carries. For deletes this is the removed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum Record {
    List(ShoppingList),
    Item(Item),
    Share(Share),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::List(_) => Table::Lists,
            Record::Item(_) => Table::Items,
            Record::Share(_) => Table::Shares,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::List(l) => l.id,
            Record::Item(i) => i.id,
            Record::Share(s) => s.id,
        }
    }

    /// Parent list of the row. A list row is its own parent.
    pub fn list_id(&self) -> Uuid {
        match self {
            Record::List(l) => l.id,
            Record::Item(i) => i.list_id,
            Record::Share(s) => s.list_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: Record,
    /// Email of whoever made the change, when known.
    pub actor_email: Option<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record: Record, actor_email: Option<&str>) -> Self {
        Self {
            kind,
            record,
            actor_email: actor_email.map(str::to_string),
        }
    }

    pub fn table(&self) -> Table {
        self.record.table()
    }

    /// True when the change was made by someone other than `email`.
    pub fn is_foreign_to(&self, email: &str) -> bool {
        self.actor_email
            .as_deref()
            .is_some_and(|actor| !actor.eq_ignore_ascii_case(email))
    }

    /// Topics this event is delivered to.
    fn topics(&self) -> [Topic; 3] {
        let table = self.table();
        [
            Topic::table(table),
            Topic::row(table, self.record.id()),
            Topic::in_list(table, self.record.list_id()),
        ]
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Change(ChangeEvent),
    /// The receiver fell behind and missed this many events. Treat as
    /// "something changed" and refetch.
    Lagged(u64),
}

/// Hub of topic channels.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    channels: RwLock<HashMap<Topic, broadcast::Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes to a topic. The returned guard unsubscribes when dropped.
    pub fn subscribe(self: &Arc<Self>, topic: Topic) -> Subscription {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let rx = match channels.get(&topic) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, rx) = broadcast::channel(CHANNEL_CAPACITY);
                channels.insert(topic, sender);
                rx
            }
        };

        tracing::debug!(?topic, "subscribed");

        Subscription {
            topic,
            rx: Some(rx),
            feed: Arc::downgrade(self),
        }
    }

    /// Publishes a change to every matching topic.
    ///
    /// Returns the number of receivers it reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        for topic in event.topics() {
            if let Some(sender) = channels.get(&topic) {
                // Err only means nobody is listening right now
                delivered += sender.send(event.clone()).unwrap_or(0);
            }
        }
        delivered
    }

    /// Number of topics with at least one live subscription.
    pub fn topic_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, topic: &Topic) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if channels
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(topic);
            tracing::debug!(?topic, "topic released");
        }
    }
}

/// A live subscription to one topic.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: Option<broadcast::Receiver<ChangeEvent>>,
    feed: Weak<ChangeFeed>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Waits for the next notification. Returns `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Ok(event) => Some(Notification::Change(event)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Notification::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Notification> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(event) => Some(Notification::Change(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Notification::Lagged(n)),
            Err(_) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver must be gone before the count check in release()
        drop(self.rx.take());
        if let Some(feed) = self.feed.upgrade() {
            feed.release(&self.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Actor;

    fn list_event(list: &ShoppingList, actor: &str) -> ChangeEvent {
        ChangeEvent::new(ChangeKind::Update, Record::List(list.clone()), Some(actor))
    }

    fn sample_list() -> ShoppingList {
        ShoppingList::new("Groceries", &Actor::new(Uuid::new_v4(), "a@x.com"))
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let feed = ChangeFeed::new();
        let list = sample_list();

        let mut sub = feed.subscribe(Topic::row(Table::Lists, list.id));
        feed.publish(list_event(&list, "a@x.com"));

        match sub.recv().await {
            Some(Notification::Change(event)) => {
                assert_eq!(event.record.id(), list.id);
                assert_eq!(event.kind, ChangeKind::Update);
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[test]
    fn test_scoped_topics_are_isolated() {
        let feed = ChangeFeed::new();
        let list_a = sample_list();
        let list_b = sample_list();

        let mut sub_a = feed.subscribe(Topic::row(Table::Lists, list_a.id));
        let mut sub_b = feed.subscribe(Topic::row(Table::Lists, list_b.id));
        let mut all = feed.subscribe(Topic::table(Table::Lists));

        feed.publish(list_event(&list_a, "a@x.com"));

        assert!(sub_a.try_recv().is_some());
        assert!(sub_b.try_recv().is_none());
        assert!(all.try_recv().is_some());
    }

    #[test]
    fn test_item_events_reach_list_scoped_topic() {
        let feed = ChangeFeed::new();
        let actor = Actor::new(Uuid::new_v4(), "a@x.com");
        let list = ShoppingList::new("Groceries", &actor);
        let item = Item::new(list.id, "Milk", &actor);

        let mut items = feed.subscribe(Topic::in_list(Table::Items, list.id));
        let mut lists = feed.subscribe(Topic::table(Table::Lists));

        feed.publish(ChangeEvent::new(
            ChangeKind::Insert,
            Record::Item(item),
            Some("a@x.com"),
        ));

        assert!(items.try_recv().is_some());
        assert!(lists.try_recv().is_none());
    }

    #[test]
    fn test_drop_releases_topic() {
        let feed = ChangeFeed::new();
        let topic = Topic::table(Table::Items);

        let first = feed.subscribe(topic);
        let second = feed.subscribe(topic);
        assert_eq!(feed.topic_count(), 1);

        drop(first);
        assert_eq!(feed.topic_count(), 1);

        drop(second);
        assert_eq!(feed.topic_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.publish(list_event(&sample_list(), "a@x.com")), 0);
    }

    #[test]
    fn test_lagged_receiver_reports_gap() {
        let feed = ChangeFeed::new();
        let list = sample_list();
        let mut sub = feed.subscribe(Topic::table(Table::Lists));

        for _ in 0..CHANNEL_CAPACITY + 3 {
            feed.publish(list_event(&list, "a@x.com"));
        }

        assert_eq!(sub.try_recv(), Some(Notification::Lagged(3)));
    }

    #[test]
    fn test_is_foreign_to() {
        let event = list_event(&sample_list(), "a@x.com");
        assert!(!event.is_foreign_to("A@x.com"));
        assert!(event.is_foreign_to("b@x.com"));

        let anonymous = ChangeEvent::new(ChangeKind::Delete, event.record.clone(), None);
        assert!(!anonymous.is_foreign_to("b@x.com"));
    }
}
