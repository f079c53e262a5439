use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::user::Actor;

/// A single entry on a shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub list_id: Uuid,
    pub name: String,
    pub note: Option<String>,
    pub checked: bool,
    pub added_by: Uuid,
    pub added_by_email: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(list_id: Uuid, name: impl Into<String>, added_by: &Actor) -> Self {
        Self {
            id: Uuid::new_v4(),
            list_id,
            name: name.into(),
            note: None,
            checked: false,
            added_by: added_by.user_id,
            added_by_email: added_by.email.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note.filter(|n| !n.trim().is_empty());
        self
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.checked { "x" } else { " " };
        write!(f, "[{}] {}", mark, self.name)?;
        if let Some(note) = &self.note {
            write!(f, " ({})", note)?;
        }
        write!(f, " added by {}", self.added_by_email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_note_is_dropped() {
        let actor = Actor::new(Uuid::new_v4(), "a@x.com");
        let item = Item::new(Uuid::new_v4(), "Milk", &actor).with_note(Some("  ".into()));
        assert!(item.note.is_none());

        let item = Item::new(Uuid::new_v4(), "Milk", &actor).with_note(Some("2 l".into()));
        assert_eq!(item.note.as_deref(), Some("2 l"));
    }

    #[test]
    fn test_item_display() {
        let actor = Actor::new(Uuid::new_v4(), "a@x.com");
        let mut item = Item::new(Uuid::new_v4(), "Bread", &actor);
        assert_eq!(item.to_string(), "[ ] Bread added by a@x.com");
        item.checked = true;
        assert!(item.to_string().starts_with("[x] Bread"));
    }
}
