use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::user::Actor;

/// A named shopping list owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: Uuid,
    pub name: String,
    pub note: Option<String>,
    pub owner_id: Uuid,
    pub owner_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by_email: Option<String>,
}

impl ShoppingList {
    pub fn new(name: impl Into<String>, owner: &Actor) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            note: None,
            owner_id: owner.user_id,
            owner_email: owner.email.clone(),
            created_at: now,
            updated_at: now,
            updated_by_email: Some(owner.email.clone()),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_owned_by(&self, email: &str) -> bool {
        self.owner_email.eq_ignore_ascii_case(email)
    }
}

impl fmt::Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.chars().count()))?;
        if let Some(note) = &self.note {
            writeln!(f, "{}", note)?;
        }
        writeln!(f, "Owner: {}", self.owner_email)?;
        if let Some(by) = &self.updated_by_email {
            writeln!(
                f,
                "Last update {} by {}",
                self.updated_at.format("%Y-%m-%d %H:%M"),
                by
            )?;
        }
        Ok(())
    }
}
