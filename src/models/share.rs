use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;

/// Where a share sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareState {
    /// Open link, nobody has claimed it yet.
    Unclaimed,
    /// Addressed to a specific email, not yet accepted.
    Invited,
    Accepted,
}

/// A grant of a role on a list, either by link or by email invitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub id: Uuid,
    pub list_id: Uuid,
    pub share_token: Option<String>,
    pub role: Role,
    pub invited_email: Option<String>,
    pub accepted_by: Option<Uuid>,
    pub accepted_email: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Share {
    /// An open capability link for a list.
    pub fn link(list_id: Uuid, token: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            list_id,
            share_token: Some(token.into()),
            role,
            invited_email: None,
            accepted_by: None,
            accepted_email: None,
            accepted_at: None,
            created_at: Utc::now(),
        }
    }

    /// An invitation addressed to one email.
    pub fn invitation(
        list_id: Uuid,
        token: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            invited_email: Some(email.into()),
            ..Self::link(list_id, token, role)
        }
    }

    pub fn state(&self) -> ShareState {
        if self.accepted_at.is_some() {
            ShareState::Accepted
        } else if self.invited_email.is_some() {
            ShareState::Invited
        } else {
            ShareState::Unclaimed
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.state() == ShareState::Accepted
    }

    pub fn is_link(&self) -> bool {
        self.invited_email.is_none()
    }

    pub fn accepted_by_email(&self, email: &str) -> bool {
        self.accepted_email
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(email))
    }
}
