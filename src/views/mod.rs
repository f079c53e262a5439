//! View models: what each screen of the app shows and what it may do.
//!
//! Every view takes the caller's [`Session`] explicitly and reaches the
//! store through an [`AppContext`]. Surfaces (HTTP, terminal) render them.

pub mod account;
pub mod detail;
pub mod notice;
pub mod overview;
pub mod shared;

pub use account::{sign_out, AuthForm, AuthMode, AuthOutcome, PasswordChangeForm};
pub use detail::{DetailUpdate, DetailWatch, Entity, ListDetail, ListSnapshot};
pub use notice::{Notice, NoticeLevel};
pub use overview::{ListsOverview, OverviewEntry, OverviewWatch};
pub use shared::{AcceptResult, PreviewItem, SharedListPreview};

use std::sync::Arc;

use crate::auth::{AuthError, EmailError, Identity, Session};
use crate::db::Store;
use crate::models::Role;

/// Shared handles every view needs.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub store: Store,
    pub identity: Arc<Identity>,
}

impl AppContext {
    pub fn new(store: Store, identity: Arc<Identity>) -> Self {
        Self { store, identity }
    }

    /// Capability link for a share token.
    pub fn share_link(&self, token: &str) -> String {
        format!("{}/share/{}", self.identity.public_url(), token)
    }

    pub async fn session(&self, token: &str) -> Result<Session, ViewError> {
        Ok(self.identity.session(token).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("Not found")]
    NotFound,
    #[error("You do not have access to this list")]
    AccessDenied,
    #[error("Your role ({0}) does not allow this")]
    Forbidden(Role),
    #[error("This invitation was sent to {0}")]
    InviteMismatch(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error("Database error: {0}")]
    Store(sqlx::Error),
}

impl From<sqlx::Error> for ViewError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ViewError::NotFound,
            other => ViewError::Store(other),
        }
    }
}

/// Trims a required text input.
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, ViewError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ViewError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional text input. Blank becomes `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
