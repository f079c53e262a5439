//! The page behind a capability link.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AppContext, Notice, ViewError};
use crate::access::effective_role;
use crate::auth::Session;
use crate::db::AcceptOutcome;
use crate::models::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewItem {
    pub name: String,
    pub note: Option<String>,
    pub checked: bool,
}

/// What anyone holding a share token may see before accepting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedListPreview {
    pub list_id: Uuid,
    pub name: String,
    pub note: Option<String>,
    pub items: Vec<PreviewItem>,
    /// Role the link grants.
    pub role: Role,
    /// Whether the visitor already owns or has joined the list.
    pub already_member: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptResult {
    pub list_id: Uuid,
    pub notice: Notice,
}

impl SharedListPreview {
    /// Loads the list behind `token`. Works without a session.
    pub async fn load(
        ctx: &AppContext,
        session: Option<&Session>,
        token: &str,
    ) -> Result<Self, ViewError> {
        let share = ctx
            .store
            .shares
            .by_token(token)
            .await?
            .ok_or(ViewError::NotFound)?;
        let list = ctx
            .store
            .lists
            .get(share.list_id)
            .await?
            .ok_or(ViewError::NotFound)?;

        let already_member = match session {
            Some(session) => {
                let shares = ctx.store.shares.for_list(list.id).await?;
                effective_role(&session.email, &list, &shares).is_some()
            }
            None => false,
        };

        let items = ctx
            .store
            .items
            .for_list(list.id)
            .await?
            .into_iter()
            .map(|item| PreviewItem {
                name: item.name,
                note: item.note,
                checked: item.checked,
            })
            .collect();

        Ok(Self {
            list_id: list.id,
            name: list.name,
            note: list.note,
            items,
            role: share.role,
            already_member,
        })
    }

    /// Adds the list behind `token` to the visitor's lists.
    ///
    /// The owner following their own link is sent straight to the list.
    pub async fn accept(
        ctx: &AppContext,
        session: &Session,
        token: &str,
    ) -> Result<AcceptResult, ViewError> {
        let share = ctx
            .store
            .shares
            .by_token(token)
            .await?
            .ok_or(ViewError::NotFound)?;
        let list = ctx
            .store
            .lists
            .get(share.list_id)
            .await?
            .ok_or(ViewError::NotFound)?;

        if list.is_owned_by(&session.email) {
            return Ok(AcceptResult {
                list_id: list.id,
                notice: Notice::info("This list is already yours"),
            });
        }

        let outcome = ctx
            .store
            .shares
            .accept(token, &session.actor())
            .await?
            .ok_or(ViewError::NotFound)?;

        let notice = match outcome {
            AcceptOutcome::Accepted(_) | AcceptOutcome::Joined(_) => {
                tracing::info!(list = %list.id, email = %session.email, "share accepted");
                Notice::success(format!("\"{}\" was added to your lists", list.name))
            }
            AcceptOutcome::AlreadyAccepted(_) => Notice::info("You already have this list"),
            AcceptOutcome::InviteMismatch { invited_email } => {
                return Err(ViewError::InviteMismatch(invited_email))
            }
        };

        Ok(AcceptResult {
            list_id: list.id,
            notice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, ShoppingList};
    use crate::views::test_support::setup_app;
    use crate::views::ListDetail;

    #[tokio::test]
    async fn test_preview_without_session() {
        let app = setup_app().await;
        let owner = app.sign_up("a@x.com").await;
        let actor = owner.actor();
        let list = app
            .ctx
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &actor).with_note("Saturday"))
            .await
            .unwrap();
        app.ctx
            .store
            .items
            .add(&Item::new(list.id, "Milk", &actor), &actor)
            .await
            .unwrap();
        let share = app.ctx.store.shares.ensure_link(list.id, &actor).await.unwrap();
        let token = share.share_token.unwrap();

        let preview = SharedListPreview::load(&app.ctx, None, &token).await.unwrap();
        assert_eq!(preview.name, "Groceries");
        assert_eq!(preview.note.as_deref(), Some("Saturday"));
        assert_eq!(preview.items.len(), 1);
        assert_eq!(preview.role, Role::Viewer);
        assert!(!preview.already_member);

        let preview = SharedListPreview::load(&app.ctx, Some(&owner), &token)
            .await
            .unwrap();
        assert!(preview.already_member);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let app = setup_app().await;
        assert!(matches!(
            SharedListPreview::load(&app.ctx, None, "missing").await,
            Err(ViewError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_owner_accepting_own_link_is_noop() {
        let app = setup_app().await;
        let owner = app.sign_up("a@x.com").await;
        let list = app
            .ctx
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner.actor()))
            .await
            .unwrap();
        let mut detail = ListDetail::open(&app.ctx, &owner, list.id).await.unwrap();
        let token = crate::auth::token_from_link(&detail.share().await.unwrap());

        let result = SharedListPreview::accept(&app.ctx, &owner, &token)
            .await
            .unwrap();
        assert_eq!(result.list_id, list.id);

        let share = app.ctx.store.shares.by_token(&token).await.unwrap().unwrap();
        assert!(!share.is_accepted());
    }

    #[tokio::test]
    async fn test_accept_then_repeat() {
        let app = setup_app().await;
        let owner = app.sign_up("a@x.com").await;
        let visitor = app.sign_up("b@x.com").await;
        let list = app
            .ctx
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner.actor()))
            .await
            .unwrap();
        let mut detail = ListDetail::open(&app.ctx, &owner, list.id).await.unwrap();
        let token = crate::auth::token_from_link(&detail.share().await.unwrap());

        let first = SharedListPreview::accept(&app.ctx, &visitor, &token)
            .await
            .unwrap();
        let second = SharedListPreview::accept(&app.ctx, &visitor, &token)
            .await
            .unwrap();

        assert_eq!(first.notice.level, crate::views::NoticeLevel::Success);
        assert_eq!(second.notice.message, "You already have this list");
    }

    #[tokio::test]
    async fn test_invite_for_someone_else() {
        let app = setup_app().await;
        let owner = app.sign_up("a@x.com").await;
        let intruder = app.sign_up("c@x.com").await;
        let list = app
            .ctx
            .store
            .lists
            .create(&ShoppingList::new("Groceries", &owner.actor()))
            .await
            .unwrap();
        let mut detail = ListDetail::open(&app.ctx, &owner, list.id).await.unwrap();
        let link = detail.invite("b@x.com", Role::Editor).await.unwrap();

        let result =
            SharedListPreview::accept(&app.ctx, &intruder, &crate::auth::token_from_link(&link))
                .await;
        assert!(matches!(result, Err(ViewError::InviteMismatch(email)) if email == "b@x.com"));
    }
}
