use std::sync::Arc;
use tempfile::TempDir;

use shoplist::access::effective_role;
use shoplist::auth::{token_from_link, Identity, Session};
use shoplist::db::Store;
use shoplist::models::Role;
use shoplist::views::{AppContext, ListDetail, ListsOverview, SharedListPreview, ViewError};

struct App {
    ctx: AppContext,
    _dir: TempDir,
}

async fn app() -> App {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("shoplist.db")).await.unwrap();
    let identity = Identity::new(
        store.users.clone(),
        store.sessions.clone(),
        None,
        "http://localhost:8080",
    );
    App {
        ctx: AppContext::new(store, Arc::new(identity)),
        _dir: dir,
    }
}

async fn sign_up(app: &App, email: &str) -> Session {
    app.ctx
        .identity
        .sign_up(email, "secret1", None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_invited_viewer_can_read_but_not_change() {
    let app = app().await;
    let alice = sign_up(&app, "alice@example.com").await;
    let bob = sign_up(&app, "bob@example.com").await;

    let mut overview = ListsOverview::load(&app.ctx, &alice).await.unwrap();
    let list = overview.create_list("Groceries").await.unwrap();

    let mut detail = ListDetail::open(&app.ctx, &alice, list.id).await.unwrap();
    detail.add_item("Milk", None).await.unwrap();
    let link = detail.invite("bob@example.com", Role::Viewer).await.unwrap();

    // Not shared with Bob until he accepts
    assert!(matches!(
        ListDetail::open(&app.ctx, &bob, list.id).await,
        Err(ViewError::AccessDenied)
    ));

    let token = token_from_link(&link);
    let preview = SharedListPreview::load(&app.ctx, Some(&bob), &token)
        .await
        .unwrap();
    assert_eq!(preview.name, "Groceries");
    assert_eq!(preview.role, Role::Viewer);
    assert!(!preview.already_member);

    let accepted = SharedListPreview::accept(&app.ctx, &bob, &token)
        .await
        .unwrap();
    assert_eq!(accepted.list_id, list.id);

    let mut shared = ListDetail::open(&app.ctx, &bob, list.id).await.unwrap();
    assert_eq!(shared.role(), Role::Viewer);
    assert_eq!(
        effective_role(&bob.email, shared.list(), shared.shares()),
        Some(Role::Viewer)
    );
    assert!(!shared.capabilities().add_item);
    assert!(shared.snapshot().shares.is_empty());
    assert_eq!(shared.items().len(), 1);

    assert!(matches!(
        shared.add_item("Eggs", None).await,
        Err(ViewError::Forbidden(Role::Viewer))
    ));

    let bobs_lists = ListsOverview::load(&app.ctx, &bob).await.unwrap();
    assert_eq!(bobs_lists.entries().len(), 1);
    assert!(!bobs_lists.entries()[0].owned);
}

#[tokio::test]
async fn test_revoked_share_loses_access() {
    let app = app().await;
    let alice = sign_up(&app, "alice@example.com").await;
    let bob = sign_up(&app, "bob@example.com").await;

    let mut overview = ListsOverview::load(&app.ctx, &alice).await.unwrap();
    let list = overview.create_list("Hardware").await.unwrap();
    let mut detail = ListDetail::open(&app.ctx, &alice, list.id).await.unwrap();
    let link = detail.invite("bob@example.com", Role::Editor).await.unwrap();

    SharedListPreview::accept(&app.ctx, &bob, &token_from_link(&link))
        .await
        .unwrap();
    let mut shared = ListDetail::open(&app.ctx, &bob, list.id).await.unwrap();
    shared.add_item("Nails", None).await.unwrap();

    detail.refresh_shares().await.unwrap();
    let share_id = detail.shares()[0].id;
    detail.remove_share(share_id).await.unwrap();

    assert!(matches!(
        ListDetail::open(&app.ctx, &bob, list.id).await,
        Err(ViewError::AccessDenied)
    ));
    detail.refresh_items().await.unwrap();
    assert_eq!(detail.items().len(), 1);
}
