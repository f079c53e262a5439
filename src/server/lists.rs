//! `/lists/*` and `/share/*` handlers. Each one drives a view model.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use uuid::Uuid;

use super::api::{CreateList, InviteRequest, ItemInput, Mutation, NoteUpdate, RoleUpdate, ShareLink};
use super::{bearer_token, ApiError, AppState};
use crate::auth::Session;
use crate::models::ShoppingList;
use crate::views::{
    AcceptResult, ListDetail, ListSnapshot, ListsOverview, Notice, OverviewEntry,
    SharedListPreview,
};

async fn open(state: &AppState, session: &Session, id: Uuid) -> Result<ListDetail, ApiError> {
    Ok(ListDetail::open(&state.ctx, session, id).await?)
}

fn mutation(notice: Notice, detail: &ListDetail) -> Json<Mutation> {
    Json(Mutation {
        notice,
        detail: detail.snapshot(),
    })
}

pub async fn overview(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<OverviewEntry>>, ApiError> {
    let overview = ListsOverview::load(&state.ctx, &session).await?;
    Ok(Json(overview.entries().to_vec()))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<CreateList>,
) -> Result<(StatusCode, Json<ShoppingList>), ApiError> {
    let mut overview = ListsOverview::load(&state.ctx, &session).await?;
    let list = overview.create_list(&body.name).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Json<ListSnapshot>, ApiError> {
    Ok(Json(open(&state, &session, id).await?.snapshot()))
}

pub async fn update_note(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
    Json(body): Json<NoteUpdate>,
) -> Result<Json<Mutation>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail.update_note(body.note.as_deref()).await?;
    Ok(mutation(notice, &detail))
}

pub async fn add_item(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
    Json(body): Json<ItemInput>,
) -> Result<(StatusCode, Json<Mutation>), ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail.add_item(&body.name, body.note.as_deref()).await?;
    Ok((StatusCode::CREATED, mutation(notice, &detail)))
}

pub async fn edit_item(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ItemInput>,
) -> Result<Json<Mutation>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail
        .edit_item(item_id, &body.name, body.note.as_deref())
        .await?;
    Ok(mutation(notice, &detail))
}

pub async fn toggle_item(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Mutation>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail.toggle_item(item_id).await?;
    Ok(mutation(notice, &detail))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Mutation>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail.delete_item(item_id).await?;
    Ok(mutation(notice, &detail))
}

pub async fn share(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShareLink>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let link = detail.share().await?;
    Ok(Json(ShareLink { link }))
}

pub async fn invite(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
    Json(body): Json<InviteRequest>,
) -> Result<(StatusCode, Json<ShareLink>), ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let link = detail.invite(&body.email, body.role).await?;
    Ok((StatusCode::CREATED, Json(ShareLink { link })))
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, share_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RoleUpdate>,
) -> Result<Json<Mutation>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail.change_role(share_id, body.role).await?;
    Ok(mutation(notice, &detail))
}

pub async fn remove_share(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, share_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Mutation>, ApiError> {
    let mut detail = open(&state, &session, id).await?;
    let notice = detail.remove_share(share_id).await?;
    Ok(mutation(notice, &detail))
}

/// Share-link preview. A bearer token is optional here.
pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<SharedListPreview>, ApiError> {
    let session = match bearer_token(&headers)? {
        Some(bearer) => Some(state.ctx.session(bearer).await?),
        None => None,
    };
    let preview = SharedListPreview::load(&state.ctx, session.as_ref(), &token).await?;
    Ok(Json(preview))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(token): Path<String>,
) -> Result<Json<AcceptResult>, ApiError> {
    Ok(Json(
        SharedListPreview::accept(&state.ctx, &session, &token).await?,
    ))
}
