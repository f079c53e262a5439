//! `/auth/*` and `/me` handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};

use super::api::{Credentials, MagicLinkRequest, MeResponse, ResetConfirm, ResetRequest, TokenQuery};
use super::{ApiError, AppState};
use crate::auth::{validate, AuthError, Session};
use crate::views::{self, AuthForm, AuthMode, AuthOutcome, Notice, PasswordChangeForm};

async fn submit(state: &AppState, form: AuthForm) -> Result<AuthOutcome, ApiError> {
    Ok(form.submit(&state.ctx.identity).await?)
}

fn signed_in(outcome: AuthOutcome) -> Result<Session, ApiError> {
    match outcome {
        AuthOutcome::SignedIn(session) => Ok(session),
        AuthOutcome::LinkSent(_) => Err(unexpected_outcome()),
    }
}

fn unexpected_outcome() -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "unexpected sign-in outcome",
    )
}

fn form(mode: AuthMode, body: Credentials) -> AuthForm {
    AuthForm {
        mode,
        email: body.email,
        password: body.password,
        display_name: body.display_name,
    }
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = signed_in(submit(&state, form(AuthMode::Register, body)).await?)?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<Session>, ApiError> {
    let session = signed_in(submit(&state, form(AuthMode::Login, body)).await?)?;
    Ok(Json(session))
}

/// Mails a sign-in link. The link itself is never returned.
pub async fn magic_link(
    State(state): State<AppState>,
    Json(body): Json<MagicLinkRequest>,
) -> Result<Json<Notice>, ApiError> {
    state
        .ctx
        .identity
        .send_magic_link(&body.email, body.redirect.as_deref())
        .await?;
    Ok(Json(Notice::info("Check your email for a sign-in link")))
}

/// Target of magic links. Redirects with the session when the link asked
/// for it, otherwise answers with the session.
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, ApiError> {
    let (session, redirect) = state.ctx.identity.verify_magic_link(&query.token).await?;

    Ok(match redirect {
        Some(target) => {
            let separator = if target.contains('?') { '&' } else { '?' };
            let location = format!(
                "{}{}token={}&email={}",
                target,
                separator,
                urlencoding::encode(&session.token),
                urlencoding::encode(&session.email)
            );
            Redirect::to(&location).into_response()
        }
        None => Json(session).into_response(),
    })
}

pub async fn reset(
    State(state): State<AppState>,
    Json(body): Json<ResetRequest>,
) -> Result<Json<Notice>, ApiError> {
    match submit(&state, AuthForm::new(AuthMode::Reset, body.email, "")).await? {
        AuthOutcome::LinkSent(notice) => Ok(Json(notice)),
        AuthOutcome::SignedIn(_) => Err(unexpected_outcome()),
    }
}

pub async fn reset_confirm(
    State(state): State<AppState>,
    Json(body): Json<ResetConfirm>,
) -> Result<Json<Notice>, ApiError> {
    validate::password(&body.password)?;
    validate::confirmation(&body.password, &body.confirm)?;
    state
        .ctx
        .identity
        .reset_password(&body.token, &body.password)
        .await?;
    Ok(Json(Notice::success("Password updated, sign in again")))
}

pub async fn oauth(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.ctx.identity.sign_in_with_oauth(&provider).await?))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<MeResponse>, ApiError> {
    let user = state
        .ctx
        .store
        .users
        .get(session.user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::SessionExpired)?;

    Ok(Json(MeResponse {
        user_id: user.id,
        email: user.email,
        display_name: user.display_name,
        is_admin: user.is_admin,
        expires_at: session.expires_at,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Session>, ApiError> {
    let refreshed = state.ctx.identity.refresh_session(&session.token).await?;
    state.move_cache(&session.token, &refreshed.token);
    Ok(Json(refreshed))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Notice>, ApiError> {
    let notice = views::sign_out(&state.ctx.identity, &session).await?;
    state.drop_cache(&session.token);
    Ok(Json(notice))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(form): Json<PasswordChangeForm>,
) -> Result<Json<Notice>, ApiError> {
    Ok(Json(form.submit(&state.ctx.identity, &session).await?))
}
