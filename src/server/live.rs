//! `/live/*` WebSockets: the change feed pushed to clients as fresh views.
//!
//! Each socket holds its own subscriptions and drops them when it closes.
//! Signing the session out closes every socket opened with it.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    Extension,
};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use super::api::LiveMessage;
use super::{ApiError, AppState};
use crate::access::effective_role;
use crate::auth::{AuthEvent, Session};
use crate::views::{ListDetail, ListsOverview, ViewError};

pub async fn overview(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, ApiError> {
    let overview = ListsOverview::load(&state.ctx, &session).await?;
    let auth_events = state.ctx.identity.subscribe();
    Ok(ws.on_upgrade(move |socket| stream_overview(socket, session, overview, auth_events)))
}

pub async fn detail(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let detail = ListDetail::open(&state.ctx, &session, id).await?;
    let auth_events = state.ctx.identity.subscribe();
    Ok(ws.on_upgrade(move |socket| stream_detail(socket, session, detail, auth_events)))
}

async fn stream_overview(
    mut socket: WebSocket,
    session: Session,
    mut overview: ListsOverview,
    mut auth_events: broadcast::Receiver<AuthEvent>,
) {
    let mut watch = overview.watch();
    // Picks up writes committed between loading and subscribing
    if let Err(e) = overview.refresh().await {
        tracing::warn!(error = %e, email = %session.email, "overview refresh failed");
        let _ = close(&mut socket, "refresh failed").await;
        return;
    }
    let initial = LiveMessage::Lists {
        entries: overview.entries().to_vec(),
    };
    if send(&mut socket, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = watch.next() => {
                if changed.is_none() {
                    break;
                }
                if let Err(e) = overview.refresh().await {
                    tracing::warn!(error = %e, email = %session.email, "overview refresh failed");
                    let _ = close(&mut socket, "refresh failed").await;
                    break;
                }
                let message = LiveMessage::Lists { entries: overview.entries().to_vec() };
                if send(&mut socket, &message).await.is_err() {
                    break;
                }
            }
            event = auth_events.recv() => {
                if session_ended(event, &session) {
                    let _ = close(&mut socket, "signed out").await;
                    break;
                }
            }
            incoming = socket.recv() => {
                if client_gone(incoming) {
                    break;
                }
            }
        }
    }
    tracing::debug!(email = %session.email, "overview stream closed");
}

async fn stream_detail(
    mut socket: WebSocket,
    session: Session,
    mut detail: ListDetail,
    mut auth_events: broadcast::Receiver<AuthEvent>,
) {
    let mut watch = detail.watch();
    // Picks up writes committed between loading and subscribing
    if let Err(e) = detail.refresh().await {
        let _ = close(&mut socket, refresh_failure(&e, &detail)).await;
        return;
    }
    if effective_role(&session.email, detail.list(), detail.shares()).is_none() {
        let _ = close(&mut socket, "access revoked").await;
        return;
    }
    let initial = LiveMessage::Detail {
        detail: detail.snapshot(),
        notice: None,
    };
    if send(&mut socket, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = watch.next() => {
                let Some(update) = update else { break };
                if let Err(e) = detail.apply(&update).await {
                    let _ = close(&mut socket, refresh_failure(&e, &detail)).await;
                    break;
                }
                if effective_role(&session.email, detail.list(), detail.shares()).is_none() {
                    let _ = close(&mut socket, "access revoked").await;
                    break;
                }
                let message = LiveMessage::Detail {
                    detail: detail.snapshot(),
                    notice: update.notice,
                };
                if send(&mut socket, &message).await.is_err() {
                    break;
                }
            }
            event = auth_events.recv() => {
                if session_ended(event, &session) {
                    let _ = close(&mut socket, "signed out").await;
                    break;
                }
            }
            incoming = socket.recv() => {
                if client_gone(incoming) {
                    break;
                }
            }
        }
    }
    tracing::debug!(email = %session.email, list = %detail.list().id, "detail stream closed");
}

/// Close reason for a failed reload. Logs anything but a removed list.
fn refresh_failure(err: &ViewError, detail: &ListDetail) -> &'static str {
    match err {
        ViewError::NotFound => "list removed",
        e => {
            tracing::warn!(error = %e, list = %detail.list().id, "detail refresh failed");
            "refresh failed"
        }
    }
}

fn session_ended(event: Result<AuthEvent, RecvError>, session: &Session) -> bool {
    match event {
        Ok(AuthEvent::SignedOut { token, .. }) => token == session.token,
        Ok(_) | Err(RecvError::Lagged(_)) => false,
        Err(RecvError::Closed) => true,
    }
}

fn client_gone(incoming: Option<Result<Message, axum::Error>>) -> bool {
    matches!(incoming, None | Some(Ok(Message::Close(_))) | Some(Err(_)))
}

async fn send(socket: &mut WebSocket, message: &LiveMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}

async fn close(socket: &mut WebSocket, reason: &str) -> Result<(), axum::Error> {
    send(
        socket,
        &LiveMessage::Closed {
            reason: reason.to_string(),
        },
    )
    .await?;
    socket.send(Message::Close(None)).await
}
