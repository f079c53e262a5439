//! HTTP surface of the shopping-list service.
//!
//! # Endpoints
//!
//! Public:
//! - `GET /health`
//! - `POST /auth/signup`, `POST /auth/login`, `POST /auth/magic-link`,
//!   `GET /auth/verify`, `POST /auth/reset`, `POST /auth/reset/confirm`,
//!   `POST /auth/oauth/{provider}`
//! - `GET /share/{token}` (a bearer token is optional)
//!
//! Everything else needs `Authorization: Bearer <session token>`.

mod account;
pub mod api;
mod error;
mod lists;
mod live;
mod overlay;

pub use error::{ApiError, ErrorBody};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::trace::TraceLayer;

use crate::translate::{LibreTranslate, TranslationCache};
use crate::views::AppContext;
use api::HealthResponse;

type SessionCaches = HashMap<String, Arc<tokio::sync::Mutex<TranslationCache>>>;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub ctx: AppContext,
    translator: LibreTranslate,
    default_language: String,
    /// Translation caches keyed by session token
    caches: Arc<Mutex<SessionCaches>>,
}

impl AppState {
    pub fn new(
        ctx: AppContext,
        translator: LibreTranslate,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            translator,
            default_language: default_language.into(),
            caches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn session_cache(&self, token: &str) -> Arc<tokio::sync::Mutex<TranslationCache>> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches.entry(token.to_string()).or_default().clone()
    }

    fn move_cache(&self, from: &str, to: &str) {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = caches.remove(from) {
            caches.insert(to.to_string(), cache);
        }
    }

    fn drop_cache(&self, token: &str) {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches.remove(token);
    }
}

/// Builds the full router with tracing.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(account::sign_up))
        .route("/auth/login", post(account::login))
        .route("/auth/magic-link", post(account::magic_link))
        .route("/auth/verify", get(account::verify))
        .route("/auth/reset", post(account::reset))
        .route("/auth/reset/confirm", post(account::reset_confirm))
        .route("/auth/oauth/{provider}", post(account::oauth))
        .route("/share/{token}", get(lists::preview));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(account::me))
        .route("/auth/refresh", post(account::refresh))
        .route("/auth/logout", post(account::logout))
        .route("/auth/password", post(account::change_password))
        .route("/lists", get(lists::overview).post(lists::create))
        .route("/lists/{id}", get(lists::detail))
        .route("/lists/{id}/note", patch(lists::update_note))
        .route("/lists/{id}/items", post(lists::add_item))
        .route(
            "/lists/{id}/items/{item}",
            patch(lists::edit_item).delete(lists::delete_item),
        )
        .route("/lists/{id}/items/{item}/toggle", post(lists::toggle_item))
        .route("/lists/{id}/share", post(lists::share))
        .route("/lists/{id}/invite", post(lists::invite))
        .route(
            "/lists/{id}/shares/{share}",
            patch(lists::change_role).delete(lists::remove_share),
        )
        .route("/share/{token}/accept", post(lists::accept))
        .route("/live/lists", get(live::overview))
        .route("/live/lists/{id}", get(live::detail))
        .route("/translate", post(overlay::translate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// The bearer token, if an Authorization header is present.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    match headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(h) => h.strip_prefix("Bearer ").map(Some).ok_or_else(|| {
            ApiError::unauthorized(
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            )
        }),
        None => Ok(None),
    }
}

/// Resolves the bearer token to a [`crate::auth::Session`] extension.
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?
        .ok_or_else(|| ApiError::unauthorized("missing_auth", "Authorization header required"))?
        .to_string();

    let session = state.ctx.session(&token).await?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
