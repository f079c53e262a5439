//! `POST /translate`: batch translation through a per-session cache.

use axum::{extract::State, Extension, Json};

use super::api::{TranslateRequest, TranslateResponse};
use super::{ApiError, AppState};
use crate::auth::{validate, Session};
use crate::translate::PageTranslator;

pub async fn translate(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let target = validate::required("target", &body.target)?;

    let cache = state.session_cache(&session.token);
    let mut cache = cache.lock().await;

    let mut translator = PageTranslator::new(
        state.translator.clone(),
        std::mem::take(&mut *cache),
        state.default_language.as_str(),
        target,
    );
    let (translations, stats) = translator.translate_texts(&body.texts).await;
    *cache = translator.into_cache();

    tracing::debug!(
        email = %session.email,
        lang = target,
        texts = body.texts.len(),
        hits = stats.cache_hits,
        "translated batch"
    );
    Ok(Json(TranslateResponse {
        translations,
        stats,
    }))
}
