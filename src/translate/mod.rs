//! Automatic translation of rendered pages.
//!
//! Text is sent to a LibreTranslate-compatible endpoint in one batch per
//! pass. Results are cached per session under `tr_{lang}_{sha256(text)}`.

mod cache;
mod client;
mod page;

pub use cache::{cache_key, TranslationCache};
pub use client::LibreTranslate;
pub use page::{run_overlay, Element, Node, Page, PageTranslator, PassStats};

use std::future::Future;

/// Language the app's own strings are written in.
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected translation response: {0}")]
    UnexpectedResponse(String),
    #[error("Translation cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Translation cache is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// A translation service.
pub trait Translator: Send + Sync {
    /// Translates `texts`, returning one result per input in order.
    fn translate_batch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> impl Future<Output = Result<Vec<String>, TranslateError>> + Send;

    fn translate_one(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> impl Future<Output = Result<String, TranslateError>> + Send;
}
