use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::{ApiClient, ClientError};
use crate::config::default_config_dir;
use crate::translate::{TranslateError, TranslationCache, Translator, DEFAULT_LANGUAGE};

const STATE_FILE: &str = "state.json";
const TRANSLATIONS_FILE: &str = "translations.json";
const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// What the terminal client remembers between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(skip)]
    dir: PathBuf,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl ClientState {
    /// Loads state from `dir`, defaulting to ~/.config/shoplist/.
    ///
    /// `SHOPLIST_SERVER_URL` overrides the stored server URL.
    pub fn load(dir: Option<PathBuf>) -> Result<Self, ClientError> {
        let dir = dir.unwrap_or_else(default_config_dir);
        let path = dir.join(STATE_FILE);

        let mut state = if path.exists() {
            serde_json::from_str::<Self>(&fs::read_to_string(&path)?)?
        } else {
            Self {
                server_url: DEFAULT_SERVER_URL.to_string(),
                token: None,
                email: None,
                language: default_language(),
                dir: PathBuf::new(),
            }
        };
        state.dir = dir;

        if let Ok(url) = std::env::var("SHOPLIST_SERVER_URL") {
            state.server_url = url;
        }
        Ok(state)
    }

    pub fn save(&self) -> Result<(), ClientError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(STATE_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn translations_path(&self) -> PathBuf {
        self.dir.join(TRANSLATIONS_FILE)
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(&self.server_url, self.token.clone())
    }

    pub fn set_session(&mut self, token: String, email: String) {
        self.token = Some(token);
        self.email = Some(email);
    }

    /// Forgets the session along with its translation cache.
    pub fn clear_session(&mut self) -> Result<(), ClientError> {
        self.token = None;
        self.email = None;
        let translations = self.translations_path();
        if translations.exists() {
            fs::remove_file(translations)?;
        }
        Ok(())
    }

    /// True when output should go through the translation overlay.
    pub fn translates(&self) -> bool {
        !self.language.eq_ignore_ascii_case(DEFAULT_LANGUAGE)
    }

    pub fn translation_cache(&self) -> Result<TranslationCache, ClientError> {
        Ok(TranslationCache::open(&self.translations_path())?)
    }
}

/// Translates through the server's `/translate` endpoint.
///
/// The server translates from its default language, so `source` is not sent.
#[derive(Debug, Clone)]
pub struct ServerTranslator {
    api: ApiClient,
}

impl ServerTranslator {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl Translator for ServerTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        _source: &str,
        target: &str,
    ) -> Result<Vec<String>, TranslateError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .api
            .translate(texts, target)
            .await
            .map_err(|e| TranslateError::UnexpectedResponse(e.to_string()))?;
        Ok(response.translations)
    }

    async fn translate_one(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        self.translate_batch(&[text.to_string()], source, target)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::UnexpectedResponse("empty response".to_string()))
    }
}
