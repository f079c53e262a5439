use serde::{Deserialize, Serialize};

use super::{TranslateError, Translator};

/// Client for a LibreTranslate-compatible `/translate` endpoint.
#[derive(Debug, Clone)]
pub struct LibreTranslate {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a, Q: Serialize> {
    q: Q,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranslatedText {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Translated {
    #[serde(rename = "translatedText")]
    translated_text: TranslatedText,
}

/// Servers answer a batch either with one object per text or with a single
/// object holding an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranslateResponse {
    Positional(Vec<Translated>),
    Single(Translated),
}

impl TranslateResponse {
    fn into_texts(self) -> Result<Vec<String>, TranslateError> {
        match self {
            TranslateResponse::Positional(items) => items
                .into_iter()
                .map(|item| match item.translated_text {
                    TranslatedText::One(text) => Ok(text),
                    TranslatedText::Many(_) => Err(TranslateError::UnexpectedResponse(
                        "nested array in positional response".to_string(),
                    )),
                })
                .collect(),
            TranslateResponse::Single(item) => Ok(match item.translated_text {
                TranslatedText::One(text) => vec![text],
                TranslatedText::Many(texts) => texts,
            }),
        }
    }
}

impl LibreTranslate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    async fn post<Q: Serialize>(
        &self,
        q: Q,
        source: &str,
        target: &str,
    ) -> Result<TranslateResponse, TranslateError> {
        let body = TranslateRequest {
            q,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

impl Translator for LibreTranslate {
    async fn translate_batch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, TranslateError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let translated = self.post(texts, source, target).await?.into_texts()?;
        if translated.len() != texts.len() {
            return Err(TranslateError::UnexpectedResponse(format!(
                "sent {} texts, got {} translations",
                texts.len(),
                translated.len()
            )));
        }
        Ok(translated)
    }

    async fn translate_one(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        self.post(text, source, target)
            .await?
            .into_texts()?
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::UnexpectedResponse("empty response".to_string()))
    }
}
