use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::TranslateError;

pub fn cache_key(lang: &str, text: &str) -> String {
    format!("tr_{}_{}", lang, hex::encode(Sha256::digest(text.as_bytes())))
}

/// Translations keyed by target language and source text.
///
/// Optionally backed by a JSON file. In-memory caches live as long as the
/// session that owns them.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TranslationCache {
    entries: HashMap<String, String>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache at `path`, or starts empty when the file is missing.
    pub fn open(path: &Path) -> Result<Self, TranslateError> {
        let mut cache = if path.exists() {
            serde_json::from_str::<Self>(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        cache.path = Some(path.to_path_buf());
        Ok(cache)
    }

    pub fn get(&self, lang: &str, text: &str) -> Option<&str> {
        self.entries.get(&cache_key(lang, text)).map(String::as_str)
    }

    /// Stores a translation. The translated text is stored as its own
    /// translation too, so text that was already replaced stays put.
    pub fn insert(&mut self, lang: &str, text: &str, translated: &str) {
        self.entries
            .insert(cache_key(lang, text), translated.to_string());
        self.entries
            .insert(cache_key(lang, translated), translated.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Writes the cache back to its file. No-op for in-memory caches.
    pub fn save(&self) -> Result<(), TranslateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_key_format() {
        let key = cache_key("cs", "Milk");
        assert!(key.starts_with("tr_cs_"));
        assert_eq!(key.len(), "tr_cs_".len() + 64);
        assert_ne!(key, cache_key("de", "Milk"));
    }

    #[test]
    fn test_insert_caches_output_too() {
        let mut cache = TranslationCache::new();
        cache.insert("cs", "Milk", "Mléko");

        assert_eq!(cache.get("cs", "Milk"), Some("Mléko"));
        assert_eq!(cache.get("cs", "Mléko"), Some("Mléko"));
        assert_eq!(cache.get("de", "Milk"), None);
    }

    #[test]
    fn test_save_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("translations.json");

        let mut cache = TranslationCache::open(&path).unwrap();
        assert!(cache.is_empty());
        cache.insert("cs", "Milk", "Mléko");
        cache.save().unwrap();

        let reopened = TranslationCache::open(&path).unwrap();
        assert_eq!(reopened.get("cs", "Milk"), Some("Mléko"));
    }
}
