use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{TranslationCache, Translator};

const TRANSLATED_ATTRS: [&str; 2] = ["aria-label", "title"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn child(mut self, element: Element) -> Self {
        self.children.push(Node::Element(element));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// `main`, `nav`, `.modal` and `[role=dialog]` elements are translated.
    fn is_root(&self) -> bool {
        self.tag == "main"
            || self.tag == "nav"
            || self
                .attrs
                .get("class")
                .is_some_and(|c| c.split_whitespace().any(|c| c == "modal"))
            || self.attrs.get("role").is_some_and(|r| r == "dialog")
    }

    fn visit_roots<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        if self.is_root() {
            f(self);
            return;
        }
        for child in &self.children {
            if let Node::Element(el) = child {
                el.visit_roots(f);
            }
        }
    }

    fn visit_roots_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        if self.is_root() {
            f(self);
            return;
        }
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.visit_roots_mut(f);
            }
        }
    }

    /// Elements marked `translate="no"` keep their text.
    fn is_untranslatable(&self) -> bool {
        self.attrs.get("translate").is_some_and(|v| v == "no")
    }

    /// Visible, translatable, non-blank text nodes in document order.
    fn texts<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.hidden || self.is_untranslatable() {
            return;
        }
        for child in &self.children {
            match child {
                Node::Text(t) if !t.trim().is_empty() => out.push(t),
                Node::Text(_) => {}
                Node::Element(el) => el.texts(out),
            }
        }
    }

    fn replace_texts(&mut self, translations: &HashMap<String, String>) {
        if self.hidden || self.is_untranslatable() {
            return;
        }
        for child in &mut self.children {
            match child {
                Node::Text(t) => {
                    if let Some(translated) = translations.get(t.as_str()) {
                        *t = translated.clone();
                    }
                }
                Node::Element(el) => el.replace_texts(translations),
            }
        }
    }

    /// Appends one line per block of text. `span` children continue the
    /// current line.
    fn render(&self, lines: &mut Vec<String>) {
        if self.hidden {
            return;
        }
        let mut line = Vec::new();
        for child in &self.children {
            match child {
                Node::Element(el) if el.tag == "span" => el.render_inline(&mut line),
                Node::Element(el) => {
                    flush_line(&mut line, lines);
                    el.render(lines);
                }
                Node::Text(t) if !t.trim().is_empty() => line.push(t.trim().to_string()),
                Node::Text(_) => {}
            }
        }
        flush_line(&mut line, lines);
    }

    fn render_inline(&self, line: &mut Vec<String>) {
        if self.hidden {
            return;
        }
        for child in &self.children {
            match child {
                Node::Element(el) => el.render_inline(line),
                Node::Text(t) if !t.trim().is_empty() => line.push(t.trim().to_string()),
                Node::Text(_) => {}
            }
        }
    }

    fn attr_values<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.hidden || self.is_untranslatable() {
            return;
        }
        for name in TRANSLATED_ATTRS {
            if let Some(value) = self.attrs.get(name).filter(|v| !v.trim().is_empty()) {
                out.push(value);
            }
        }
        for child in &self.children {
            if let Node::Element(el) = child {
                el.attr_values(out);
            }
        }
    }

    fn replace_attrs(&mut self, translations: &HashMap<String, String>) {
        if self.hidden || self.is_untranslatable() {
            return;
        }
        for name in TRANSLATED_ATTRS {
            if let Some(value) = self.attrs.get_mut(name) {
                if let Some(translated) = translations.get(value.as_str()) {
                    *value = translated.clone();
                }
            }
        }
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.replace_attrs(translations);
            }
        }
    }
}

/// A rendered page: the element tree the overlay walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub body: Element,
}

impl Page {
    pub fn new(body: Element) -> Self {
        Self { body }
    }

    /// Unique translatable texts, first occurrence first.
    pub fn texts(&self) -> Vec<String> {
        let mut all = Vec::new();
        self.body.visit_roots(&mut |root| root.texts(&mut all));
        unique(all)
    }

    pub fn attribute_values(&self) -> Vec<String> {
        let mut all = Vec::new();
        self.body.visit_roots(&mut |root| root.attr_values(&mut all));
        unique(all)
    }

    /// Visible text of the page, one line per element. Inline `span`
    /// elements stay on their parent's line.
    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();
        self.body.render(&mut lines);
        lines.join("\n")
    }

    fn replace_texts(&mut self, translations: &HashMap<String, String>) {
        self.body
            .visit_roots_mut(&mut |root| root.replace_texts(translations));
    }

    fn replace_attrs(&mut self, translations: &HashMap<String, String>) {
        self.body
            .visit_roots_mut(&mut |root| root.replace_attrs(translations));
    }
}

fn flush_line(line: &mut Vec<String>, lines: &mut Vec<String>) {
    if !line.is_empty() {
        lines.push(line.join(" "));
        line.clear();
    }
}

fn unique(values: Vec<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

/// Counters for one translation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    pub unique_texts: usize,
    pub cache_hits: usize,
    pub requests: usize,
    pub translated: usize,
}

/// Translates pages into one target language through a cache.
#[derive(Debug)]
pub struct PageTranslator<T> {
    backend: T,
    cache: TranslationCache,
    source: String,
    target: String,
}

impl<T: Translator> PageTranslator<T> {
    pub fn new(
        backend: T,
        cache: TranslationCache,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cache,
            source: source.into(),
            target: target.into(),
        }
    }

    /// False when the target is the source language.
    pub fn is_active(&self) -> bool {
        !self.source.eq_ignore_ascii_case(&self.target)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn into_cache(self) -> TranslationCache {
        self.cache
    }

    /// Translates `texts`, returning one string per input. Texts that could
    /// not be translated come back unchanged.
    pub async fn translate_texts(&mut self, texts: &[String]) -> (Vec<String>, PassStats) {
        let mut stats = PassStats::default();
        if !self.is_active() {
            return (texts.to_vec(), stats);
        }

        let unique = unique(texts.iter().map(String::as_str).collect());
        stats.unique_texts = unique.len();

        let misses: Vec<String> = unique
            .iter()
            .filter(|t| self.cache.get(&self.target, t).is_none())
            .cloned()
            .collect();
        stats.cache_hits = unique.len() - misses.len();

        if !misses.is_empty() {
            stats.requests += 1;
            match self
                .backend
                .translate_batch(&misses, &self.source, &self.target)
                .await
            {
                Ok(translated) => {
                    for (text, result) in misses.iter().zip(&translated) {
                        if !result.is_empty() {
                            self.cache.insert(&self.target, text, result);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, count = misses.len(), "batch translation failed");
                }
            }
        }

        let out: Vec<String> = texts
            .iter()
            .map(|t| {
                self.cache
                    .get(&self.target, t)
                    .unwrap_or(t.as_str())
                    .to_string()
            })
            .collect();
        stats.translated = texts.iter().zip(&out).filter(|(a, b)| a != b).count();
        (out, stats)
    }

    /// Runs one pass over `page`: all texts in one batch, then each uncached
    /// attribute value on its own.
    pub async fn translate_page(&mut self, page: &mut Page) -> PassStats {
        if !self.is_active() {
            return PassStats::default();
        }

        let texts = page.texts();
        let (translated, mut stats) = self.translate_texts(&texts).await;
        let replacements: HashMap<String, String> = texts
            .into_iter()
            .zip(translated)
            .filter(|(a, b)| a != b)
            .collect();
        page.replace_texts(&replacements);

        let mut attr_replacements = HashMap::new();
        for value in page.attribute_values() {
            if self.cache.get(&self.target, &value).is_none() {
                stats.requests += 1;
                match self
                    .backend
                    .translate_one(&value, &self.source, &self.target)
                    .await
                {
                    Ok(translated) if !translated.is_empty() => {
                        self.cache.insert(&self.target, &value, &translated);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, %value, "attribute translation failed");
                    }
                }
            }
            if let Some(translated) = self.cache.get(&self.target, &value) {
                if translated != value {
                    attr_replacements.insert(value.clone(), translated.to_string());
                }
            }
        }
        page.replace_attrs(&attr_replacements);

        tracing::debug!(
            unique = stats.unique_texts,
            hits = stats.cache_hits,
            requests = stats.requests,
            "translation pass done"
        );
        stats
    }
}

/// Re-translates `page` every `interval` until `shutdown` resolves.
///
/// Returns the number of passes run. Returns at once when the translator
/// targets the source language.
pub async fn run_overlay<T, S>(
    translator: &mut PageTranslator<T>,
    page: &Mutex<Page>,
    interval: Duration,
    shutdown: S,
) -> usize
where
    T: Translator,
    S: Future<Output = ()>,
{
    if !translator.is_active() {
        return 0;
    }

    tokio::pin!(shutdown);
    let mut passes = 0;
    loop {
        {
            let mut page = page.lock().await;
            translator.translate_page(&mut page).await;
        }
        passes += 1;

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    passes
}
