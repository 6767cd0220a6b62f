//! Incremental result cache: one JSON file, one section per content type.
//!
//! Saves merge into the existing file so a run over several types shares a
//! single cache; a repo mismatch or unreadable file resets it. Writes go
//! through a temp file and an atomic rename so a crash mid-save can never
//! leave a half-written cache behind.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::types::{truncate_chars, ContentType, SearchItem, BODY_MAX};

pub const CACHE_VERSION: &str = "v5";

/// Cache-time truncation budgets, tighter than the in-memory ones so a big
/// run doesn't balloon the file.
const CACHED_SNIPPET_MAX: usize = 2_000;
const CACHED_MESSAGE_MAX: usize = 2_000;
const CACHED_FILES_MAX: usize = 20;
const CACHED_ANSWER_MAX: usize = 10_000;
const CACHED_COMMENTS_MAX: usize = 20_000;

/// Shrink the bulky fields before an item goes to disk.
fn trim_for_cache(item: &mut SearchItem) {
    match item {
        SearchItem::Issue(_) | SearchItem::Pr(_) => {}
        SearchItem::Code(c) => {
            c.content_snippet = truncate_chars(&c.content_snippet, CACHED_SNIPPET_MAX);
        }
        SearchItem::Commit(c) => {
            c.message = truncate_chars(&c.message, CACHED_MESSAGE_MAX);
            c.changed_files.truncate(CACHED_FILES_MAX);
        }
        SearchItem::Discussion(d) => {
            d.body = truncate_chars(&d.body, BODY_MAX);
            d.answer_body = truncate_chars(&d.answer_body, CACHED_ANSWER_MAX);
            d.comments_text = truncate_chars(&d.comments_text, CACHED_COMMENTS_MAX);
        }
    }
}

pub struct ResultCache {
    path: PathBuf,
    repo: String,
}

impl ResultCache {
    pub fn new(path: impl Into<PathBuf>, repo: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repo: repo.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing(&self) -> Option<Map<String, Value>> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let value: Value = serde_json::from_str(&text).ok()?;
        let obj = value.as_object()?.clone();
        if obj.get("repo").and_then(Value::as_str) != Some(self.repo.as_str()) {
            return None;
        }
        Some(obj)
    }

    /// Write one content type's section, merging with whatever other
    /// sections the file already holds.
    pub fn save(&self, content_type: ContentType, items: Vec<SearchItem>) -> Result<()> {
        let mut root = self.read_existing().unwrap_or_else(|| {
            let mut fresh = Map::new();
            fresh.insert("repo".into(), Value::String(self.repo.clone()));
            fresh.insert("saved_at".into(), Value::String(String::new()));
            fresh.insert("version".into(), Value::String(CACHE_VERSION.into()));
            fresh
        });
        root.insert(
            "saved_at".into(),
            Value::String(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );

        let count = items.len();
        let mut section = Map::new();
        for mut item in items {
            trim_for_cache(&mut item);
            section.insert(item.key(), serde_json::to_value(&item)?);
        }
        root.insert(content_type.as_str().into(), Value::Object(section));

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&Value::Object(root))?)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(count, section = %content_type, path = %self.path.display(), "cache saved");
        Ok(())
    }

    /// Load one content type's section. `None` when the file is missing,
    /// unreadable, for a different repo, or has no such section.
    pub fn load(&self, content_type: ContentType) -> Option<Vec<SearchItem>> {
        if !self.path.exists() {
            return None;
        }
        let text = std::fs::read_to_string(&self.path).ok()?;
        let data: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(err) => {
                error!(%err, path = %self.path.display(), "cache unreadable, ignoring");
                return None;
            }
        };

        let cached_repo = data.get("repo").and_then(Value::as_str).unwrap_or("");
        if cached_repo != self.repo {
            warn!(
                cached = cached_repo,
                expected = %self.repo,
                "cache is for a different repo, ignoring"
            );
            return None;
        }

        let section = data.get(content_type.as_str())?.as_object()?;
        let mut items = Vec::with_capacity(section.len());
        for (key, raw) in section {
            match serde_json::from_value::<SearchItem>(raw.clone()) {
                Ok(item) => items.push(item),
                Err(err) => {
                    error!(%err, key, "cache entry unreadable, ignoring section");
                    return None;
                }
            }
        }

        let saved_at = data.get("saved_at").and_then(Value::as_str).unwrap_or("?");
        info!(
            count = items.len(),
            section = %content_type,
            saved_at,
            "cache restored"
        );
        Some(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
