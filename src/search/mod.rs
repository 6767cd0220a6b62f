//! Per-content-type search collectors.
//!
//! Each collector turns the config's query templates into full search
//! queries for its content type, runs them against a [`SearchTransport`],
//! and accumulates unique results. Issue and PR collectors add a second
//! detail phase that fetches comments for borderline-scored items.

pub mod code;
pub mod commits;
pub mod discussions;
pub mod issues;
pub mod prs;

#[cfg(test)]
pub(crate) mod testing;

pub use code::CodeCollector;
pub use commits::CommitCollector;
pub use discussions::DiscussionCollector;
pub use issues::IssueCollector;
pub use prs::PrCollector;

use crate::github::{RatePool, SearchTransport};
use serde_json::Value;

/// Pause between sequential detail fetches when running unauthenticated.
pub(crate) const DETAIL_PAUSE_MS: u64 = 300;

// ---------------------------------------------------------------------------
// StopPolicy
// ---------------------------------------------------------------------------

/// Early-stop tuning for the collect phase.
///
/// Defaults follow what works against real repositories: stop a type once
/// 500 unique items pile up, and stop after three consecutive queries that
/// produced nothing new, but never before a minimum number of queries ran.
/// `pause_ms` exists so tests can run without sleeping.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    /// Unique-result ceiling per content type.
    pub max_items: usize,
    /// Consecutive zero-new-result queries before giving up.
    pub zero_streak: usize,
    /// Pause between queries in milliseconds.
    pub pause_ms: u64,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            max_items: 500,
            zero_streak: 3,
            pause_ms: 500,
        }
    }
}

impl StopPolicy {
    /// Queries that must run before the zero-streak stop may trigger.
    ///
    /// High-tier keywords are often descriptive phrases that rarely match
    /// verbatim; with round interleaving, broader queries appear early
    /// enough to break the streak once this guard has passed.
    pub fn min_queries_before_stop(&self, total_queries: usize) -> usize {
        (total_queries / 3).max(5)
    }

    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self {
            pause_ms: 0,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

/// Substitute the `{component}` placeholder, collapsing the gap it leaves
/// behind when no component is configured.
pub fn substitute_component(template: &str, component: &str) -> String {
    let component = component.trim();
    if !component.is_empty() {
        template.replace("{component}", component)
    } else {
        template.replace("{component}", "").replace("  ", " ").trim().to_string()
    }
}

/// Whitespace-normalized form used for duplicate query detection.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detail-fetch worker count: explicit request wins, otherwise 4 when a
/// token is present and 1 without (the unauthenticated quota is tiny).
pub(crate) fn effective_concurrency(requested: usize, has_token: bool) -> usize {
    if requested > 0 {
        requested
    } else if has_token {
        4
    } else {
        1
    }
}

/// Walk a paginated REST list endpoint and pull one string field from each
/// entry, skipping blanks. Used for comments and changed-file listings.
pub(crate) async fn paginated_field(
    api: &dyn SearchTransport,
    url: &str,
    field: &str,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut page: u32 = 1;
    loop {
        let params = [("per_page", "100".to_string()), ("page", page.to_string())];
        let Some(data) = api.get_json(url, &params, RatePool::Core, None).await else {
            break;
        };
        let Some(entries) = data.as_array() else {
            break;
        };
        if entries.is_empty() {
            break;
        }
        for entry in entries {
            if let Some(s) = entry.get(field).and_then(Value::as_str) {
                if !s.trim().is_empty() {
                    out.push(s.to_string());
                }
            }
        }
        if entries.len() < 100 {
            break;
        }
        page += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
