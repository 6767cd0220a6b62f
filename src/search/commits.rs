//! Commit collector: Search API over commit messages, keyed by SHA.
//!
//! Commit search rewrites the `created:` qualifier to `author-date:` and
//! needs its own Accept media type. No detail phase.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{normalize_query, substitute_component, StopPolicy};
use crate::config::SearchConfig;
use crate::github::{SearchEndpoint, SearchTransport};
use crate::observability::RunMetrics;
use crate::types::{truncate_chars, CommitHit, COMMIT_MESSAGE_MAX};

pub struct CommitCollector<'a> {
    api: &'a dyn SearchTransport,
    repo: String,
    pub results: BTreeMap<String, CommitHit>,
}

fn parse_commit(item: &Value) -> Option<CommitHit> {
    let sha = item.get("sha")?.as_str()?;
    if sha.is_empty() {
        return None;
    }
    let commit = &item["commit"];
    let author = &commit["author"];
    Some(CommitHit {
        sha: sha.to_string(),
        message: truncate_chars(
            commit["message"].as_str().unwrap_or_default(),
            COMMIT_MESSAGE_MAX,
        ),
        url: item["html_url"].as_str().unwrap_or_default().to_string(),
        author: author["name"].as_str().unwrap_or("unknown").to_string(),
        date: truncate_chars(author["date"].as_str().unwrap_or_default(), 10),
        changed_files: Vec::new(),
        matched_keywords: Default::default(),
        relevance_score: 0.0,
    })
}

impl<'a> CommitCollector<'a> {
    pub fn new(api: &'a dyn SearchTransport, repo: impl Into<String>) -> Self {
        Self {
            api,
            repo: repo.into(),
            results: BTreeMap::new(),
        }
    }

    /// Commit search filters on `author-date:` rather than `created:`.
    pub fn build_query(template: &str, config: &SearchConfig) -> String {
        let query = substitute_component(template, &config.component);
        let qualifiers = config.filter_qualifiers();
        if qualifiers.is_empty() {
            query
        } else {
            let qualifiers = qualifiers.replace("created:", "author-date:");
            format!("{query} {qualifiers}")
        }
    }

    pub async fn collect(
        &mut self,
        config: &SearchConfig,
        policy: &StopPolicy,
        metrics: &mut RunMetrics,
    ) {
        let nq = config.queries.len();
        info!(repo = %self.repo, queries = nq, "searching commits");

        let mut seen = HashSet::new();
        for (idx, template) in config.queries.iter().enumerate() {
            let i = idx + 1;
            let query = Self::build_query(template, config);
            let full_query = format!("repo:{} {}", self.repo, query);

            if !seen.insert(normalize_query(&full_query)) {
                debug!(n = i, total = nq, "skipping duplicate query");
                metrics.queries_skipped_duplicate += 1;
                continue;
            }

            info!(n = i, total = nq, %query, "searching");
            let items = self
                .api
                .search(SearchEndpoint::Commits, &full_query, 100, config.max_pages)
                .await;
            metrics.queries_issued += 1;

            let mut new_count = 0;
            for item in &items {
                if let Some(commit) = parse_commit(item) {
                    if !self.results.contains_key(&commit.sha) {
                        self.results.insert(commit.sha.clone(), commit);
                        new_count += 1;
                    }
                }
            }
            debug!(results = items.len(), new = new_count, "query finished");

            if self.results.len() >= policy.max_items {
                warn!(
                    collected = self.results.len(),
                    "commit ceiling reached, skipping remaining queries"
                );
                break;
            }
            if policy.pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(policy.pause_ms)).await;
            }
        }

        info!(unique = self.results.len(), "commit search finished");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
