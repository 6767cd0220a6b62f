//! Code collector: Search API over file contents, keyed by path.
//!
//! Code search needs authentication and uses the text-match media type so
//! results carry the matching fragment. No detail phase.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{normalize_query, substitute_component, StopPolicy};
use crate::config::SearchConfig;
use crate::github::{SearchEndpoint, SearchTransport};
use crate::observability::RunMetrics;
use crate::types::{truncate_chars, CodeHit, SNIPPET_MAX};

/// Code search returns smaller pages than the other endpoints.
const CODE_PER_PAGE: u32 = 50;

pub struct CodeCollector<'a> {
    api: &'a dyn SearchTransport,
    repo: String,
    pub results: BTreeMap<String, CodeHit>,
}

fn parse_code_hit(item: &Value, repo: &str) -> Option<CodeHit> {
    let path = item.get("path")?.as_str()?;
    if path.is_empty() {
        return None;
    }
    // Keep only the first text-match fragment; one is enough for a snippet.
    let snippet = item["text_matches"]
        .as_array()
        .and_then(|tms| {
            tms.iter()
                .filter_map(|tm| tm["fragment"].as_str())
                .find(|f| !f.is_empty())
        })
        .map(|f| truncate_chars(f, SNIPPET_MAX))
        .unwrap_or_default();

    Some(CodeHit {
        path: path.to_string(),
        url: item["html_url"].as_str().unwrap_or_default().to_string(),
        repo: repo.to_string(),
        sha: item["sha"].as_str().unwrap_or_default().to_string(),
        content_snippet: snippet,
        matched_keywords: Default::default(),
        relevance_score: 0.0,
    })
}

impl<'a> CodeCollector<'a> {
    pub fn new(api: &'a dyn SearchTransport, repo: impl Into<String>) -> Self {
        Self {
            api,
            repo: repo.into(),
            results: BTreeMap::new(),
        }
    }

    /// Code search supports no state/date qualifiers; only the component
    /// substitution applies.
    pub fn build_query(template: &str, config: &SearchConfig) -> String {
        substitute_component(template, &config.component)
    }

    pub async fn collect(
        &mut self,
        config: &SearchConfig,
        policy: &StopPolicy,
        metrics: &mut RunMetrics,
    ) {
        if !self.api.has_token() {
            warn!("code search requires GITHUB_TOKEN, skipping");
            return;
        }

        let nq = config.queries.len();
        info!(repo = %self.repo, queries = nq, "searching code");

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
                .search(SearchEndpoint::Code, &full_query, CODE_PER_PAGE, config.max_pages)
                .await;
            metrics.queries_issued += 1;

            let mut new_count = 0;
            for item in &items {
                if let Some(hit) = parse_code_hit(item, &self.repo) {
                    if !self.results.contains_key(&hit.path) {
                        self.results.insert(hit.path.clone(), hit);
                        new_count += 1;
                    }
                }
            }
            debug!(results = items.len(), new = new_count, "query finished");

            if self.results.len() >= policy.max_items {
                warn!(
                    collected = self.results.len(),
                    "code ceiling reached, skipping remaining queries"
                );
                break;
            }
            // Code search rate limits are stricter than the other endpoints.
            if policy.pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(policy.pause_ms * 2)).await;
            }
        }

        info!(unique = self.results.len(), "code search finished");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::FakeTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config(queries: &[&str]) -> SearchConfig {
        SearchConfig {
            repo: "octo/widgets".into(),
            queries: queries.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn code_item(path: &str, fragment: &str) -> Value {
        json!({
            "path": path,
            "html_url": format!("https://github.com/octo/widgets/blob/main/{path}"),
            "sha": "abc123",
            "text_matches": [{"fragment": fragment}],
        })
    }

    #[test]
    fn parse_takes_first_fragment() {
        let item = json!({
            "path": "src/a.rs",
            "html_url": "u",
            "sha": "s",
            "text_matches": [{"fragment": ""}, {"fragment": "fn crash()"}],
        });
        let hit = parse_code_hit(&item, "octo/widgets").unwrap();
        assert_eq!(hit.content_snippet, "fn crash()");
        assert_eq!(hit.repo, "octo/widgets");
    }

    #[test]
    fn parse_without_text_matches_gives_empty_snippet() {
        let item = json!({"path": "src/a.rs", "html_url": "u", "sha": "s"});
        let hit = parse_code_hit(&item, "octo/widgets").unwrap();
        assert!(hit.content_snippet.is_empty());
    }

    #[tokio::test]
    async fn collect_requires_token() {
        let mut fake = FakeTransport::default();
        fake.script_search(
            "repo:octo/widgets crash",
            vec![code_item("src/a.rs", "crash")],
        );

        let mut collector = CodeCollector::new(&fake, "octo/widgets");
        let mut metrics = RunMetrics::new();
        collector
            .collect(&config(&["crash"]), &StopPolicy::fast(), &mut metrics)
            .await;

        assert!(collector.results.is_empty());
        assert_eq!(fake.search_call_count(), 0);
    }

    #[tokio::test]
    async fn collect_keys_by_path() {
        let mut fake = FakeTransport::with_token();
        fake.script_search(
            "repo:octo/widgets crash",
            vec![
                code_item("src/a.rs", "crash here"),
                code_item("src/a.rs", "duplicate path"),
                code_item("src/b.rs", "crash there"),
            ],
        );

        let mut collector = CodeCollector::new(&fake, "octo/widgets");
        let mut metrics = RunMetrics::new();
        collector
            .collect(&config(&["crash"]), &StopPolicy::fast(), &mut metrics)
            .await;

        assert_eq!(collector.results.len(), 2);
        assert_eq!(collector.results["src/a.rs"].content_snippet, "crash here");
    }
}
