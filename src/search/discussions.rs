//! Discussion collector: GraphQL search, comments included inline.
//!
//! The GraphQL API is unavailable without authentication, so this collector
//! skips entirely when no token is configured.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{normalize_query, substitute_component, StopPolicy};
use crate::config::SearchConfig;
use crate::github::SearchTransport;
use crate::observability::RunMetrics;
use crate::types::{truncate_chars, DiscussionHit, BODY_MAX};

/// Per-query ceiling on fetched discussions across pages.
const MAX_DISCUSSIONS_PER_QUERY: usize = 200;
const PAGE_SIZE: u32 = 50;

const SEARCH_QUERY: &str = r#"
query($query: String!, $first: Int!, $after: String) {
  search(query: $query, type: DISCUSSION, first: $first, after: $after) {
    discussionCount
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      ... on Discussion {
        number
        title
        url
        createdAt
        body
        category {
          name
        }
        answer {
          body
        }
        comments(first: 10) {
          nodes {
            body
          }
        }
      }
    }
  }
}
"#;

pub struct DiscussionCollector<'a> {
    api: &'a dyn SearchTransport,
    repo: String,
    pub results: BTreeMap<u64, DiscussionHit>,
}

fn parse_discussion(node: &Value) -> Option<DiscussionHit> {
    let number = node.get("number")?.as_u64()?;
    let comments_text = node["comments"]["nodes"]
        .as_array()
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|c| c["body"].as_str())
                .filter(|b| !b.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default();

    Some(DiscussionHit {
        number,
        title: node["title"].as_str().unwrap_or_default().to_string(),
        url: node["url"].as_str().unwrap_or_default().to_string(),
        category: node["category"]["name"].as_str().unwrap_or_default().to_string(),
        created_at: truncate_chars(node["createdAt"].as_str().unwrap_or_default(), 10),
        body: truncate_chars(node["body"].as_str().unwrap_or_default(), BODY_MAX),
        answer_body: node["answer"]["body"].as_str().unwrap_or_default().to_string(),
        comments_text,
        matched_keywords: Default::default(),
        matched_in_comments: Default::default(),
        relevance_score: 0.0,
    })
}

impl<'a> DiscussionCollector<'a> {
    pub fn new(api: &'a dyn SearchTransport, repo: impl Into<String>) -> Self {
        Self {
            api,
            repo: repo.into(),
            results: BTreeMap::new(),
        }
    }

    /// Discussions support no state/date qualifiers.
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
            warn!("discussion search requires GITHUB_TOKEN, skipping");
            return;
        }

        let nq = config.queries.len();
        info!(repo = %self.repo, queries = nq, "searching discussions (GraphQL)");

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
            metrics.queries_issued += 1;

            let mut after: Option<String> = None;
            let mut total_items = 0usize;
            let mut new_count = 0usize;
            loop {
                let variables = json!({
                    "query": full_query,
                    "first": PAGE_SIZE,
                    "after": after,
                });
                let Some(data) = self.api.graphql(SEARCH_QUERY, variables).await else {
                    break;
                };
                let search = &data["search"];
                let Some(nodes) = search["nodes"].as_array() else {
                    break;
                };
                if nodes.is_empty() {
                    break;
                }

                for node in nodes {
                    if let Some(disc) = parse_discussion(node) {
                        if !self.results.contains_key(&disc.number) {
                            self.results.insert(disc.number, disc);
                            new_count += 1;
                        }
                    }
                }
                total_items += nodes.len();

                let page_info = &search["pageInfo"];
                let has_next = page_info["hasNextPage"].as_bool().unwrap_or(false);
                if has_next && total_items < MAX_DISCUSSIONS_PER_QUERY {
                    after = page_info["endCursor"].as_str().map(str::to_string);
                    if policy.pause_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(policy.pause_ms)).await;
                    }
                } else {
                    break;
                }
            }
            debug!(results = total_items, new = new_count, "query finished");

            if self.results.len() >= policy.max_items {
                warn!(
                    collected = self.results.len(),
                    "discussion ceiling reached, skipping remaining queries"
                );
                break;
            }
            if policy.pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(policy.pause_ms)).await;
            }
        }

        info!(unique = self.results.len(), "discussion search finished");
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

    fn config(queries: &[&str]) -> SearchConfig {
        SearchConfig {
            repo: "octo/widgets".into(),
            queries: queries.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn discussion_node(number: u64, title: &str) -> Value {
        json!({
            "number": number,
            "title": title,
            "url": format!("https://github.com/octo/widgets/discussions/{number}"),
            "createdAt": "2024-05-01T00:00:00Z",
            "body": "discussion body",
            "category": {"name": "Q&A"},
            "answer": {"body": "the answer"},
            "comments": {"nodes": [{"body": "first"}, {"body": "second"}]},
        })
    }

    fn page(nodes: Vec<Value>, has_next: bool, cursor: &str) -> Value {
        json!({
            "search": {
                "discussionCount": nodes.len(),
                "pageInfo": {"hasNextPage": has_next, "endCursor": cursor},
                "nodes": nodes,
            }
        })
    }

    #[test]
    fn parse_joins_comments_and_reads_answer() {
        let disc = parse_discussion(&discussion_node(3, "why")).unwrap();
        assert_eq!(disc.comments_text, "first\n\nsecond");
        assert_eq!(disc.answer_body, "the answer");
        assert_eq!(disc.category, "Q&A");
        assert_eq!(disc.created_at, "2024-05-01");
    }

    #[test]
    fn parse_tolerates_missing_answer_and_category() {
        let node = json!({
            "number": 4, "title": "t", "url": "u",
            "createdAt": "2024-05-01T00:00:00Z", "body": "b",
            "category": null, "answer": null, "comments": {"nodes": []},
        });
        let disc = parse_discussion(&node).unwrap();
        assert!(disc.answer_body.is_empty());
        assert!(disc.category.is_empty());
        assert!(disc.comments_text.is_empty());
    }

    #[tokio::test]
    async fn collect_skips_without_token() {
        let fake = FakeTransport::default();
        let mut collector = DiscussionCollector::new(&fake, "octo/widgets");
        let mut metrics = RunMetrics::new();
        collector
            .collect(&config(&["crash"]), &StopPolicy::fast(), &mut metrics)
            .await;
        assert!(collector.results.is_empty());
        assert_eq!(metrics.queries_issued, 0);
    }

    #[tokio::test]
    async fn collect_paginates_until_last_page() {
        let mut fake = FakeTransport::with_token();
        fake.script_graphql(page(vec![discussion_node(1, "a")], true, "CURSOR1"));
        fake.script_graphql(page(vec![discussion_node(2, "b")], false, ""));

        let mut collector = DiscussionCollector::new(&fake, "octo/widgets");
        let mut metrics = RunMetrics::new();
        collector
            .collect(&config(&["crash"]), &StopPolicy::fast(), &mut metrics)
            .await;

        assert_eq!(collector.results.len(), 2);
        assert!(collector.results.contains_key(&1));
        assert!(collector.results.contains_key(&2));
    }
}
