//! Issue collector: Search API phase plus borderline comment fetching.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    effective_concurrency, normalize_query, paginated_field, substitute_component, StopPolicy,
    DETAIL_PAUSE_MS,
};
use crate::config::SearchConfig;
use crate::github::{SearchEndpoint, SearchTransport, API_BASE};
use crate::observability::RunMetrics;
use crate::types::{truncate_chars, Issue, BODY_MAX};

pub struct IssueCollector<'a> {
    api: &'a dyn SearchTransport,
    repo: String,
    pub results: BTreeMap<u64, Issue>,
}

/// Pull an issue out of a Search API item. `None` only when the item has no
/// number, which would make it unusable downstream.
fn parse_issue(item: &Value) -> Option<Issue> {
    let number = item.get("number")?.as_u64()?;
    Some(Issue {
        number,
        title: item["title"].as_str().unwrap_or_default().to_string(),
        state: item["state"].as_str().unwrap_or_default().to_string(),
        url: item["html_url"].as_str().unwrap_or_default().to_string(),
        labels: item["labels"]
            .as_array()
            .map(|ls| {
                ls.iter()
                    .filter_map(|l| l["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        created_at: truncate_chars(item["created_at"].as_str().unwrap_or_default(), 10),
        body: truncate_chars(item["body"].as_str().unwrap_or_default(), BODY_MAX),
        comments_text: String::new(),
        comments_fetched: false,
        matched_keywords: Default::default(),
        matched_in_comments: Default::default(),
        relevance_score: 0.0,
    })
}

async fn fetch_comments(api: &dyn SearchTransport, repo: &str, number: u64) -> String {
    let url = format!("{API_BASE}/repos/{repo}/issues/{number}/comments");
    paginated_field(api, &url, "body").await.join("\n\n")
}

impl<'a> IssueCollector<'a> {
    pub fn new(api: &'a dyn SearchTransport, repo: impl Into<String>) -> Self {
        Self {
            api,
            repo: repo.into(),
            results: BTreeMap::new(),
        }
    }

    /// Substitute the component and append state/date qualifiers.
    pub fn build_query(template: &str, config: &SearchConfig) -> String {
        let query = substitute_component(template, &config.component);
        let qualifiers = config.filter_qualifiers();
        if qualifiers.is_empty() {
            query
        } else {
            format!("{query} {qualifiers}")
        }
    }

    /// Phase 1: run the query templates, keeping the first copy of each
    /// issue. Stops early on the result ceiling or a zero-new-result streak.
    pub async fn collect(
        &mut self,
        config: &SearchConfig,
        policy: &StopPolicy,
        metrics: &mut RunMetrics,
    ) {
        let nq = config.queries.len();
        info!(repo = %self.repo, queries = nq, "searching issues (title + body)");

        let mut seen = HashSet::new();
        let mut zero_streak = 0usize;

        for (idx, template) in config.queries.iter().enumerate() {
            let i = idx + 1;
            let query = Self::build_query(template, config);
            let full_query = format!("repo:{} is:issue {}", self.repo, query);

            if !seen.insert(normalize_query(&full_query)) {
                debug!(n = i, total = nq, %query, "skipping duplicate query");
                metrics.queries_skipped_duplicate += 1;
                continue;
            }

            info!(n = i, total = nq, %query, "searching");
            let items = self
                .api
                .search(SearchEndpoint::Issues, &full_query, 100, config.max_pages)
                .await;
            metrics.queries_issued += 1;

            let mut new_count = 0;
            for item in &items {
                if let Some(issue) = parse_issue(item) {
                    if !self.results.contains_key(&issue.number) {
                        self.results.insert(issue.number, issue);
                        new_count += 1;
                    }
                }
            }
            debug!(
                results = items.len(),
                new = new_count,
                unique = self.results.len(),
                "query finished"
            );

            if self.results.len() >= policy.max_items {
                warn!(
                    collected = self.results.len(),
                    "issue ceiling reached, skipping remaining queries"
                );
                break;
            }
            if new_count == 0 {
                zero_streak += 1;
                if zero_streak >= policy.zero_streak && i > policy.min_queries_before_stop(nq) {
                    info!(
                        executed = i,
                        total = nq,
                        "consecutive queries with no new results, stopping early"
                    );
                    break;
                }
            } else {
                zero_streak = 0;
            }
            if policy.pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(policy.pause_ms)).await;
            }
        }

        info!(unique = self.results.len(), "issue collection finished");
    }

    /// Phase 2: fetch comments for borderline-scored issues and record which
    /// keywords appear in them. High scorers are already relevant and low
    /// scorers are not worth the quota.
    pub async fn fetch_details(
        &mut self,
        config: &SearchConfig,
        low_threshold: f64,
        high_threshold: f64,
        concurrency: usize,
        metrics: &mut RunMetrics,
    ) {
        let borderline: Vec<u64> = self
            .results
            .values()
            .filter(|i| {
                low_threshold <= i.relevance_score
                    && i.relevance_score < high_threshold
                    && !i.comments_fetched
            })
            .map(|i| i.number)
            .collect();

        if borderline.is_empty() {
            info!("no borderline issues need comment fetching");
            return;
        }

        let concurrency = effective_concurrency(concurrency, self.api.has_token());
        info!(
            count = borderline.len(),
            concurrency,
            low = low_threshold,
            high = high_threshold,
            "fetching comments for borderline issues"
        );
        if !self.api.has_token() && borderline.len() > 50 {
            warn!(
                count = borderline.len(),
                "no GITHUB_TOKEN; comment fetching will be slow (60 requests/hour)"
            );
        }

        let api = self.api;
        let repo = self.repo.clone();
        let sequential = concurrency == 1;
        let total = borderline.len();

        // Owned iteration: a by-ref closure returning an async block does
        // not satisfy the higher-ranked FnOnce bound tokio::spawn needs.
        let fetched: Vec<(u64, String)> = stream::iter(borderline.into_iter().map(|number| {
            let repo = repo.clone();
            async move {
                let text = fetch_comments(api, &repo, number).await;
                if sequential {
                    tokio::time::sleep(Duration::from_millis(DETAIL_PAUSE_MS)).await;
                }
                (number, text)
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        metrics.detail_fetches += fetched.len();
        for (number, text) in fetched {
            let Some(issue) = self.results.get_mut(&number) else {
                continue;
            };
            if !text.is_empty() {
                let lower = text.to_lowercase();
                for keyword in config.keywords.all_keywords() {
                    if lower.contains(&keyword.to_lowercase()) {
                        issue.matched_in_comments.insert(keyword.clone());
                    }
                }
            }
            issue.comments_text = text;
            issue.comments_fetched = true;
        }

        info!(count = total, "issue comment fetching finished");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
