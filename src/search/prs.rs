//! Pull request collector: Search API phase plus review-comment and
//! changed-file fetching for borderline PRs.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    effective_concurrency, normalize_query, paginated_field, substitute_component, StopPolicy,
    DETAIL_PAUSE_MS,
};
use crate::config::SearchConfig;
use crate::github::{SearchEndpoint, SearchTransport, API_BASE};
use crate::observability::RunMetrics;
use crate::types::{truncate_chars, PullRequest, BODY_MAX};

/// Linked-issue phrases in a PR body: "fixes #123", "closes #456", ...
static LINKED_ISSUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:fix(?:es|ed)?|close(?:s|d)?|resolve(?:s|d)?)\s+#(\d+)")
        .expect("static regex")
});

pub struct PrCollector<'a> {
    api: &'a dyn SearchTransport,
    repo: String,
    pub results: BTreeMap<u64, PullRequest>,
}

fn parse_pr(item: &Value) -> Option<PullRequest> {
    let number = item.get("number")?.as_u64()?;
    let body = truncate_chars(item["body"].as_str().unwrap_or_default(), BODY_MAX);
    let linked_issues: Vec<u64> = LINKED_ISSUE_RE
        .captures_iter(&body)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    // The search payload carries merged_at inside the pull_request stub.
    let merged = item["pull_request"]["merged_at"].as_str().is_some();

    Some(PullRequest {
        number,
        title: item["title"].as_str().unwrap_or_default().to_string(),
        state: item["state"].as_str().unwrap_or_default().to_string(),
        merged,
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
        body,
        review_comments_text: String::new(),
        comments_fetched: false,
        linked_issues,
        changed_files: Vec::new(),
        matched_keywords: Default::default(),
        matched_in_comments: Default::default(),
        relevance_score: 0.0,
    })
}

/// Review comments plus the general discussion thread, concatenated.
async fn fetch_review_comments(api: &dyn SearchTransport, repo: &str, number: u64) -> String {
    let review_url = format!("{API_BASE}/repos/{repo}/pulls/{number}/comments");
    let mut comments = paginated_field(api, &review_url, "body").await;
    let issue_url = format!("{API_BASE}/repos/{repo}/issues/{number}/comments");
    comments.extend(paginated_field(api, &issue_url, "body").await);
    comments.join("\n\n")
}

async fn fetch_changed_files(api: &dyn SearchTransport, repo: &str, number: u64) -> Vec<String> {
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}/files");
    paginated_field(api, &url, "filename").await
}

impl<'a> PrCollector<'a> {
    pub fn new(api: &'a dyn SearchTransport, repo: impl Into<String>) -> Self {
        Self {
            api,
            repo: repo.into(),
            results: BTreeMap::new(),
        }
    }

    pub fn build_query(template: &str, config: &SearchConfig) -> String {
        let query = substitute_component(template, &config.component);
        let qualifiers = config.filter_qualifiers();
        if qualifiers.is_empty() {
            query
        } else {
            format!("{query} {qualifiers}")
        }
    }

    /// Phase 1: run the query templates with `is:pr`, keeping the first copy
    /// of each PR. Same early-stop rules as the issue collector.
    pub async fn collect(
        &mut self,
        config: &SearchConfig,
        policy: &StopPolicy,
        metrics: &mut RunMetrics,
    ) {
        let nq = config.queries.len();
        info!(repo = %self.repo, queries = nq, "searching pull requests (title + body)");

        let mut seen = HashSet::new();
        let mut zero_streak = 0usize;

        for (idx, template) in config.queries.iter().enumerate() {
            let i = idx + 1;
            let query = Self::build_query(template, config);
            let full_query = format!("repo:{} is:pr {}", self.repo, query);

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
                if let Some(pr) = parse_pr(item) {
                    if !self.results.contains_key(&pr.number) {
                        self.results.insert(pr.number, pr);
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
                    "PR ceiling reached, skipping remaining queries"
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

        info!(unique = self.results.len(), "PR collection finished");
    }

    /// Phase 2: review comments + changed files for borderline PRs.
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
            .filter(|p| {
                low_threshold <= p.relevance_score
                    && p.relevance_score < high_threshold
                    && !p.comments_fetched
            })
            .map(|p| p.number)
            .collect();

        if borderline.is_empty() {
            info!("no borderline PRs need detail fetching");
            return;
        }

        let concurrency = effective_concurrency(concurrency, self.api.has_token());
        info!(
            count = borderline.len(),
            concurrency,
            low = low_threshold,
            high = high_threshold,
            "fetching review comments and changed files for borderline PRs"
        );

        let api = self.api;
        let repo = self.repo.clone();
        let sequential = concurrency == 1;
        let total = borderline.len();

        // Owned iteration: a by-ref closure returning an async block does
        // not satisfy the higher-ranked FnOnce bound tokio::spawn needs.
        let fetched: Vec<(u64, String, Vec<String>)> =
            stream::iter(borderline.into_iter().map(|number| {
                let repo = repo.clone();
                async move {
                    let comments = fetch_review_comments(api, &repo, number).await;
                    let files = fetch_changed_files(api, &repo, number).await;
                    if sequential {
                        tokio::time::sleep(Duration::from_millis(DETAIL_PAUSE_MS)).await;
                    }
                    (number, comments, files)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        metrics.detail_fetches += fetched.len();
        for (number, comments, files) in fetched {
            let Some(pr) = self.results.get_mut(&number) else {
                continue;
            };
            if !comments.is_empty() {
                let lower = comments.to_lowercase();
                for keyword in config.keywords.all_keywords() {
                    if lower.contains(&keyword.to_lowercase()) {
                        pr.matched_in_comments.insert(keyword.clone());
                    }
                }
            }
            pr.review_comments_text = comments;
            pr.changed_files = files;
            pr.comments_fetched = true;
        }

        info!(count = total, "PR detail fetching finished");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordTiers;
    use crate::search::testing::FakeTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn config(queries: &[&str]) -> SearchConfig {
        SearchConfig {
            repo: "octo/widgets".into(),
            queries: queries.iter().map(|s| s.to_string()).collect(),
            keywords: KeywordTiers::new(vec!["crash".into()], vec![], vec![]),
            ..Default::default()
        }
    }

    fn pr_item(number: u64, body: &str, merged: bool) -> Value {
        json!({
            "number": number,
            "title": format!("pr {number}"),
            "state": "closed",
            "html_url": format!("https://github.com/octo/widgets/pull/{number}"),
            "labels": [],
            "created_at": "2024-02-10T08:00:00Z",
            "body": body,
            "pull_request": {
                "merged_at": if merged { json!("2024-02-11T08:00:00Z") } else { Value::Null }
            },
        })
    }

    #[test_case("fixes #42 and resolves #77", &[42, 77] ; "two_links")]
    #[test_case("Closed #99 by rework", &[99] ; "closed_variant")]
    #[test_case("relates to #12", &[] ; "plain_ref_not_linked")]
    fn parse_extracts_linked_issues(body: &str, expected: &[u64]) {
        let pr = parse_pr(&pr_item(1, body, false)).unwrap();
        assert_eq!(pr.linked_issues, expected);
    }

    #[test]
    fn parse_detects_merged_from_stub() {
        assert!(parse_pr(&pr_item(1, "", true)).unwrap().merged);
        assert!(!parse_pr(&pr_item(1, "", false)).unwrap().merged);
    }

    #[tokio::test]
    async fn collect_uses_pr_qualifier() {
        let mut fake = FakeTransport::with_token();
        fake.script_search(
            "repo:octo/widgets is:pr crash",
            vec![pr_item(5, "crash here", true)],
        );

        let mut collector = PrCollector::new(&fake, "octo/widgets");
        let mut metrics = RunMetrics::new();
        collector
            .collect(&config(&["crash"]), &StopPolicy::fast(), &mut metrics)
            .await;

        assert_eq!(collector.results.len(), 1);
        assert!(collector.results[&5].merged);
    }

    #[tokio::test]
    async fn fetch_details_combines_comment_threads_and_files() {
        let mut fake = FakeTransport::with_token();
        fake.script_get(
            "https://api.github.com/repos/octo/widgets/pulls/5/comments",
            json!([{"body": "review: crash confirmed"}]),
        );
        fake.script_get(
            "https://api.github.com/repos/octo/widgets/issues/5/comments",
            json!([{"body": "general discussion"}]),
        );
        fake.script_get(
            "https://api.github.com/repos/octo/widgets/pulls/5/files",
            json!([{"filename": "src/renderer/draw.rs"}, {"filename": "src/lib.rs"}]),
        );

        let mut collector = PrCollector::new(&fake, "octo/widgets");
        let mut pr = parse_pr(&pr_item(5, "", false)).unwrap();
        pr.relevance_score = 5.0;
        collector.results.insert(5, pr);

        let mut metrics = RunMetrics::new();
        collector
            .fetch_details(&config(&[]), 3.0, 8.0, 0, &mut metrics)
            .await;

        let pr = &collector.results[&5];
        assert!(pr.comments_fetched);
        assert_eq!(
            pr.review_comments_text,
            "review: crash confirmed\n\ngeneral discussion"
        );
        assert_eq!(pr.changed_files, vec!["src/renderer/draw.rs", "src/lib.rs"]);
        assert!(pr.matched_in_comments.contains("crash"));
    }
}
