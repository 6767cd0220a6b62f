//! End-to-end pipeline tests against a scripted transport.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use gitscout::config::{KeywordTiers, SearchConfig};
use gitscout::github::{RatePool, SearchEndpoint, SearchTransport};
use gitscout::pipeline::{self, CommentsMode, RunOptions};
use gitscout::report::{format_full_json, format_full_report, ReportOptions};
use gitscout::search::StopPolicy;

/// Minimal scripted transport: search answers keyed by full query string.
#[derive(Default)]
struct ScriptedTransport {
    token: bool,
    search_results: HashMap<String, Vec<Value>>,
}

impl ScriptedTransport {
    fn script(&mut self, full_query: &str, items: Vec<Value>) {
        self.search_results.insert(full_query.to_string(), items);
    }
}

#[async_trait]
impl SearchTransport for ScriptedTransport {
    fn has_token(&self) -> bool {
        self.token
    }

    async fn check_core_budget(&self) -> u64 {
        5000
    }

    async fn get_json(
        &self,
        _url: &str,
        _params: &[(&str, String)],
        _pool: RatePool,
        _accept: Option<&str>,
    ) -> Option<Value> {
        Some(Value::Array(vec![]))
    }

    async fn search(
        &self,
        _endpoint: SearchEndpoint,
        query: &str,
        _per_page: u32,
        _max_pages: u32,
    ) -> Vec<Value> {
        self.search_results.get(query).cloned().unwrap_or_default()
    }

    async fn graphql(&self, _query: &str, _variables: Value) -> Option<Value> {
        None
    }
}

fn issue_item(number: u64, title: &str, body: &str) -> Value {
    json!({
        "number": number,
        "title": title,
        "state": "open",
        "html_url": format!("https://github.com/octo/widgets/issues/{number}"),
        "labels": ["bug"],
        "created_at": "2024-03-01T00:00:00Z",
        "body": body,
    })
}

fn pr_item(number: u64, title: &str, body: &str) -> Value {
    json!({
        "number": number,
        "title": title,
        "state": "closed",
        "html_url": format!("https://github.com/octo/widgets/pull/{number}"),
        "labels": [],
        "created_at": "2024-03-05T00:00:00Z",
        "body": body,
        "pull_request": {"merged_at": "2024-03-06T00:00:00Z"},
    })
}

fn config(types: &[&str]) -> SearchConfig {
    SearchConfig {
        repo: "octo/widgets".into(),
        component: "renderer".into(),
        topic: "crash on resize".into(),
        search_types: types.iter().map(|s| s.to_string()).collect(),
        queries: vec!["crash".into()],
        keywords: KeywordTiers::new(
            vec!["crash".into()],
            vec!["resize".into()],
            vec!["window".into()],
        ),
        ..Default::default()
    }
}

fn fast_opts() -> RunOptions {
    RunOptions {
        comments: CommentsMode::Disabled,
        policy: StopPolicy {
            pause_ms: 0,
            ..StopPolicy::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn issues_and_prs_produce_scored_report_with_cross_references() {
    let mut fake = ScriptedTransport { token: true, ..Default::default() };
    fake.script(
        "repo:octo/widgets is:issue crash",
        vec![
            issue_item(42, "renderer crash on resize", "crash when resizing the window"),
            issue_item(43, "docs typo", "unrelated"),
        ],
    );
    fake.script(
        "repo:octo/widgets is:pr crash",
        vec![pr_item(70, "fix renderer crash", "fixes #42")],
    );

    let cfg = config(&["issues", "prs"]);
    let outcome = pipeline::run(Arc::new(fake), cfg.clone(), fast_opts())
        .await
        .unwrap();

    // Scoring: keyword-matched issue well above the unrelated one.
    let issues = outcome.results.issues.as_ref().unwrap();
    assert!(issues[&42].relevance_score > issues[&43].relevance_score);
    assert!(issues[&42].matched_keywords.contains("crash"));

    // Cross-references: the fixing PR links back to the issue.
    let xref = outcome.xref.as_ref().unwrap();
    assert_eq!(xref.issue_to_prs[&42], vec![70]);
    assert_eq!(xref.pr_to_issues[&70], vec![42]);

    // Markdown report carries every section plus the xref table.
    let report = format_full_report(
        &cfg,
        &outcome.results,
        outcome.xref.as_ref(),
        &ReportOptions::new(3.0, false, 10),
    );
    assert!(report.contains("## Executive Summary"));
    assert!(report.contains("# Issues"));
    assert!(report.contains("# Pull Requests"));
    assert!(report.contains("## Cross References"));
    assert!(report.contains("[#42](https://github.com/octo/widgets/issues/42)"));

    // JSON mirror parses and agrees on counts.
    let json_report = format_full_json(&cfg, &outcome.results, &ReportOptions::new(3.0, false, 10));
    let parsed: Value = serde_json::from_str(&json_report).unwrap();
    assert_eq!(parsed["issues"]["total_searched"], 2);
    assert_eq!(parsed["pull_requests"]["items"][0]["number"], 70);
}

#[tokio::test]
async fn cache_file_round_trips_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");

    let mut fake = ScriptedTransport::default();
    fake.script(
        "repo:octo/widgets is:issue crash",
        vec![issue_item(42, "renderer crash", "boom")],
    );
    let mut opts = fast_opts();
    opts.cache_file = Some(cache_path.clone());
    pipeline::run(Arc::new(fake), config(&["issues"]), opts)
        .await
        .unwrap();
    assert!(cache_path.exists());

    // Second run finds nothing new; the cached issue survives.
    let mut opts = fast_opts();
    opts.cache_file = Some(cache_path);
    opts.resume = true;
    let outcome = pipeline::run(
        Arc::new(ScriptedTransport::default()),
        config(&["issues"]),
        opts,
    )
    .await
    .unwrap();

    assert!(outcome.resumed);
    assert_eq!(outcome.metrics.items_from_cache, 1);
    let issues = outcome.results.issues.as_ref().unwrap();
    assert!(issues.contains_key(&42));
    assert!(issues[&42].relevance_score > 0.0);
}

#[tokio::test]
async fn single_linkable_type_skips_cross_references() {
    let mut fake = ScriptedTransport::default();
    fake.script(
        "repo:octo/widgets is:issue crash",
        vec![issue_item(42, "crash", "boom")],
    );
    let outcome = pipeline::run(Arc::new(fake), config(&["issues"]), fast_opts())
        .await
        .unwrap();
    assert!(outcome.xref.is_none());
}
