//! Run orchestration: prepare the config, run one collector per content
//! type (parallel by default), score, fetch borderline details, build the
//! cross-reference map, and fold everything into a [`RunOutcome`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::ResultCache;
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::github::SearchTransport;
use crate::observability::RunMetrics;
use crate::query::{build_queries, merge_seed_synonyms};
use crate::score::RelevanceScorer;
use crate::search::{
    CodeCollector, CommitCollector, DiscussionCollector, IssueCollector, PrCollector, StopPolicy,
};
use crate::types::{ContentType, ResultSet, SearchItem};
use crate::xref::{build_cross_references, CrossRefMap};

/// Minimum core-API budget before auto-enabled comment search kicks in.
const AUTO_COMMENTS_MIN_BUDGET: u64 = 50;

/// Score threshold for the "highly relevant" console count.
pub const HIGH_SCORE: f64 = 8.0;

// ---------------------------------------------------------------------------
// Options and outcome
// ---------------------------------------------------------------------------

/// Comment-search selection: auto-detect by default, with explicit force
/// and disable overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentsMode {
    #[default]
    Auto,
    Forced,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub comments: CommentsMode,
    pub comments_low: f64,
    pub comments_high: f64,
    pub concurrency: usize,
    pub cache_file: Option<PathBuf>,
    pub resume: bool,
    pub no_parallel: bool,
    pub policy: StopPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            comments: CommentsMode::Auto,
            comments_low: 3.0,
            comments_high: 8.0,
            concurrency: 0,
            cache_file: None,
            resume: false,
            no_parallel: false,
            policy: StopPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub results: ResultSet,
    pub xref: Option<CrossRefMap>,
    pub searched_comments: bool,
    pub resumed: bool,
    pub metrics: RunMetrics,
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareSummary {
    /// Keywords the seed synonym db contributed.
    pub seed_added: usize,
    /// Queries auto-built from keywords; zero when the config supplied them.
    pub queries_built: usize,
}

/// Validate the config, merge seed synonyms, and auto-build queries when
/// none were supplied.
pub fn prepare(config: &mut SearchConfig) -> Result<PrepareSummary> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let seed_added = merge_seed_synonyms(config);
    let mut queries_built = 0;
    if config.queries.is_empty() {
        config.queries = build_queries(config);
        queries_built = config.queries.len();
        if config.queries.is_empty() {
            return Err(Error::Config(
                "no search queries provided and none could be built from keywords".into(),
            ));
        }
        info!(
            queries = queries_built,
            keywords = config.keywords.total(),
            "auto-built queries from keyword tiers"
        );
    }

    let total_keywords = config.keywords.total();
    if total_keywords == 0 {
        warn!("no scoring keywords configured; results will rank on component hits only");
    } else if total_keywords < 10 {
        warn!(
            total = total_keywords,
            "few keywords configured; consider expanding synonyms for better recall"
        );
    }

    Ok(PrepareSummary {
        seed_added,
        queries_built,
    })
}

// ---------------------------------------------------------------------------
// Per-type execution
// ---------------------------------------------------------------------------

enum TypeMap {
    Issues(BTreeMap<u64, crate::types::Issue>),
    Prs(BTreeMap<u64, crate::types::PullRequest>),
    Code(BTreeMap<String, crate::types::CodeHit>),
    Commits(BTreeMap<String, crate::types::CommitHit>),
    Discussions(BTreeMap<u64, crate::types::DiscussionHit>),
}

struct TypeOutcome {
    items: TypeMap,
    resumed: bool,
    metrics: RunMetrics,
}

type SharedCache = Arc<Mutex<ResultCache>>;

async fn restore_section(
    cache: &Option<SharedCache>,
    resume: bool,
    content_type: ContentType,
) -> Vec<SearchItem> {
    if !resume {
        return Vec::new();
    }
    match cache {
        Some(cache) => cache
            .lock()
            .await
            .load(content_type)
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

async fn save_section(cache: &Option<SharedCache>, content_type: ContentType, items: Vec<SearchItem>) {
    if let Some(cache) = cache {
        // Lock covers the read-modify-write on the shared cache file.
        if let Err(err) = cache.lock().await.save(content_type, items) {
            error!(%err, section = %content_type, "cache save failed");
        }
    }
}

async fn run_type(
    api: Arc<dyn SearchTransport>,
    config: Arc<SearchConfig>,
    opts: Arc<RunOptions>,
    cache: Option<SharedCache>,
    content_type: ContentType,
    search_comments: bool,
) -> TypeOutcome {
    let started = Instant::now();
    let scorer = RelevanceScorer::new(&config);
    let mut metrics = RunMetrics::new();

    let restored = restore_section(&cache, opts.resume, content_type).await;

    let items = match content_type {
        ContentType::Issues => {
            let mut collector = IssueCollector::new(api.as_ref(), &config.repo);
            for item in restored {
                if let SearchItem::Issue(issue) = item {
                    if !collector.results.contains_key(&issue.number) {
                        collector.results.insert(issue.number, issue);
                        metrics.items_from_cache += 1;
                    }
                }
            }
            collector.collect(&config, &opts.policy, &mut metrics).await;
            scorer.score_issues(&mut collector.results);
            if search_comments {
                collector
                    .fetch_details(
                        &config,
                        opts.comments_low,
                        opts.comments_high,
                        opts.concurrency,
                        &mut metrics,
                    )
                    .await;
                scorer.score_issues(&mut collector.results);
            }
            metrics.items_collected += collector.results.len();
            let snapshot = collector.results.values().cloned().map(Into::into).collect();
            save_section(&cache, content_type, snapshot).await;
            TypeMap::Issues(collector.results)
        }
        ContentType::Prs => {
            let mut collector = PrCollector::new(api.as_ref(), &config.repo);
            for item in restored {
                if let SearchItem::Pr(pr) = item {
                    if !collector.results.contains_key(&pr.number) {
                        collector.results.insert(pr.number, pr);
                        metrics.items_from_cache += 1;
                    }
                }
            }
            collector.collect(&config, &opts.policy, &mut metrics).await;
            scorer.score_prs(&mut collector.results);
            if search_comments {
                collector
                    .fetch_details(
                        &config,
                        opts.comments_low,
                        opts.comments_high,
                        opts.concurrency,
                        &mut metrics,
                    )
                    .await;
                scorer.score_prs(&mut collector.results);
            }
            metrics.items_collected += collector.results.len();
            let snapshot = collector.results.values().cloned().map(Into::into).collect();
            save_section(&cache, content_type, snapshot).await;
            TypeMap::Prs(collector.results)
        }
        ContentType::Code => {
            let mut collector = CodeCollector::new(api.as_ref(), &config.repo);
            for item in restored {
                if let SearchItem::Code(hit) = item {
                    if !collector.results.contains_key(&hit.path) {
                        collector.results.insert(hit.path.clone(), hit);
                        metrics.items_from_cache += 1;
                    }
                }
            }
            collector.collect(&config, &opts.policy, &mut metrics).await;
            scorer.score_code(&mut collector.results);
            metrics.items_collected += collector.results.len();
            let snapshot = collector.results.values().cloned().map(Into::into).collect();
            save_section(&cache, content_type, snapshot).await;
            TypeMap::Code(collector.results)
        }
        ContentType::Commits => {
            let mut collector = CommitCollector::new(api.as_ref(), &config.repo);
            for item in restored {
                if let SearchItem::Commit(commit) = item {
                    if !collector.results.contains_key(&commit.sha) {
                        collector.results.insert(commit.sha.clone(), commit);
                        metrics.items_from_cache += 1;
                    }
                }
            }
            collector.collect(&config, &opts.policy, &mut metrics).await;
            scorer.score_commits(&mut collector.results);
            metrics.items_collected += collector.results.len();
            let snapshot = collector.results.values().cloned().map(Into::into).collect();
            save_section(&cache, content_type, snapshot).await;
            TypeMap::Commits(collector.results)
        }
        ContentType::Discussions => {
            let mut collector = DiscussionCollector::new(api.as_ref(), &config.repo);
            for item in restored {
                if let SearchItem::Discussion(disc) = item {
                    if !collector.results.contains_key(&disc.number) {
                        collector.results.insert(disc.number, disc);
                        metrics.items_from_cache += 1;
                    }
                }
            }
            collector.collect(&config, &opts.policy, &mut metrics).await;
            scorer.score_discussions(&mut collector.results);
            metrics.items_collected += collector.results.len();
            let snapshot = collector.results.values().cloned().map(Into::into).collect();
            save_section(&cache, content_type, snapshot).await;
            TypeMap::Discussions(collector.results)
        }
    };

    let resumed = metrics.items_from_cache > 0;
    info!(
        section = %content_type,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search type finished"
    );
    TypeOutcome {
        items,
        resumed,
        metrics,
    }
}

fn fold_outcome(results: &mut ResultSet, outcome: TypeOutcome) {
    match outcome.items {
        TypeMap::Issues(map) => results.issues = Some(map),
        TypeMap::Prs(map) => results.prs = Some(map),
        TypeMap::Code(map) => results.code = Some(map),
        TypeMap::Commits(map) => results.commits = Some(map),
        TypeMap::Discussions(map) => results.discussions = Some(map),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

async fn decide_comments(api: &dyn SearchTransport, mode: CommentsMode) -> bool {
    match mode {
        CommentsMode::Disabled => false,
        CommentsMode::Forced => true,
        CommentsMode::Auto => {
            if !api.has_token() {
                return false;
            }
            let budget = api.check_core_budget().await;
            if budget >= AUTO_COMMENTS_MIN_BUDGET {
                info!(budget, "core API budget sufficient, enabling comment search");
                true
            } else {
                warn!(
                    budget,
                    "core API budget low, skipping comment search (force with --search-comments)"
                );
                false
            }
        }
    }
}

/// Execute every configured search type and assemble the outcome.
///
/// Types run as parallel tasks when more than one is configured, unless
/// `no_parallel` is set. A failed task is logged and counted; the other
/// types still produce results.
pub async fn run(
    api: Arc<dyn SearchTransport>,
    config: SearchConfig,
    opts: RunOptions,
) -> Result<RunOutcome> {
    let started = Instant::now();
    let searched_comments = decide_comments(api.as_ref(), opts.comments).await;

    let types = config.resolved_types();
    let cache = opts
        .cache_file
        .as_ref()
        .map(|path| Arc::new(Mutex::new(ResultCache::new(path, &config.repo))));

    let config = Arc::new(config);
    let opts = Arc::new(opts);

    let mut results = ResultSet::default();
    let mut metrics = RunMetrics::new();
    let mut resumed = false;

    if types.len() > 1 && !opts.no_parallel {
        info!(count = types.len(), "running search types in parallel");
        let handles: Vec<_> = types
            .iter()
            .map(|&content_type| {
                tokio::spawn(run_type(
                    api.clone(),
                    config.clone(),
                    opts.clone(),
                    cache.clone(),
                    content_type,
                    searched_comments,
                ))
            })
            .collect();
        for handle in handles {
            match handle.await {
                Ok(outcome) => {
                    resumed |= outcome.resumed;
                    metrics.merge(&outcome.metrics);
                    fold_outcome(&mut results, outcome);
                }
                Err(err) => {
                    error!(%err, "search task failed");
                    metrics.tasks_failed += 1;
                }
            }
        }
    } else {
        for &content_type in &types {
            let outcome = run_type(
                api.clone(),
                config.clone(),
                opts.clone(),
                cache.clone(),
                content_type,
                searched_comments,
            )
            .await;
            resumed |= outcome.resumed;
            metrics.merge(&outcome.metrics);
            fold_outcome(&mut results, outcome);
        }
    }

    let linkable = types
        .iter()
        .filter(|t| {
            matches!(
                t,
                ContentType::Issues | ContentType::Prs | ContentType::Commits
            )
        })
        .count();
    let xref = if linkable >= 2 {
        Some(build_cross_references(
            results.issues.as_ref(),
            results.prs.as_ref(),
            results.commits.as_ref(),
        ))
    } else {
        info!(
            linkable,
            "cross-reference needs at least two of issues, prs, commits; skipping"
        );
        None
    };

    metrics.elapsed_ms = Some(started.elapsed().as_millis() as u64);
    Ok(RunOutcome {
        results,
        xref,
        searched_comments,
        resumed,
        metrics,
    })
}

// ---------------------------------------------------------------------------
// Intermediate review export and score overrides
// ---------------------------------------------------------------------------

const REVIEW_TOP: usize = 30;
const REVIEW_BORDERLINE: usize = 20;

fn review_summary(item: &SearchItem) -> Value {
    let mut d = json!({
        "score": (item.relevance_score() * 10.0).round() / 10.0,
        "matched_keywords": item.matched_keywords(),
    });
    let body_snippet = |body: &str| -> Option<String> {
        if body.is_empty() {
            None
        } else {
            Some(body.chars().take(300).collect())
        }
    };
    match item {
        SearchItem::Issue(i) => {
            d["number"] = json!(i.number);
            d["title"] = json!(i.title);
            d["url"] = json!(i.url);
            d["state"] = json!(i.state);
            if let Some(snippet) = body_snippet(&i.body) {
                d["body_snippet"] = json!(snippet);
            }
        }
        SearchItem::Pr(p) => {
            d["number"] = json!(p.number);
            d["title"] = json!(p.title);
            d["url"] = json!(p.url);
            d["state"] = json!(p.state);
            if let Some(snippet) = body_snippet(&p.body) {
                d["body_snippet"] = json!(snippet);
            }
        }
        SearchItem::Code(c) => {
            d["path"] = json!(c.path);
            d["url"] = json!(c.url);
        }
        SearchItem::Commit(c) => {
            d["sha"] = json!(c.short_sha());
            d["message"] = json!(c.message.chars().take(200).collect::<String>());
        }
        SearchItem::Discussion(disc) => {
            d["number"] = json!(disc.number);
            d["title"] = json!(disc.title);
            d["url"] = json!(disc.url);
            if let Some(snippet) = body_snippet(&disc.body) {
                d["body_snippet"] = json!(snippet);
            }
        }
    }
    d
}

fn review_section(items: Vec<SearchItem>, min_score: f64) -> Option<Value> {
    if items.is_empty() {
        return None;
    }
    let total = items.len();
    let mut sorted = items;
    sorted.sort_by(|a, b| b.relevance_score().total_cmp(&a.relevance_score()));

    let top: Vec<Value> = sorted.iter().take(REVIEW_TOP).map(review_summary).collect();
    let borderline: Vec<Value> = sorted
        .iter()
        .skip(REVIEW_TOP)
        .filter(|i| (1.0..min_score).contains(&i.relevance_score()))
        .take(REVIEW_BORDERLINE)
        .map(review_summary)
        .collect();

    let mut section = json!({ "total": total, "top": top });
    if !borderline.is_empty() {
        section["borderline"] = json!(borderline);
    }
    Some(section)
}

/// Export scored results for external review: top items plus borderline
/// ones per type, with enough context to judge relevance.
pub fn write_intermediate_json(
    results: &ResultSet,
    config: &SearchConfig,
    min_score: f64,
    path: &Path,
) -> Result<()> {
    let mut types = serde_json::Map::new();

    let mut add = |key: ContentType, items: Vec<SearchItem>| {
        if let Some(section) = review_section(items, min_score) {
            types.insert(key.as_str().to_string(), section);
        }
    };
    if let Some(map) = &results.issues {
        add(ContentType::Issues, map.values().cloned().map(Into::into).collect());
    }
    if let Some(map) = &results.prs {
        add(ContentType::Prs, map.values().cloned().map(Into::into).collect());
    }
    if let Some(map) = &results.code {
        add(ContentType::Code, map.values().cloned().map(Into::into).collect());
    }
    if let Some(map) = &results.commits {
        add(ContentType::Commits, map.values().cloned().map(Into::into).collect());
    }
    if let Some(map) = &results.discussions {
        add(
            ContentType::Discussions,
            map.values().cloned().map(Into::into).collect(),
        );
    }

    let n_types = types.len();
    let doc = json!({
        "version": "review-intermediate",
        "repo": config.repo,
        "component": config.component,
        "topic": config.topic,
        "instructions": "Review each item. Set 'ai_score' to your assessed relevance (0-30). \
                         Set 'ai_label' to 'relevant', 'noise', or 'borderline'. \
                         Save as JSON and pass back with --score-overrides.",
        "types": types,
    });
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    info!(path = %path.display(), types = n_types, "intermediate results written");
    Ok(())
}

/// Apply reviewed score overrides:
/// `{"overrides": {"issues": {"123": {"ai_score": 15.0}}, ...}}`.
///
/// Returns the number of scores changed. A missing file is a warning, not
/// an error, so a pipeline invocation stays re-runnable.
pub fn apply_score_overrides(results: &mut ResultSet, path: &Path) -> Result<usize> {
    if !path.exists() {
        warn!(path = %path.display(), "score overrides file not found");
        return Ok(0);
    }
    let data: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let Some(overrides) = data.get("overrides").and_then(Value::as_object) else {
        warn!(path = %path.display(), "score overrides file has no 'overrides' object");
        return Ok(0);
    };

    let mut applied = 0usize;
    for (type_key, entries) in overrides {
        let Some(content_type) = ContentType::from_str_loose(type_key) else {
            continue;
        };
        let Some(entries) = entries.as_object() else {
            continue;
        };
        for (key, entry) in entries {
            let Some(score) = entry.get("ai_score").and_then(Value::as_f64) else {
                continue;
            };
            let changed = match content_type {
                ContentType::Issues => key.parse::<u64>().ok().and_then(|n| {
                    results
                        .issues
                        .as_mut()
                        .and_then(|m| m.get_mut(&n))
                        .map(|i| i.relevance_score = score)
                }),
                ContentType::Prs => key.parse::<u64>().ok().and_then(|n| {
                    results
                        .prs
                        .as_mut()
                        .and_then(|m| m.get_mut(&n))
                        .map(|p| p.relevance_score = score)
                }),
                ContentType::Discussions => key.parse::<u64>().ok().and_then(|n| {
                    results
                        .discussions
                        .as_mut()
                        .and_then(|m| m.get_mut(&n))
                        .map(|d| d.relevance_score = score)
                }),
                ContentType::Code => results
                    .code
                    .as_mut()
                    .and_then(|m| m.get_mut(key.as_str()))
                    .map(|c| c.relevance_score = score),
                ContentType::Commits => results
                    .commits
                    .as_mut()
                    .and_then(|m| m.get_mut(key.as_str()))
                    .map(|c| c.relevance_score = score),
            };
            if changed.is_some() {
                debug!(section = %content_type, key, score, "score override applied");
                applied += 1;
            }
        }
    }
    info!(applied, path = %path.display(), "score overrides applied");
    Ok(applied)
}

// ---------------------------------------------------------------------------
// Console summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TypeSummary {
    pub label: &'static str,
    pub total: usize,
    pub relevant: usize,
    pub highly_relevant: usize,
    /// Code rows show a file count without the highly-relevant column.
    pub is_code: bool,
}

fn count_scores(scores: impl Iterator<Item = f64>, min_score: f64) -> (usize, usize) {
    let relevant: Vec<f64> = scores.filter(|s| *s >= min_score).collect();
    let high = relevant.iter().filter(|s| **s >= HIGH_SCORE).count();
    (relevant.len(), high)
}

/// Per-type console counts, applying the same exclude/state/date filters the
/// report uses so the console matches the Markdown output.
pub fn summarize(results: &ResultSet, config: &SearchConfig, min_score: f64) -> Vec<TypeSummary> {
    let exclude: std::collections::BTreeSet<u64> = config.exclude_issues.iter().copied().collect();
    let state = &config.filters.state;
    let date_from = &config.filters.date_from;
    let mut out = Vec::new();

    if let Some(issues) = &results.issues {
        let pool: Vec<&crate::types::Issue> = issues
            .values()
            .filter(|i| !exclude.contains(&i.number))
            .filter(|i| state.is_empty() || i.state == *state)
            .filter(|i| date_from.is_empty() || i.created_at >= *date_from)
            .collect();
        let (relevant, high) = count_scores(pool.iter().map(|i| i.relevance_score), min_score);
        out.push(TypeSummary {
            label: ContentType::Issues.label(),
            total: pool.len(),
            relevant,
            highly_relevant: high,
            is_code: false,
        });
    }
    if let Some(prs) = &results.prs {
        let pool: Vec<&crate::types::PullRequest> = prs
            .values()
            .filter(|p| !exclude.contains(&p.number))
            .filter(|p| state.is_empty() || p.state == *state)
            .filter(|p| date_from.is_empty() || p.created_at >= *date_from)
            .collect();
        let (relevant, high) = count_scores(pool.iter().map(|p| p.relevance_score), min_score);
        out.push(TypeSummary {
            label: ContentType::Prs.label(),
            total: pool.len(),
            relevant,
            highly_relevant: high,
            is_code: false,
        });
    }
    if let Some(code) = &results.code {
        let (relevant, high) = count_scores(code.values().map(|c| c.relevance_score), min_score);
        out.push(TypeSummary {
            label: ContentType::Code.label(),
            total: code.len(),
            relevant,
            highly_relevant: high,
            is_code: true,
        });
    }
    if let Some(commits) = &results.commits {
        let (relevant, high) = count_scores(commits.values().map(|c| c.relevance_score), min_score);
        out.push(TypeSummary {
            label: ContentType::Commits.label(),
            total: commits.len(),
            relevant,
            highly_relevant: high,
            is_code: false,
        });
    }
    if let Some(discussions) = &results.discussions {
        let (relevant, high) =
            count_scores(discussions.values().map(|d| d.relevance_score), min_score);
        out.push(TypeSummary {
            label: ContentType::Discussions.label(),
            total: discussions.len(),
            relevant,
            highly_relevant: high,
            is_code: false,
        });
    }
    out
}

/// Relevant issues whose keywords were found only after comment fetching.
pub fn comments_discovered(results: &ResultSet, config: &SearchConfig, min_score: f64) -> usize {
    let Some(issues) = &results.issues else {
        return 0;
    };
    let exclude: std::collections::BTreeSet<u64> = config.exclude_issues.iter().copied().collect();
    issues
        .values()
        .filter(|i| !exclude.contains(&i.number))
        .filter(|i| config.filters.state.is_empty() || i.state == config.filters.state)
        .filter(|i| !i.matched_in_comments.is_empty() && i.relevance_score >= min_score)
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
