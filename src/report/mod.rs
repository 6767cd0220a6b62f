//! Markdown and JSON report rendering.
//!
//! A report has an executive summary table across every searched type, a
//! section per type splitting keyword-matched items (full detail) from
//! component-only items (compact table), a cross-reference section when
//! one was built, and a footer. [`format_full_json`] mirrors the Markdown
//! report as structured JSON.

use std::collections::BTreeSet;

use serde_json::json;

use crate::config::SearchConfig;
use crate::types::{
    CodeHit, CommitHit, DiscussionHit, Issue, PullRequest, ResultSet,
};
use crate::xref::{CrossRefMap, NodeId};

/// Snippets bucket by this many characters of source text.
const SNIPPET_CONTEXT: usize = 120;
const MAX_SNIPPETS: usize = 5;

const ICON_OPEN: &str = "\u{1f7e2}";
const ICON_CLOSED: &str = "\u{1f534}";
const ICON_MERGED: &str = "\u{2705}";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub min_score: f64,
    pub searched_comments: bool,
    pub max_component: usize,
}

impl ReportOptions {
    pub fn new(min_score: f64, searched_comments: bool, max_component: usize) -> Self {
        Self {
            min_score,
            searched_comments,
            max_component,
        }
    }
}

/// One row of the executive summary table.
#[derive(Debug, Clone)]
pub struct SectionStats {
    pub type_label: &'static str,
    pub total_searched: usize,
    pub kw_matched: usize,
    pub component_only: usize,
    pub top_score: f64,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

trait Scored {
    fn score(&self) -> f64;
    fn matched(&self) -> &BTreeSet<String>;
}

macro_rules! impl_scored {
    ($($ty:ty),+) => {$(
        impl Scored for $ty {
            fn score(&self) -> f64 {
                self.relevance_score
            }
            fn matched(&self) -> &BTreeSet<String> {
                &self.matched_keywords
            }
        }
    )+};
}

impl_scored!(Issue, PullRequest, CodeHit, CommitHit, DiscussionHit);

/// Items at or above `min_score`, split into keyword-matched and
/// component-only groups, each sorted by descending score.
fn split_results<'a, T: Scored>(
    items: impl Iterator<Item = &'a T>,
    min_score: f64,
) -> (Vec<&'a T>, Vec<&'a T>) {
    let mut ranked: Vec<&T> = items.filter(|i| i.score() >= min_score).collect();
    ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
    ranked.into_iter().partition(|i| !i.matched().is_empty())
}

fn section_stats<T: Scored>(
    type_label: &'static str,
    total_searched: usize,
    kw_matched: &[&T],
    comp_only: &[&T],
) -> SectionStats {
    let top_score = kw_matched
        .iter()
        .chain(comp_only.iter())
        .map(|i| i.score())
        .fold(0.0_f64, f64::max);
    SectionStats {
        type_label,
        total_searched,
        kw_matched: kw_matched.len(),
        component_only: comp_only.len(),
        top_score,
    }
}

fn issue_icon(state: &str) -> &'static str {
    if state == "open" {
        ICON_OPEN
    } else {
        ICON_CLOSED
    }
}

fn pr_icon(pr: &PullRequest) -> &'static str {
    if pr.merged {
        ICON_MERGED
    } else {
        issue_icon(&pr.state)
    }
}

fn code_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("`{v}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn date_display(config: &SearchConfig) -> String {
    let from = &config.filters.date_from;
    let to = &config.filters.date_to;
    match (from.is_empty(), to.is_empty()) {
        (false, false) => format!("{from} ~ {to}"),
        (false, true) => format!(">= {from}"),
        (true, false) => format!("<= {to}"),
        (true, true) => "any".to_string(),
    }
}

fn keywords_block(config: &SearchConfig) -> Vec<String> {
    let tier_line = |keywords: &[String]| -> String {
        if keywords.is_empty() {
            "none".to_string()
        } else {
            code_list(&keywords[..keywords.len().min(10)])
        }
    };
    vec![
        format!("### Keywords ({})", config.keywords.total()),
        String::new(),
        format!("- **High** (+5): {}", tier_line(config.keywords.high())),
        format!("- **Medium** (+3): {}", tier_line(config.keywords.medium())),
        format!("- **Low** (+1): {}", tier_line(config.keywords.low())),
    ]
}

fn metadata_block(config: &SearchConfig, searched_comments: bool, ts: &str) -> Vec<String> {
    let component = if config.has_component() {
        config.component.clone()
    } else {
        "(any)".to_string()
    };
    let state = if config.filters.state.is_empty() {
        "all"
    } else {
        &config.filters.state
    };
    let mut lines = vec![
        format!(
            "- **Repository**: [{repo}](https://github.com/{repo})",
            repo = config.repo
        ),
        format!("- **Component**: {component}"),
        format!("- **Topic**: {}", config.topic),
        format!("- **State filter**: {state}"),
        format!("- **Date range**: {}", date_display(config)),
        format!("- **Generated**: {ts}"),
    ];
    if searched_comments {
        lines.push("- **Searched comments**: yes".to_string());
    }
    lines
}

// ---------------------------------------------------------------------------
// Executive summary
// ---------------------------------------------------------------------------

pub fn format_executive_summary(
    sections: &[SectionStats],
    config: &SearchConfig,
    searched_comments: bool,
) -> String {
    let ts = timestamp();
    let mut lines = vec![
        "# GitHub Search Report".to_string(),
        String::new(),
        "## Executive Summary".to_string(),
        String::new(),
        "| Type | Searched | Keyword Matched | Component Only | Top Score |".to_string(),
        "|------|----------|-----------------|----------------|-----------|".to_string(),
    ];
    for s in sections {
        let top = if s.top_score > 0.0 {
            format!("{:.1}", s.top_score)
        } else {
            "-".to_string()
        };
        lines.push(format!(
            "| {} | {} | {} | {} | {top} |",
            s.type_label, s.total_searched, s.kw_matched, s.component_only
        ));
    }
    lines.push(String::new());
    lines.extend(metadata_block(config, searched_comments, &ts));
    lines.push(String::new());
    lines.extend(keywords_block(config));
    lines.extend([String::new(), "---".to_string(), String::new()]);
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Snippet extraction
// ---------------------------------------------------------------------------

/// Keyword context windows from the body and comment text, longest keyword
/// first, deduplicated per 120-char bucket, at most five.
fn extract_snippets(body: &str, comments: &str, keywords: &BTreeSet<String>) -> Vec<String> {
    let mut keywords: Vec<&String> = keywords.iter().collect();
    keywords.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));

    let mut snippets = Vec::new();
    let mut seen = BTreeSet::new();
    for (label, text) in [("[body]", body), ("[comments]", comments)] {
        if text.is_empty() {
            continue;
        }
        let text_lower = text.to_ascii_lowercase();
        for keyword in &keywords {
            let kw_lower = keyword.to_ascii_lowercase();
            if kw_lower.is_empty() {
                continue;
            }
            let mut from = 0usize;
            while let Some(found) = text_lower[from..].find(&kw_lower) {
                let pos = from + found;
                from = pos + kw_lower.len();
                if !seen.insert((label, pos / SNIPPET_CONTEXT)) {
                    continue;
                }
                let start = floor_boundary(text, pos.saturating_sub(40));
                let end = ceil_boundary(
                    text,
                    (pos + kw_lower.len() + SNIPPET_CONTEXT - 40).min(text.len()),
                );
                let mut snippet = text[start..end].replace('\n', " ").trim().to_string();
                if start > 0 {
                    snippet = format!("...{snippet}");
                }
                if end < text.len() {
                    snippet.push_str("...");
                }
                snippets.push(format!("{label} {snippet}"));
                if snippets.len() >= MAX_SNIPPETS {
                    return snippets;
                }
            }
        }
    }
    snippets
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

// ---------------------------------------------------------------------------
// Issue section
// ---------------------------------------------------------------------------

fn format_issue_detail(issue: &Issue) -> String {
    let body_kws: Vec<&String> = issue
        .matched_keywords
        .difference(&issue.matched_in_comments)
        .collect();
    let mut parts = Vec::new();
    if !body_kws.is_empty() {
        let kws: Vec<String> = body_kws.iter().map(|k| format!("`{k}`")).collect();
        parts.push(format!("body: {}", kws.join(", ")));
    }
    if !issue.matched_in_comments.is_empty() {
        let kws: Vec<String> = issue
            .matched_in_comments
            .iter()
            .map(|k| format!("`{k}`"))
            .collect();
        parts.push(format!("comments: {}", kws.join(", ")));
    }
    let matched = if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(" | ")
    };
    let labels = if issue.labels.is_empty() {
        "none".to_string()
    } else {
        code_list(&issue.labels)
    };

    let snippets = extract_snippets(&issue.body, &issue.comments_text, &issue.matched_keywords);
    let snippet_text = if snippets.is_empty() {
        String::new()
    } else {
        let quoted: Vec<String> = snippets.iter().take(3).map(|s| format!("  > {s}")).collect();
        format!("\n{}\n", quoted.join("\n"))
    };

    format!(
        "### {icon} [#{n}]({url}) (score: {score:.1})\n\
         **{title}**\n\
         - State: {state} | Date: {date} | Labels: {labels}\n\
         - Matched: {matched}\n\
         {snippet_text}\n",
        icon = issue_icon(&issue.state),
        n = issue.number,
        url = issue.url,
        score = issue.relevance_score,
        title = issue.title,
        state = issue.state,
        date = issue.created_at,
    )
}

pub fn format_issue_section(
    issues: &std::collections::BTreeMap<u64, Issue>,
    config: &SearchConfig,
    opts: &ReportOptions,
) -> (String, SectionStats) {
    let exclude: BTreeSet<u64> = config.exclude_issues.iter().copied().collect();
    let pool: Vec<&Issue> = issues
        .values()
        .filter(|i| !exclude.contains(&i.number))
        .filter(|i| config.filters.state.is_empty() || i.state == config.filters.state)
        .filter(|i| {
            config.filters.date_from.is_empty() || i.created_at >= config.filters.date_from
        })
        .filter(|i| config.filters.date_to.is_empty() || i.created_at <= config.filters.date_to)
        .collect();

    let (kw_matched, comp_only) = split_results(pool.into_iter(), opts.min_score);
    let stats = section_stats("Issues", issues.len(), &kw_matched, &comp_only);
    let (n_kw, n_comp) = (kw_matched.len(), comp_only.len());

    let mut lines = vec![
        format!("# Issues ({n_kw} keyword matched / {} total relevant)", n_kw + n_comp),
        String::new(),
    ];

    if kw_matched.is_empty() && comp_only.is_empty() {
        lines.push("No matching issues found.\n".to_string());
        return (lines.join("\n"), stats);
    }

    if !kw_matched.is_empty() {
        lines.push(format!("## Keyword Matched ({n_kw})\n"));
        for issue in &kw_matched {
            lines.push(format_issue_detail(issue));
        }
    }

    if !comp_only.is_empty() && opts.max_component > 0 {
        lines.push(format!("## Component Only ({n_comp})\n"));
        let mut notes = Vec::new();
        if config.has_component() {
            notes.push(format!(
                "These issues mention the component `{}` but matched no search keywords.",
                config.component
            ));
        }
        if n_comp > opts.max_component {
            notes.push(format!(
                "Showing the first {} of {n_comp}.",
                opts.max_component
            ));
        }
        if !notes.is_empty() {
            lines.push(format!("> {}\n", notes.join(" ")));
        }
        lines.push("| # | Issue | State | Score | Date | Title |".to_string());
        lines.push("|---|-------|-------|-------|------|-------|".to_string());
        for (i, issue) in comp_only.iter().take(opts.max_component).enumerate() {
            lines.push(format!(
                "| {} | [#{}]({}) | {} {} | {:.1} | {} | {} |",
                i + 1,
                issue.number,
                issue.url,
                issue_icon(&issue.state),
                issue.state,
                issue.relevance_score,
                issue.created_at,
                ellipsize(&issue.title, 60),
            ));
        }
        lines.push(String::new());
    }

    if !kw_matched.is_empty() {
        lines.push("## Summary Table\n".to_string());
        lines.push("| # | Issue | State | Score | Matched Keywords | Source |".to_string());
        lines.push("|---|-------|-------|-------|------------------|--------|".to_string());
        for (i, issue) in kw_matched.iter().enumerate() {
            let kws: Vec<&String> = issue.matched_keywords.iter().take(5).collect();
            let kws = kws.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
            let source = if issue.matched_in_comments.is_empty() {
                "body"
            } else if issue
                .matched_keywords
                .difference(&issue.matched_in_comments)
                .next()
                .is_some()
            {
                "body+comments"
            } else {
                "comments"
            };
            lines.push(format!(
                "| {} | [#{}]({}) | {} {} | {:.1} | {kws} | {source} |",
                i + 1,
                issue.number,
                issue.url,
                issue_icon(&issue.state),
                issue.state,
                issue.relevance_score,
            ));
        }
        lines.push(String::new());
    }

    lines.extend(["---".to_string(), String::new()]);
    (lines.join("\n"), stats)
}

// ---------------------------------------------------------------------------
// Pull request section
// ---------------------------------------------------------------------------

fn format_pr_detail(pr: &PullRequest) -> String {
    let status = if pr.merged { "merged" } else { &pr.state };
    let labels = if pr.labels.is_empty() {
        "none".to_string()
    } else {
        code_list(&pr.labels)
    };
    let kws: Vec<String> = pr
        .matched_keywords
        .iter()
        .take(8)
        .map(|k| format!("`{k}`"))
        .collect();
    let linked = if pr.linked_issues.is_empty() {
        "none".to_string()
    } else {
        pr.linked_issues
            .iter()
            .map(|n| format!("#{n}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut files = if pr.changed_files.is_empty() {
        "not fetched".to_string()
    } else {
        code_list(&pr.changed_files[..pr.changed_files.len().min(5)])
    };
    if pr.changed_files.len() > 5 {
        files.push_str(&format!(" +{} more", pr.changed_files.len() - 5));
    }

    format!(
        "### {icon} [#{n}]({url}) (score: {score:.1})\n\
         **{title}**\n\
         - State: {status} | Date: {date} | Labels: {labels}\n\
         - Linked issues: {linked}\n\
         - Changed files: {files}\n\
         - Matched: {kws}\n\n",
        icon = pr_icon(pr),
        n = pr.number,
        url = pr.url,
        score = pr.relevance_score,
        title = pr.title,
        date = pr.created_at,
        kws = kws.join(", "),
    )
}

pub fn format_pr_section(
    prs: &std::collections::BTreeMap<u64, PullRequest>,
    config: &SearchConfig,
    opts: &ReportOptions,
) -> (String, SectionStats) {
    let (kw_matched, comp_only) = split_results(prs.values(), opts.min_score);
    let stats = section_stats("Pull Requests", prs.len(), &kw_matched, &comp_only);
    let (n_kw, n_comp) = (kw_matched.len(), comp_only.len());

    let mut lines = vec![
        format!(
            "# Pull Requests ({n_kw} keyword matched / {} total relevant)",
            n_kw + n_comp
        ),
        String::new(),
    ];

    if kw_matched.is_empty() && comp_only.is_empty() {
        lines.push("No matching pull requests found.\n".to_string());
        return (lines.join("\n"), stats);
    }

    if !kw_matched.is_empty() {
        lines.push(format!("## Keyword Matched ({n_kw})\n"));
        for pr in &kw_matched {
            lines.push(format_pr_detail(pr));
        }
    }

    if !comp_only.is_empty() && opts.max_component > 0 {
        lines.push(format!("## Component Only ({n_comp})\n"));
        let mut notes = Vec::new();
        if config.has_component() {
            notes.push(format!(
                "These pull requests mention the component `{}` but matched no search keywords.",
                config.component
            ));
        }
        if n_comp > opts.max_component {
            notes.push(format!(
                "Showing the first {} of {n_comp}.",
                opts.max_component
            ));
        }
        if !notes.is_empty() {
            lines.push(format!("> {}\n", notes.join(" ")));
        }
        lines.push("| # | PR | State | Score | Date | Title |".to_string());
        lines.push("|---|----|-------|-------|------|-------|".to_string());
        for (i, pr) in comp_only.iter().take(opts.max_component).enumerate() {
            let status = if pr.merged { "merged" } else { &pr.state };
            lines.push(format!(
                "| {} | [#{}]({}) | {} {status} | {:.1} | {} | {} |",
                i + 1,
                pr.number,
                pr.url,
                pr_icon(pr),
                pr.relevance_score,
                pr.created_at,
                ellipsize(&pr.title, 60),
            ));
        }
        lines.push(String::new());
    }

    if !kw_matched.is_empty() {
        lines.push("## Summary Table\n".to_string());
        lines.push("| # | PR | State | Score | Matched Keywords | Linked Issues |".to_string());
        lines.push("|---|----|-------|-------|------------------|---------------|".to_string());
        for (i, pr) in kw_matched.iter().enumerate() {
            let kws: Vec<&str> = pr.matched_keywords.iter().take(5).map(String::as_str).collect();
            let status = if pr.merged { "merged" } else { &pr.state };
            let linked = if pr.linked_issues.is_empty() {
                "-".to_string()
            } else {
                pr.linked_issues
                    .iter()
                    .take(3)
                    .map(|n| format!("#{n}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            lines.push(format!(
                "| {} | [#{}]({}) | {} {status} | {:.1} | {} | {linked} |",
                i + 1,
                pr.number,
                pr.url,
                pr_icon(pr),
                pr.relevance_score,
                kws.join(", "),
            ));
        }
        lines.push(String::new());
    }

    lines.extend(["---".to_string(), String::new()]);
    (lines.join("\n"), stats)
}

// ---------------------------------------------------------------------------
// Code and commit sections
// ---------------------------------------------------------------------------

pub fn format_code_section(
    results: &std::collections::BTreeMap<String, CodeHit>,
    opts: &ReportOptions,
) -> (String, SectionStats) {
    let (kw_matched, comp_only) = split_results(results.values(), opts.min_score);
    let stats = section_stats("Code", results.len(), &kw_matched, &comp_only);

    let mut ranked: Vec<&CodeHit> = kw_matched.into_iter().chain(comp_only).collect();
    ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut lines = vec![format!("# Code ({} relevant files)", ranked.len()), String::new()];

    if ranked.is_empty() {
        lines.push("No matching code files found.\n".to_string());
        return (lines.join("\n"), stats);
    }

    for hit in ranked.iter().take(30) {
        let kws: Vec<String> = hit
            .matched_keywords
            .iter()
            .take(5)
            .map(|k| format!("`{k}`"))
            .collect();
        let kws = if kws.is_empty() {
            "none".to_string()
        } else {
            kws.join(", ")
        };
        lines.push(format!(
            "### [`{}`]({}) (score: {:.1})\n- Matched: {kws}\n",
            hit.path, hit.url, hit.relevance_score
        ));
        if !hit.content_snippet.is_empty() {
            let snippet = ellipsize(&hit.content_snippet.replace('\n', " "), 200);
            lines.push(format!("  > {snippet}\n"));
        }
    }

    lines.extend(["---".to_string(), String::new()]);
    (lines.join("\n"), stats)
}

pub fn format_commit_section(
    results: &std::collections::BTreeMap<String, CommitHit>,
    opts: &ReportOptions,
) -> (String, SectionStats) {
    let (kw_matched, comp_only) = split_results(results.values(), opts.min_score);
    let stats = section_stats("Commits", results.len(), &kw_matched, &comp_only);

    let mut ranked: Vec<&CommitHit> = kw_matched.into_iter().chain(comp_only).collect();
    ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut lines = vec![
        format!("# Commits ({} relevant commits)", ranked.len()),
        String::new(),
    ];

    if ranked.is_empty() {
        lines.push("No matching commits found.\n".to_string());
        return (lines.join("\n"), stats);
    }

    for commit in ranked.iter().take(30) {
        let kws: Vec<String> = commit
            .matched_keywords
            .iter()
            .take(5)
            .map(|k| format!("`{k}`"))
            .collect();
        let kws = if kws.is_empty() {
            "none".to_string()
        } else {
            kws.join(", ")
        };
        let summary = ellipsize(commit.message.lines().next().unwrap_or_default(), 100);
        let sha_short: String = commit.sha.chars().take(7).collect();
        lines.push(format!(
            "### [`{sha_short}`]({}) (score: {:.1})\n\
             **{summary}**\n\
             - Author: {} | Date: {}\n\
             - Matched: {kws}\n\n",
            commit.url, commit.relevance_score, commit.author, commit.date,
        ));
    }

    lines.extend(["---".to_string(), String::new()]);
    (lines.join("\n"), stats)
}

// ---------------------------------------------------------------------------
// Discussion section
// ---------------------------------------------------------------------------

pub fn format_discussion_section(
    results: &std::collections::BTreeMap<u64, DiscussionHit>,
    opts: &ReportOptions,
) -> (String, SectionStats) {
    let (kw_matched, comp_only) = split_results(results.values(), opts.min_score);
    let stats = section_stats("Discussions", results.len(), &kw_matched, &comp_only);
    let (n_kw, n_comp) = (kw_matched.len(), comp_only.len());

    let mut lines = vec![
        format!(
            "# Discussions ({n_kw} keyword matched / {} total relevant)",
            n_kw + n_comp
        ),
        String::new(),
    ];

    if kw_matched.is_empty() && comp_only.is_empty() {
        lines.push("No matching discussions found.\n".to_string());
        return (lines.join("\n"), stats);
    }

    if !kw_matched.is_empty() {
        lines.push(format!("## Keyword Matched ({n_kw})\n"));
        for disc in kw_matched.iter().take(30) {
            let kws: Vec<String> = disc
                .matched_keywords
                .iter()
                .take(5)
                .map(|k| format!("`{k}`"))
                .collect();
            let category = if disc.category.is_empty() {
                "uncategorized"
            } else {
                &disc.category
            };
            let answered = if disc.answer_body.is_empty() {
                "\u{2753} unanswered"
            } else {
                "\u{2705} answered"
            };
            lines.push(format!(
                "### [#{}]({}) (score: {:.1})\n\
                 **{}**\n\
                 - Category: {category} | Date: {} | {answered}\n\
                 - Matched: {}\n\n",
                disc.number,
                disc.url,
                disc.relevance_score,
                disc.title,
                disc.created_at,
                kws.join(", "),
            ));
        }
    }

    if !comp_only.is_empty() && opts.max_component > 0 {
        lines.push(format!("## Component Only ({n_comp})\n"));
        if n_comp > opts.max_component {
            lines.push(format!(
                "> Showing the first {} of {n_comp}.\n",
                opts.max_component
            ));
        }
        lines.push("| # | Discussion | Score | Category | Date | Title |".to_string());
        lines.push("|---|------------|-------|----------|------|-------|".to_string());
        for (i, disc) in comp_only.iter().take(opts.max_component).enumerate() {
            let category = if disc.category.is_empty() { "-" } else { &disc.category };
            lines.push(format!(
                "| {} | [#{}]({}) | {:.1} | {category} | {} | {} |",
                i + 1,
                disc.number,
                disc.url,
                disc.relevance_score,
                disc.created_at,
                ellipsize(&disc.title, 60),
            ));
        }
        lines.push(String::new());
    }

    lines.extend(["---".to_string(), String::new()]);
    (lines.join("\n"), stats)
}

// ---------------------------------------------------------------------------
// Cross-reference section
// ---------------------------------------------------------------------------

struct XrefContext<'a> {
    repo_url: String,
    results: &'a ResultSet,
}

impl XrefContext<'_> {
    fn link(&self, node: &NodeId) -> String {
        match node {
            NodeId::Issue(n) => format!("[#{n}]({}/issues/{n})", self.repo_url),
            NodeId::Pr(n) => format!("[#{n}]({}/pull/{n})", self.repo_url),
            NodeId::Commit(sha) => {
                let short: String = sha.chars().take(8).collect();
                format!("[`{short}`]({}/commit/{sha})", self.repo_url)
            }
        }
    }

    fn title_of(&self, node: &NodeId) -> String {
        match node {
            NodeId::Issue(n) => self
                .results
                .issues
                .as_ref()
                .and_then(|m| m.get(n))
                .map(|i| ellipsize(&i.title, 45))
                .unwrap_or_default(),
            NodeId::Pr(n) => self
                .results
                .prs
                .as_ref()
                .and_then(|m| m.get(n))
                .map(|p| ellipsize(&p.title, 45))
                .unwrap_or_default(),
            NodeId::Commit(sha) => self
                .results
                .commits
                .as_ref()
                .and_then(|m| m.values().find(|c| c.sha.starts_with(sha.as_str())))
                .map(|c| ellipsize(c.message.lines().next().unwrap_or_default(), 45))
                .unwrap_or_default(),
        }
    }

    fn state_of(&self, node: &NodeId) -> String {
        match node {
            NodeId::Issue(n) => self
                .results
                .issues
                .as_ref()
                .and_then(|m| m.get(n))
                .map(|i| issue_icon(&i.state).to_string())
                .unwrap_or_default(),
            NodeId::Pr(n) => self
                .results
                .prs
                .as_ref()
                .and_then(|m| m.get(n))
                .map(|p| pr_icon(p).to_string())
                .unwrap_or_default(),
            NodeId::Commit(_) => String::new(),
        }
    }
}

/// Cross-reference tables. Empty string when no edges were found.
pub fn format_cross_ref_section(xref: &CrossRefMap, results: &ResultSet, repo: &str) -> String {
    if xref.is_empty() {
        return String::new();
    }
    let ctx = XrefContext {
        repo_url: format!("https://github.com/{repo}"),
        results,
    };
    let stats = &xref.stats;
    let mut lines = vec![
        "## Cross References".to_string(),
        String::new(),
        format!(
            "> Found **{}** reference links: Issue\u{2194}PR **{}**, PR\u{2194}PR **{}**, commit references **{}**",
            stats.total_edges, stats.issue_pr_links, stats.pr_pr_links, stats.commit_refs
        ),
        String::new(),
    ];

    if !xref.issue_to_prs.is_empty() {
        lines.push("### Issue \u{2194} PR".to_string());
        lines.push(String::new());
        lines.push("| Issue | Title | State | Linked PR | PR Title | PR State |".to_string());
        lines.push("|-------|-------|-------|-----------|----------|----------|".to_string());
        for (issue, prs) in &xref.issue_to_prs {
            let source = NodeId::Issue(*issue);
            for (j, pr) in prs.iter().enumerate() {
                let target = NodeId::Pr(*pr);
                if j == 0 {
                    lines.push(format!(
                        "| {} | {} | {} | {} | {} | {} |",
                        ctx.link(&source),
                        ctx.title_of(&source),
                        ctx.state_of(&source),
                        ctx.link(&target),
                        ctx.title_of(&target),
                        ctx.state_of(&target),
                    ));
                } else {
                    lines.push(format!(
                        "| \u{21b3} | | | {} | {} | {} |",
                        ctx.link(&target),
                        ctx.title_of(&target),
                        ctx.state_of(&target),
                    ));
                }
            }
        }
        lines.push(String::new());
    }

    if !xref.pr_to_prs.is_empty() {
        lines.push("### PR \u{2192} PR".to_string());
        lines.push(String::new());
        lines.push("| Source PR | Title | State | Referenced PR | Title | State |".to_string());
        lines.push("|-----------|-------|-------|---------------|-------|-------|".to_string());
        for (src, targets) in &xref.pr_to_prs {
            let source = NodeId::Pr(*src);
            for (j, pr) in targets.iter().enumerate() {
                let target = NodeId::Pr(*pr);
                if j == 0 {
                    lines.push(format!(
                        "| {} | {} | {} | {} | {} | {} |",
                        ctx.link(&source),
                        ctx.title_of(&source),
                        ctx.state_of(&source),
                        ctx.link(&target),
                        ctx.title_of(&target),
                        ctx.state_of(&target),
                    ));
                } else {
                    lines.push(format!(
                        "| \u{21b3} | | | {} | {} | {} |",
                        ctx.link(&target),
                        ctx.title_of(&target),
                        ctx.state_of(&target),
                    ));
                }
            }
        }
        lines.push(String::new());
    }

    if !xref.commit_to_targets.is_empty() {
        lines.push("### Commit References".to_string());
        lines.push(String::new());
        lines.push("| Commit | Message | Target | Target Title | State |".to_string());
        lines.push("|--------|---------|--------|--------------|-------|".to_string());
        for (sha, targets) in &xref.commit_to_targets {
            let source = NodeId::Commit(sha.clone());
            for (j, target) in targets.iter().enumerate() {
                if j == 0 {
                    lines.push(format!(
                        "| {} | {} | {} | {} | {} |",
                        ctx.link(&source),
                        ctx.title_of(&source),
                        ctx.link(target),
                        ctx.title_of(target),
                        ctx.state_of(target),
                    ));
                } else {
                    lines.push(format!(
                        "| \u{21b3} | | {} | {} | {} |",
                        ctx.link(target),
                        ctx.title_of(target),
                        ctx.state_of(target),
                    ));
                }
            }
        }
        lines.push(String::new());
    }

    lines.extend(["---".to_string(), String::new()]);
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Full report
// ---------------------------------------------------------------------------

fn footer() -> String {
    format!("*Generated by gitscout v{}*", env!("CARGO_PKG_VERSION"))
}

/// Complete Markdown report: executive summary, one section per searched
/// type, optional cross-reference section, footer.
pub fn format_full_report(
    config: &SearchConfig,
    results: &ResultSet,
    xref: Option<&CrossRefMap>,
    opts: &ReportOptions,
) -> String {
    let mut stats = Vec::new();
    let mut sections = Vec::new();

    if let Some(issues) = &results.issues {
        let (text, st) = format_issue_section(issues, config, opts);
        stats.push(st);
        sections.push(text);
    }
    if let Some(prs) = &results.prs {
        let (text, st) = format_pr_section(prs, config, opts);
        stats.push(st);
        sections.push(text);
    }
    if let Some(code) = &results.code {
        let (text, st) = format_code_section(code, opts);
        stats.push(st);
        sections.push(text);
    }
    if let Some(commits) = &results.commits {
        let (text, st) = format_commit_section(commits, opts);
        stats.push(st);
        sections.push(text);
    }
    if let Some(discussions) = &results.discussions {
        let (text, st) = format_discussion_section(discussions, opts);
        stats.push(st);
        sections.push(text);
    }

    let summary = format_executive_summary(&stats, config, opts.searched_comments);
    let body = sections.join("\n");
    let xref_text = xref
        .map(|x| format_cross_ref_section(x, results, &config.repo))
        .unwrap_or_default();
    format!("{summary}{body}\n{xref_text}{}\n", footer())
}

// ---------------------------------------------------------------------------
// JSON report
// ---------------------------------------------------------------------------

fn ranked_values<'a, T: Scored>(map: impl Iterator<Item = &'a T>, min_score: f64) -> Vec<&'a T> {
    let mut ranked: Vec<&T> = map.filter(|i| i.score() >= min_score).collect();
    ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
    ranked
}

/// JSON mirror of [`format_full_report`].
pub fn format_full_json(
    config: &SearchConfig,
    results: &ResultSet,
    opts: &ReportOptions,
) -> String {
    let mut root = json!({
        "version": crate::cache::CACHE_VERSION,
        "repo": config.repo,
        "component": config.component,
        "topic": config.topic,
        "search_types": config.search_types,
        "filters": {
            "state": if config.filters.state.is_empty() { "all" } else { &config.filters.state },
            "date_from": if config.filters.date_from.is_empty() { None } else { Some(&config.filters.date_from) },
            "date_to": if config.filters.date_to.is_empty() { None } else { Some(&config.filters.date_to) },
        },
        "searched_comments": opts.searched_comments,
        "generated_at": timestamp(),
    });

    if let Some(issues) = &results.issues {
        let ranked = ranked_values(issues.values(), opts.min_score);
        root["issues"] = json!({
            "total_searched": issues.len(),
            "total_relevant": ranked.len(),
            "items": ranked.iter().map(|i| json!({
                "number": i.number,
                "title": i.title,
                "state": i.state,
                "url": i.url,
                "labels": i.labels,
                "created_at": i.created_at,
                "relevance_score": i.relevance_score,
                "matched_keywords": i.matched_keywords,
                "matched_in_comments": i.matched_in_comments,
            })).collect::<Vec<_>>(),
        });
    }

    if let Some(prs) = &results.prs {
        let ranked = ranked_values(prs.values(), opts.min_score);
        root["pull_requests"] = json!({
            "total_searched": prs.len(),
            "total_relevant": ranked.len(),
            "items": ranked.iter().map(|p| json!({
                "number": p.number,
                "title": p.title,
                "state": p.state,
                "merged": p.merged,
                "url": p.url,
                "labels": p.labels,
                "created_at": p.created_at,
                "relevance_score": p.relevance_score,
                "matched_keywords": p.matched_keywords,
                "linked_issues": p.linked_issues,
                "changed_files": &p.changed_files[..p.changed_files.len().min(10)],
            })).collect::<Vec<_>>(),
        });
    }

    if let Some(code) = &results.code {
        let ranked = ranked_values(code.values(), opts.min_score);
        root["code"] = json!({
            "total_searched": code.len(),
            "total_relevant": ranked.len(),
            "items": ranked.iter().map(|c| json!({
                "path": c.path,
                "url": c.url,
                "repo": c.repo,
                "relevance_score": c.relevance_score,
                "matched_keywords": c.matched_keywords,
            })).collect::<Vec<_>>(),
        });
    }

    if let Some(commits) = &results.commits {
        let ranked = ranked_values(commits.values(), opts.min_score);
        root["commits"] = json!({
            "total_searched": commits.len(),
            "total_relevant": ranked.len(),
            "items": ranked.iter().map(|c| json!({
                "sha": c.sha,
                "message": ellipsize(c.message.lines().next().unwrap_or_default(), 200),
                "author": c.author,
                "date": c.date,
                "url": c.url,
                "relevance_score": c.relevance_score,
                "matched_keywords": c.matched_keywords,
            })).collect::<Vec<_>>(),
        });
    }

    if let Some(discussions) = &results.discussions {
        let ranked = ranked_values(discussions.values(), opts.min_score);
        root["discussions"] = json!({
            "total_searched": discussions.len(),
            "total_relevant": ranked.len(),
            "items": ranked.iter().map(|d| json!({
                "number": d.number,
                "title": d.title,
                "url": d.url,
                "category": d.category,
                "created_at": d.created_at,
                "has_answer": !d.answer_body.is_empty(),
                "relevance_score": d.relevance_score,
                "matched_keywords": d.matched_keywords,
            })).collect::<Vec<_>>(),
        });
    }

    serde_json::to_string_pretty(&root).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordTiers;
    use crate::xref::build_cross_references;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn issue(number: u64, score: f64, matched: &[&str]) -> Issue {
        Issue {
            number,
            title: format!("issue {number}"),
            state: "open".into(),
            url: format!("https://github.com/octo/widgets/issues/{number}"),
            labels: vec![],
            created_at: "2024-03-01".into(),
            body: "the renderer crashes on resize".into(),
            comments_text: String::new(),
            comments_fetched: false,
            matched_keywords: matched.iter().map(|s| s.to_string()).collect(),
            matched_in_comments: Default::default(),
            relevance_score: score,
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            repo: "octo/widgets".into(),
            component: "renderer".into(),
            topic: "crash on resize".into(),
            keywords: KeywordTiers::new(
                vec!["crash".into()],
                vec!["resize".into()],
                vec![],
            ),
            ..Default::default()
        }
    }

    fn opts() -> ReportOptions {
        ReportOptions::new(3.0, false, 10)
    }

    #[test]
    fn split_orders_by_score_and_separates_groups() {
        let items = vec![
            issue(1, 9.0, &["crash"]),
            issue(2, 4.0, &[]),
            issue(3, 6.0, &["resize"]),
            issue(4, 1.0, &["crash"]),
        ];
        let (kw, comp) = split_results(items.iter(), 3.0);
        let kw_numbers: Vec<u64> = kw.iter().map(|i| i.number).collect();
        assert_eq!(kw_numbers, vec![1, 3]);
        assert_eq!(comp.len(), 1);
        assert_eq!(comp[0].number, 2);
    }

    #[test]
    fn snippets_window_and_bucket_dedup() {
        let body = format!("{}crash happens here", "x".repeat(100));
        let keywords: BTreeSet<String> = ["crash".to_string()].into();
        let snippets = extract_snippets(&body, "", &keywords);
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].starts_with("[body] ..."));
        assert!(snippets[0].contains("crash happens here"));

        // Same bucket, one snippet only.
        let dense = "crash crash crash";
        let snippets = extract_snippets(dense, "", &keywords);
        assert_eq!(snippets.len(), 1);
    }

    #[test]
    fn snippets_cap_at_five() {
        let body = "crash ".repeat(300);
        let keywords: BTreeSet<String> = ["crash".to_string()].into();
        assert_eq!(extract_snippets(&body, "", &keywords).len(), 5);
    }

    #[test]
    fn issue_section_applies_filters_and_tables() {
        let mut issues = BTreeMap::new();
        issues.insert(1, issue(1, 9.0, &["crash"]));
        issues.insert(2, issue(2, 5.0, &[]));
        let mut closed = issue(3, 7.0, &["crash"]);
        closed.state = "closed".into();
        issues.insert(3, closed);

        let mut cfg = config();
        cfg.filters.state = "open".into();
        let (text, stats) = format_issue_section(&issues, &cfg, &opts());

        assert_eq!(stats.kw_matched, 1);
        assert_eq!(stats.component_only, 1);
        assert_eq!(stats.total_searched, 3);
        assert!(text.contains("# Issues (1 keyword matched / 2 total relevant)"));
        assert!(text.contains("## Summary Table"));
        assert!(text.contains("## Component Only (1)"));
        assert!(!text.contains("[#3]"));
    }

    #[test]
    fn excluded_issues_never_render() {
        let mut issues = BTreeMap::new();
        issues.insert(1, issue(1, 9.0, &["crash"]));
        issues.insert(2, issue(2, 8.0, &["crash"]));

        let mut cfg = config();
        cfg.exclude_issues = vec![2];
        let (text, stats) = format_issue_section(&issues, &cfg, &opts());
        assert_eq!(stats.kw_matched, 1);
        assert!(!text.contains("[#2]"));
    }

    #[test]
    fn pr_detail_lists_links_and_files() {
        let pr = PullRequest {
            number: 7,
            title: "fix renderer crash".into(),
            state: "closed".into(),
            merged: true,
            url: "https://github.com/octo/widgets/pull/7".into(),
            labels: vec![],
            created_at: "2024-03-02".into(),
            body: String::new(),
            review_comments_text: String::new(),
            comments_fetched: false,
            linked_issues: vec![3],
            changed_files: (0..7).map(|i| format!("src/f{i}.rs")).collect(),
            matched_keywords: ["crash".to_string()].into(),
            matched_in_comments: Default::default(),
            relevance_score: 8.0,
        };
        let detail = format_pr_detail(&pr);
        assert!(detail.contains("\u{2705}"));
        assert!(detail.contains("- Linked issues: #3"));
        assert!(detail.contains("+2 more"));
    }

    #[test]
    fn executive_summary_has_one_row_per_section() {
        let stats = vec![
            SectionStats {
                type_label: "Issues",
                total_searched: 12,
                kw_matched: 3,
                component_only: 2,
                top_score: 9.5,
            },
            SectionStats {
                type_label: "Commits",
                total_searched: 4,
                kw_matched: 0,
                component_only: 0,
                top_score: 0.0,
            },
        ];
        let text = format_executive_summary(&stats, &config(), true);
        assert!(text.contains("| Issues | 12 | 3 | 2 | 9.5 |"));
        assert!(text.contains("| Commits | 4 | 0 | 0 | - |"));
        assert!(text.contains("- **Searched comments**: yes"));
        assert!(text.contains("### Keywords (2)"));
    }

    #[test]
    fn cross_ref_section_uses_continuation_rows() {
        let mut issues = BTreeMap::new();
        issues.insert(42, issue(42, 5.0, &["crash"]));
        let mut prs = BTreeMap::new();
        for number in [70u64, 80] {
            prs.insert(
                number,
                PullRequest {
                    number,
                    title: format!("pr {number}"),
                    state: "open".into(),
                    merged: false,
                    url: String::new(),
                    labels: vec![],
                    created_at: "2024-03-02".into(),
                    body: "fixes #42".into(),
                    review_comments_text: String::new(),
                    comments_fetched: false,
                    linked_issues: vec![42],
                    changed_files: vec![],
                    matched_keywords: Default::default(),
                    matched_in_comments: Default::default(),
                    relevance_score: 0.0,
                },
            );
        }
        let xref = build_cross_references(Some(&issues), Some(&prs), None);
        let results = ResultSet {
            issues: Some(issues),
            prs: Some(prs),
            ..Default::default()
        };
        let text = format_cross_ref_section(&xref, &results, "octo/widgets");
        assert!(text.contains("### Issue \u{2194} PR"));
        assert!(text.contains("| \u{21b3} |"));
        assert!(text.contains("[#42](https://github.com/octo/widgets/issues/42)"));
    }

    #[test]
    fn full_report_renders_only_searched_sections() {
        let mut issues = BTreeMap::new();
        issues.insert(1, issue(1, 9.0, &["crash"]));
        let results = ResultSet {
            issues: Some(issues),
            ..Default::default()
        };
        let text = format_full_report(&config(), &results, None, &opts());
        assert!(text.contains("# Issues"));
        assert!(!text.contains("# Pull Requests"));
        assert!(!text.contains("# Commits"));
        assert!(text.ends_with(&format!("{}\n", footer())));
    }

    #[test]
    fn full_json_mirrors_sections() {
        let mut issues = BTreeMap::new();
        issues.insert(1, issue(1, 9.0, &["crash"]));
        issues.insert(2, issue(2, 1.0, &[]));
        let results = ResultSet {
            issues: Some(issues),
            ..Default::default()
        };
        let text = format_full_json(&config(), &results, &opts());
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["repo"], "octo/widgets");
        assert_eq!(parsed["issues"]["total_searched"], 2);
        assert_eq!(parsed["issues"]["total_relevant"], 1);
        assert_eq!(parsed["issues"]["items"][0]["number"], 1);
        assert!(parsed.get("commits").is_none());
    }
}
