//! Core domain types for gitscout.
//!
//! One struct per searchable content type, plus the [`SearchItem`] sum type
//! that lets the cache and report layers handle results uniformly while
//! keeping every dispatch an exhaustive match.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Item bodies are capped at this many characters when collected.
pub const BODY_MAX: usize = 50_000;
/// Commit messages are capped at collection time.
pub const COMMIT_MESSAGE_MAX: usize = 1_000;
/// Code snippets keep only the first text-match fragment, capped.
pub const SNIPPET_MAX: usize = 500;

/// Truncate to a character budget without splitting a UTF-8 scalar.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// The five searchable content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Issues,
    Prs,
    Code,
    Commits,
    Discussions,
}

/// All content types, in report order.
pub const ALL_CONTENT_TYPES: [ContentType; 5] = [
    ContentType::Issues,
    ContentType::Prs,
    ContentType::Code,
    ContentType::Commits,
    ContentType::Discussions,
];

impl ContentType {
    /// Section key used in config files, the cache, and CLI arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issues => "issues",
            Self::Prs => "prs",
            Self::Code => "code",
            Self::Commits => "commits",
            Self::Discussions => "discussions",
        }
    }

    /// Parse from a string (case-insensitive, common aliases accepted).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "issues" | "issue" => Some(Self::Issues),
            "prs" | "pr" | "pulls" | "pull_requests" => Some(Self::Prs),
            "code" => Some(Self::Code),
            "commits" | "commit" => Some(Self::Commits),
            "discussions" | "discussion" => Some(Self::Discussions),
            _ => None,
        }
    }

    /// Human-readable label for report headers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Issues => "Issues",
            Self::Prs => "Pull Requests",
            Self::Code => "Code",
            Self::Commits => "Commits",
            Self::Discussions => "Discussions",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// A GitHub issue with scoring metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub comments_text: String,
    #[serde(default)]
    pub comments_fetched: bool,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    #[serde(default)]
    pub matched_in_comments: BTreeSet<String>,
    #[serde(default)]
    pub relevance_score: f64,
}

// ---------------------------------------------------------------------------
// PullRequest
// ---------------------------------------------------------------------------

/// A GitHub pull request with scoring metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub merged: bool,
    pub url: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub review_comments_text: String,
    #[serde(default)]
    pub comments_fetched: bool,
    #[serde(default)]
    pub linked_issues: Vec<u64>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    #[serde(default)]
    pub matched_in_comments: BTreeSet<String>,
    #[serde(default)]
    pub relevance_score: f64,
}

// ---------------------------------------------------------------------------
// CodeHit
// ---------------------------------------------------------------------------

/// A code search result, keyed by file path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeHit {
    pub path: String,
    pub url: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub content_snippet: String,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    #[serde(default)]
    pub relevance_score: f64,
}

// ---------------------------------------------------------------------------
// CommitHit
// ---------------------------------------------------------------------------

/// A commit search result, keyed by full SHA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitHit {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    pub url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    #[serde(default)]
    pub relevance_score: f64,
}

impl CommitHit {
    /// Ten-character SHA prefix used as the cross-reference node id.
    pub fn short_sha(&self) -> String {
        self.sha.chars().take(10).collect()
    }
}

// ---------------------------------------------------------------------------
// DiscussionHit
// ---------------------------------------------------------------------------

/// A GitHub Discussion (GraphQL search result).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscussionHit {
    pub number: u64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub answer_body: String,
    #[serde(default)]
    pub comments_text: String,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    #[serde(default)]
    pub matched_in_comments: BTreeSet<String>,
    #[serde(default)]
    pub relevance_score: f64,
}

// ---------------------------------------------------------------------------
// SearchItem
// ---------------------------------------------------------------------------

/// Tagged union over all result types.
///
/// The cache serializes sections as maps of these so a section/type mismatch
/// is impossible, and downstream dispatch is always an exhaustive match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchItem {
    Issue(Issue),
    Pr(PullRequest),
    Code(CodeHit),
    Commit(CommitHit),
    Discussion(DiscussionHit),
}

impl SearchItem {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Issue(_) => ContentType::Issues,
            Self::Pr(_) => ContentType::Prs,
            Self::Code(_) => ContentType::Code,
            Self::Commit(_) => ContentType::Commits,
            Self::Discussion(_) => ContentType::Discussions,
        }
    }

    /// Stable per-type key: number for issues/PRs/discussions, path for
    /// code, full SHA for commits.
    pub fn key(&self) -> String {
        match self {
            Self::Issue(i) => i.number.to_string(),
            Self::Pr(p) => p.number.to_string(),
            Self::Code(c) => c.path.clone(),
            Self::Commit(c) => c.sha.clone(),
            Self::Discussion(d) => d.number.to_string(),
        }
    }

    pub fn relevance_score(&self) -> f64 {
        match self {
            Self::Issue(i) => i.relevance_score,
            Self::Pr(p) => p.relevance_score,
            Self::Code(c) => c.relevance_score,
            Self::Commit(c) => c.relevance_score,
            Self::Discussion(d) => d.relevance_score,
        }
    }

    pub fn matched_keywords(&self) -> &BTreeSet<String> {
        match self {
            Self::Issue(i) => &i.matched_keywords,
            Self::Pr(p) => &p.matched_keywords,
            Self::Code(c) => &c.matched_keywords,
            Self::Commit(c) => &c.matched_keywords,
            Self::Discussion(d) => &d.matched_keywords,
        }
    }
}

impl From<Issue> for SearchItem {
    fn from(v: Issue) -> Self {
        Self::Issue(v)
    }
}

impl From<PullRequest> for SearchItem {
    fn from(v: PullRequest) -> Self {
        Self::Pr(v)
    }
}

impl From<CodeHit> for SearchItem {
    fn from(v: CodeHit) -> Self {
        Self::Code(v)
    }
}

impl From<CommitHit> for SearchItem {
    fn from(v: CommitHit) -> Self {
        Self::Commit(v)
    }
}

impl From<DiscussionHit> for SearchItem {
    fn from(v: DiscussionHit) -> Self {
        Self::Discussion(v)
    }
}

// ---------------------------------------------------------------------------
// ResultSet
// ---------------------------------------------------------------------------

/// Collected results across all content types, keyed per type.
///
/// `None` means the type was not searched this run, which is distinct from
/// an empty map. BTreeMap keeps iteration deterministic so reports and
/// caches are stable run to run.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub issues: Option<BTreeMap<u64, Issue>>,
    pub prs: Option<BTreeMap<u64, PullRequest>>,
    pub code: Option<BTreeMap<String, CodeHit>>,
    pub commits: Option<BTreeMap<String, CommitHit>>,
    pub discussions: Option<BTreeMap<u64, DiscussionHit>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
