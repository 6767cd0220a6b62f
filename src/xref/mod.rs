//! Cross-reference engine linking issues, pull requests, and commits.
//!
//! Extracts `#N` references from PR bodies, commit messages, and issue
//! bodies, then builds an edge list plus indexed lookup maps. Links carry a
//! relation: `fixes` when a fix/close/resolve phrase (or a pre-extracted
//! linked issue) backs the reference, `refs` otherwise.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::types::{CommitHit, Issue, PullRequest};

/// References below or at this number are ignored (noise like `#1`).
const MIN_REF_NUM: u64 = 10;
/// References at or above this number are ignored.
const MAX_REF_NUM: u64 = 99_999;

static FIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:fix(?:es|ed)?|close[sd]?|resolve[sd]?)\s+#(\d+)").expect("static regex")
});

static REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").expect("static regex"));

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// All `#N` references in text with sane word boundaries on both sides,
/// filtered to `MIN_REF_NUM < n < MAX_REF_NUM`.
fn extract_refs(text: &str) -> BTreeSet<u64> {
    let mut refs = BTreeSet::new();
    for caps in REF_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        // The hash must not follow a word char, and the digits must not be
        // followed by one, so `a#12` and `#12x` don't count.
        if text[..whole.start()].chars().next_back().is_some_and(is_word_char) {
            continue;
        }
        if text[whole.end()..].chars().next().is_some_and(is_word_char) {
            continue;
        }
        if let Ok(n) = caps[1].parse::<u64>() {
            if n > MIN_REF_NUM && n < MAX_REF_NUM {
                refs.insert(n);
            }
        }
    }
    refs
}

// ---------------------------------------------------------------------------
// Edge model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum NodeId {
    Issue(u64),
    Pr(u64),
    /// Ten-character SHA prefix.
    Commit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Fixes,
    Refs,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub relation: Relation,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct XrefStats {
    pub total_edges: usize,
    pub issue_pr_links: usize,
    pub pr_pr_links: usize,
    pub commit_refs: usize,
}

/// The full cross-reference result: deduplicated edges plus lookup maps.
///
/// Map values are sorted and deduplicated; `issue_to_prs` may hold an empty
/// vec for an issue that references a PR without the PR linking back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrossRefMap {
    pub edges: Vec<Edge>,
    pub issue_to_prs: BTreeMap<u64, Vec<u64>>,
    pub pr_to_issues: BTreeMap<u64, Vec<u64>>,
    pub pr_to_prs: BTreeMap<u64, Vec<u64>>,
    pub commit_to_targets: BTreeMap<String, Vec<NodeId>>,
    pub issue_to_commits: BTreeMap<u64, Vec<String>>,
    pub stats: XrefStats,
}

impl CrossRefMap {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the cross-reference map across whatever result types were searched.
pub fn build_cross_references(
    issues: Option<&BTreeMap<u64, Issue>>,
    prs: Option<&BTreeMap<u64, PullRequest>>,
    commits: Option<&BTreeMap<String, CommitHit>>,
) -> CrossRefMap {
    let issue_nums: BTreeSet<u64> = issues.map(|m| m.keys().copied().collect()).unwrap_or_default();
    let pr_nums: BTreeSet<u64> = prs.map(|m| m.keys().copied().collect()).unwrap_or_default();

    let mut edges: BTreeSet<Edge> = BTreeSet::new();

    // PR title+body -> issue / PR.
    if let Some(prs) = prs {
        for pr in prs.values() {
            let text = format!("{} {}", pr.title, pr.body);

            // Strong links come from fix phrases in the body and from
            // pre-extracted linked issues.
            let mut fix_refs: BTreeSet<u64> = FIX_RE
                .captures_iter(&pr.body)
                .filter_map(|c| c[1].parse().ok())
                .collect();
            fix_refs.extend(&pr.linked_issues);

            let mut all_refs = extract_refs(&text);
            all_refs.remove(&pr.number);
            all_refs.extend(&pr.linked_issues);

            for r in all_refs {
                if issue_nums.contains(&r) {
                    let relation = if fix_refs.contains(&r) {
                        Relation::Fixes
                    } else {
                        Relation::Refs
                    };
                    edges.insert(Edge {
                        source: NodeId::Pr(pr.number),
                        target: NodeId::Issue(r),
                        relation,
                    });
                } else if pr_nums.contains(&r) && r != pr.number {
                    edges.insert(Edge {
                        source: NodeId::Pr(pr.number),
                        target: NodeId::Pr(r),
                        relation: Relation::Refs,
                    });
                }
            }
        }
    }

    // Commit message -> issue / PR. Issues win when a number is both.
    if let Some(commits) = commits {
        for commit in commits.values() {
            for r in extract_refs(&commit.message) {
                if issue_nums.contains(&r) {
                    edges.insert(Edge {
                        source: NodeId::Commit(commit.short_sha()),
                        target: NodeId::Issue(r),
                        relation: Relation::Refs,
                    });
                } else if pr_nums.contains(&r) {
                    edges.insert(Edge {
                        source: NodeId::Commit(commit.short_sha()),
                        target: NodeId::Pr(r),
                        relation: Relation::Refs,
                    });
                }
            }
        }
    }

    // Issue body -> PR.
    if let Some(issues) = issues {
        for issue in issues.values() {
            let mut refs = extract_refs(&issue.body);
            refs.remove(&issue.number);
            for r in refs {
                if pr_nums.contains(&r) {
                    edges.insert(Edge {
                        source: NodeId::Issue(issue.number),
                        target: NodeId::Pr(r),
                        relation: Relation::Refs,
                    });
                }
            }
        }
    }

    index_edges(edges.into_iter().collect())
}

/// Build the lookup maps and stats from a deduplicated edge list.
fn index_edges(edges: Vec<Edge>) -> CrossRefMap {
    let mut map = CrossRefMap::default();

    for edge in &edges {
        match (&edge.source, &edge.target) {
            (NodeId::Pr(src), NodeId::Issue(tgt)) => {
                map.pr_to_issues.entry(*src).or_default().push(*tgt);
                map.issue_to_prs.entry(*tgt).or_default().push(*src);
            }
            (NodeId::Pr(src), NodeId::Pr(tgt)) => {
                map.pr_to_prs.entry(*src).or_default().push(*tgt);
            }
            (NodeId::Commit(sha), NodeId::Issue(tgt)) => {
                map.commit_to_targets
                    .entry(sha.clone())
                    .or_default()
                    .push(NodeId::Issue(*tgt));
                map.issue_to_commits.entry(*tgt).or_default().push(sha.clone());
            }
            (NodeId::Commit(sha), NodeId::Pr(tgt)) => {
                map.commit_to_targets
                    .entry(sha.clone())
                    .or_default()
                    .push(NodeId::Pr(*tgt));
            }
            (NodeId::Issue(_), NodeId::Pr(tgt)) => {
                // Weaker signal: record the issue as linked without counting
                // the PR twice in the issue's list.
                map.issue_to_prs.entry(*tgt).or_default();
            }
            _ => {}
        }
    }

    for list in map.issue_to_prs.values_mut().chain(map.pr_to_issues.values_mut()) {
        list.sort_unstable();
        list.dedup();
    }
    for list in map.pr_to_prs.values_mut() {
        list.sort_unstable();
        list.dedup();
    }
    for list in map.issue_to_commits.values_mut() {
        list.sort();
        list.dedup();
    }
    for list in map.commit_to_targets.values_mut() {
        list.sort();
        list.dedup();
    }

    map.stats = XrefStats {
        total_edges: edges.len(),
        issue_pr_links: edges
            .iter()
            .filter(|e| {
                matches!(
                    (&e.source, &e.target),
                    (NodeId::Pr(_), NodeId::Issue(_)) | (NodeId::Issue(_), NodeId::Pr(_))
                )
            })
            .count(),
        pr_pr_links: edges
            .iter()
            .filter(|e| matches!((&e.source, &e.target), (NodeId::Pr(_), NodeId::Pr(_))))
            .count(),
        commit_refs: edges
            .iter()
            .filter(|e| matches!(e.source, NodeId::Commit(_)))
            .count(),
    };

    info!(
        total = map.stats.total_edges,
        issue_pr = map.stats.issue_pr_links,
        pr_pr = map.stats.pr_pr_links,
        commit = map.stats.commit_refs,
        "built cross-references"
    );

    map.edges = edges;
    map
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn issue(number: u64, body: &str) -> Issue {
        Issue {
            number,
            title: format!("issue {number}"),
            state: "open".into(),
            url: String::new(),
            labels: vec![],
            created_at: "2024-01-01".into(),
            body: body.into(),
            comments_text: String::new(),
            comments_fetched: false,
            matched_keywords: Default::default(),
            matched_in_comments: Default::default(),
            relevance_score: 0.0,
        }
    }

    fn pr(number: u64, body: &str) -> PullRequest {
        PullRequest {
            number,
            title: format!("pr {number}"),
            state: "closed".into(),
            merged: false,
            url: String::new(),
            labels: vec![],
            created_at: "2024-01-01".into(),
            body: body.into(),
            review_comments_text: String::new(),
            comments_fetched: false,
            linked_issues: vec![],
            changed_files: vec![],
            matched_keywords: Default::default(),
            matched_in_comments: Default::default(),
            relevance_score: 0.0,
        }
    }

    fn commit(sha: &str, message: &str) -> CommitHit {
        CommitHit {
            sha: sha.into(),
            message: message.into(),
            url: String::new(),
            author: String::new(),
            date: String::new(),
            changed_files: vec![],
            matched_keywords: Default::default(),
            relevance_score: 0.0,
        }
    }

    fn issues_map(items: Vec<Issue>) -> BTreeMap<u64, Issue> {
        items.into_iter().map(|i| (i.number, i)).collect()
    }

    fn prs_map(items: Vec<PullRequest>) -> BTreeMap<u64, PullRequest> {
        items.into_iter().map(|p| (p.number, p)).collect()
    }

    fn commits_map(items: Vec<CommitHit>) -> BTreeMap<String, CommitHit> {
        items.into_iter().map(|c| (c.sha.clone(), c)).collect()
    }

    // -- extract_refs -------------------------------------------------------

    #[test_case("see #123 for details", &[123] ; "plain_ref")]
    #[test_case("(#456)", &[456] ; "parenthesized")]
    #[test_case("a#123", &[] ; "preceded_by_word_char")]
    #[test_case("#123b", &[] ; "followed_by_word_char")]
    #[test_case("#10", &[] ; "at_lower_bound_excluded")]
    #[test_case("#11", &[11] ; "just_above_lower_bound")]
    #[test_case("#99999", &[] ; "at_upper_bound_excluded")]
    #[test_case("#123 and #123", &[123] ; "deduped")]
    #[test_case("no refs here", &[] ; "none")]
    #[test_case("issue_#99", &[] ; "underscore_is_word_char")]
    fn extract_refs_cases(text: &str, expected: &[u64]) {
        let refs: Vec<u64> = extract_refs(text).into_iter().collect();
        assert_eq!(refs, expected);
    }

    // -- fix pattern --------------------------------------------------------

    #[test_case("fixes #42", true ; "fixes")]
    #[test_case("Fixed #42", true ; "fixed_capitalized")]
    #[test_case("fix #42", true ; "fix")]
    #[test_case("closes #42", true ; "closes")]
    #[test_case("Resolved #42", true ; "resolved")]
    #[test_case("references #42", false ; "references_is_not_fix")]
    #[test_case("fixes#42", false ; "no_space")]
    fn fix_pattern_cases(text: &str, matches: bool) {
        assert_eq!(FIX_RE.is_match(text), matches);
    }

    // -- PR links -----------------------------------------------------------

    #[test]
    fn pr_fix_phrase_yields_fixes_edge() {
        let issues = issues_map(vec![issue(100, "")]);
        let prs = prs_map(vec![pr(200, "fixes #100")]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);

        assert_eq!(map.edges.len(), 1);
        assert_eq!(map.edges[0].relation, Relation::Fixes);
        assert_eq!(map.pr_to_issues[&200], vec![100]);
        assert_eq!(map.issue_to_prs[&100], vec![200]);
    }

    #[test]
    fn pr_plain_ref_yields_refs_edge() {
        let issues = issues_map(vec![issue(100, "")]);
        let prs = prs_map(vec![pr(200, "see #100 for background")]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);
        assert_eq!(map.edges[0].relation, Relation::Refs);
    }

    #[test]
    fn linked_issues_count_even_without_body_mention() {
        let issues = issues_map(vec![issue(100, "")]);
        let mut p = pr(200, "no refs in body");
        p.linked_issues = vec![100];
        let prs = prs_map(vec![p]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);

        assert_eq!(map.edges.len(), 1);
        // linked_issues are treated as strong links.
        assert_eq!(map.edges[0].relation, Relation::Fixes);
    }

    #[test]
    fn pr_self_reference_ignored() {
        let prs = prs_map(vec![pr(200, "supersedes #200")]);
        let map = build_cross_references(None, Some(&prs), None);
        assert!(map.is_empty());
    }

    #[test]
    fn pr_to_pr_reference() {
        let prs = prs_map(vec![pr(200, "follow-up to #201"), pr(201, "")]);
        let map = build_cross_references(None, Some(&prs), None);
        assert_eq!(map.pr_to_prs[&200], vec![201]);
        assert_eq!(map.stats.pr_pr_links, 1);
    }

    #[test]
    fn issue_number_wins_over_pr_number() {
        // Same number present in both result sets: classified as issue.
        let issues = issues_map(vec![issue(300, "")]);
        let prs = prs_map(vec![pr(300, ""), pr(400, "refs #300")]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);
        assert_eq!(map.pr_to_issues[&400], vec![300]);
        assert!(map.pr_to_prs.is_empty());
    }

    #[test]
    fn unknown_refs_dropped() {
        let issues = issues_map(vec![issue(100, "")]);
        let prs = prs_map(vec![pr(200, "see #9999 and #100")]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);
        assert_eq!(map.edges.len(), 1);
    }

    // -- commit links -------------------------------------------------------

    #[test]
    fn commit_refs_issue_and_pr() {
        let issues = issues_map(vec![issue(100, "")]);
        let prs = prs_map(vec![pr(200, "")]);
        let commits = commits_map(vec![commit(
            "abcdef1234567890",
            "fix crash (#100), merged via #200",
        )]);
        let map = build_cross_references(Some(&issues), Some(&prs), Some(&commits));

        let targets = &map.commit_to_targets["abcdef1234"];
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&NodeId::Issue(100)));
        assert!(targets.contains(&NodeId::Pr(200)));
        assert_eq!(map.issue_to_commits[&100], vec!["abcdef1234".to_string()]);
        assert_eq!(map.stats.commit_refs, 2);
    }

    // -- issue -> PR --------------------------------------------------------

    #[test]
    fn issue_body_ref_to_pr_creates_edge_but_no_map_value() {
        let issues = issues_map(vec![issue(100, "addressed by #200")]);
        let prs = prs_map(vec![pr(200, "")]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);

        assert_eq!(map.edges.len(), 1);
        assert_eq!(map.stats.issue_pr_links, 1);
        // The target PR is registered but the weaker signal adds no value.
        assert_eq!(map.issue_to_prs[&200], Vec::<u64>::new());
    }

    // -- dedup and stats ----------------------------------------------------

    #[test]
    fn duplicate_edges_collapse() {
        let issues = issues_map(vec![issue(100, "")]);
        let mut p = pr(200, "fixes #100 and again fixes #100");
        p.linked_issues = vec![100];
        let prs = prs_map(vec![p]);
        let map = build_cross_references(Some(&issues), Some(&prs), None);
        assert_eq!(map.stats.total_edges, 1);
    }

    #[test]
    fn empty_inputs_give_empty_map() {
        let map = build_cross_references(None, None, None);
        assert!(map.is_empty());
        assert_eq!(map.stats.total_edges, 0);
    }

    // =====================================================================
    // Property-based tests
    // =====================================================================

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn extract_refs_never_panics(text in "\\PC{0,300}") {
            let _ = extract_refs(&text);
        }

        #[test]
        fn extracted_refs_stay_in_range(nums in proptest::collection::vec(0u64..200_000, 0..10)) {
            let text: String = nums.iter().map(|n| format!("#{n} ")).collect();
            for r in extract_refs(&text) {
                prop_assert!(r > MIN_REF_NUM && r < MAX_REF_NUM);
            }
        }
    }
}
