//! Keyword relevance scoring for all content types.
//!
//! Shared rules:
//! 1. Component match: +2.0 in text, +3.0 in a label (+3.0 in path for code)
//! 2. Keyword match in title+body: tier weight (high 5.0, medium 3.0, low 1.0)
//! 3. Title bonus: +2.0 when the keyword also appears in the title
//! 4. Frequency bonus: +0.3 per extra occurrence, capped at +2.0
//! 5. Comment-discovered keywords: 0.8x weight
//! 6. Containment dedup: a short keyword is suppressed once a longer keyword
//!    containing it has matched
//! 7. Partial match: for 3+ word keywords, an N-1 word run matching counts
//!    at 0.6x weight
//!
//! PR extras: merged +2.0, linked issues +1.5, fix/resolve/close in the
//! title +1.0, component in changed files +1.5.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::SearchConfig;
use crate::types::{CodeHit, CommitHit, DiscussionHit, Issue, PullRequest, SearchItem};

pub const COMMENT_DISCOUNT: f64 = 0.8;
pub const FREQ_BONUS_FACTOR: f64 = 0.3;
pub const FREQ_BONUS_CAP: f64 = 2.0;
pub const PARTIAL_MATCH_DISCOUNT: f64 = 0.6;

pub const PR_MERGED_BONUS: f64 = 2.0;
pub const PR_LINKED_ISSUE_BONUS: f64 = 1.5;
pub const PR_FIX_TITLE_BONUS: f64 = 1.0;
pub const PR_FILE_COMPONENT_BONUS: f64 = 1.5;

const TITLE_BONUS: f64 = 2.0;
const PARTIAL_TITLE_BONUS: f64 = 1.0;
const COMPONENT_TEXT_BONUS: f64 = 2.0;
const COMPONENT_LABEL_BONUS: f64 = 3.0;
const COMPONENT_PATH_BONUS: f64 = 3.0;
const CODE_PATH_KEYWORD_BONUS: f64 = 1.0;
const COMMIT_SUMMARY_BONUS: f64 = 1.5;
const DISCUSSION_ANSWER_BONUS: f64 = 1.0;

static FIX_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(fix|resolve|close)\b").expect("static regex"));

// ---------------------------------------------------------------------------
// RelevanceScorer
// ---------------------------------------------------------------------------

/// Precomputed scoring state for one config.
///
/// Keywords are lowercased and ordered longest-first so containment dedup
/// sees long keywords before the short ones they contain.
pub struct RelevanceScorer {
    component: String,
    weights: HashMap<String, f64>,
    ordered: Vec<String>,
    suppressed: HashSet<String>,
}

impl RelevanceScorer {
    pub fn new(config: &SearchConfig) -> Self {
        let component = if config.has_component() {
            config.component.to_lowercase()
        } else {
            String::new()
        };
        let weights = config.keywords.weight_map().clone();

        let mut ordered: Vec<String> = weights.keys().cloned().collect();
        // Length descending, then lexicographic for determinism.
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let suppressed = Self::build_containment_filter(&ordered);
        Self {
            component,
            weights,
            ordered,
            suppressed,
        }
    }

    /// Short keywords that are substrings of some longer keyword.
    fn build_containment_filter(ordered: &[String]) -> HashSet<String> {
        let mut suppressed = HashSet::new();
        for (i, long_kw) in ordered.iter().enumerate() {
            for short_kw in &ordered[i + 1..] {
                if short_kw != long_kw && long_kw.contains(short_kw.as_str()) {
                    suppressed.insert(short_kw.clone());
                }
            }
        }
        suppressed
    }

    /// Partial matching for multi-word keywords (3+ words): try the keyword
    /// minus its last word, then minus its first word.
    fn partial_match(keyword: &str, text: &str) -> Option<String> {
        let words: Vec<&str> = keyword.split(' ').collect();
        if words.len() < 3 {
            return None;
        }
        let candidates = [words[..words.len() - 1].join(" "), words[1..].join(" ")];
        candidates.into_iter().find(|c| text.contains(c.as_str()))
    }

    fn is_suppressed_by(&self, keyword: &str, long_matched: &BTreeSet<String>) -> bool {
        self.suppressed.contains(keyword)
            && long_matched.iter().any(|lm| lm.contains(keyword))
    }

    /// Core keyword pass shared by issues, PRs, and discussions.
    ///
    /// Returns (score, matched lowercase keywords).
    fn score_keywords(
        &self,
        text: &str,
        title_lower: &str,
        comment_keywords: &BTreeSet<String>,
    ) -> (f64, BTreeSet<String>) {
        let mut score = 0.0;
        let mut matched = BTreeSet::new();
        let mut long_matched = BTreeSet::new();

        for kw in &self.ordered {
            if text.contains(kw.as_str()) {
                if self.is_suppressed_by(kw, &long_matched) {
                    continue;
                }
                matched.insert(kw.clone());
                long_matched.insert(kw.clone());
                score += self.weights[kw];
                if title_lower.contains(kw.as_str()) {
                    score += TITLE_BONUS;
                }
                let count = text.matches(kw.as_str()).count();
                if count > 1 {
                    score += ((count - 1) as f64 * FREQ_BONUS_FACTOR).min(FREQ_BONUS_CAP);
                }
            } else if title_lower.contains(kw.as_str()) {
                if self.is_suppressed_by(kw, &long_matched) {
                    continue;
                }
                matched.insert(kw.clone());
                long_matched.insert(kw.clone());
                score += self.weights[kw] + TITLE_BONUS;
            } else if let Some(partial) = Self::partial_match(kw, text) {
                if matched.contains(kw) || self.is_suppressed_by(kw, &long_matched) {
                    continue;
                }
                matched.insert(kw.clone());
                long_matched.insert(kw.clone());
                score += self.weights[kw] * PARTIAL_MATCH_DISCOUNT;
                if title_lower.contains(partial.as_str()) {
                    score += PARTIAL_TITLE_BONUS;
                }
            }
        }

        // Keywords found only in comments count at a discount. These come in
        // original casing from the comment scan.
        for keyword in comment_keywords {
            let kw = keyword.to_lowercase();
            if matched.contains(&kw) || self.is_suppressed_by(&kw, &long_matched) {
                continue;
            }
            matched.insert(kw.clone());
            score += self.weights.get(&kw).copied().unwrap_or(1.0) * COMMENT_DISCOUNT;
        }

        (score, matched)
    }

    fn component_score(&self, text: &str, labels: &[String]) -> f64 {
        if self.component.is_empty() {
            return 0.0;
        }
        let mut score = 0.0;
        if text.contains(&self.component) {
            score += COMPONENT_TEXT_BONUS;
        }
        if labels.iter().any(|l| l.to_lowercase().contains(&self.component)) {
            score += COMPONENT_LABEL_BONUS;
        }
        score
    }

    // -- per-item scoring ---------------------------------------------------

    pub fn score_issue(&self, issue: &mut Issue) {
        let text = format!("{} {}", issue.title, issue.body).to_lowercase();
        let title_lower = issue.title.to_lowercase();

        let mut score = self.component_score(&text, &issue.labels);
        let (kw_score, matched) =
            self.score_keywords(&text, &title_lower, &issue.matched_in_comments);
        score += kw_score;

        issue.matched_keywords = matched;
        issue.relevance_score = score;
    }

    pub fn score_pr(&self, pr: &mut PullRequest) {
        let text = format!("{} {}", pr.title, pr.body).to_lowercase();
        let title_lower = pr.title.to_lowercase();

        let mut score = self.component_score(&text, &pr.labels);
        if !self.component.is_empty()
            && pr
                .changed_files
                .iter()
                .any(|f| f.to_lowercase().contains(&self.component))
        {
            score += PR_FILE_COMPONENT_BONUS;
        }

        let (kw_score, matched) =
            self.score_keywords(&text, &title_lower, &pr.matched_in_comments);
        score += kw_score;

        if pr.merged {
            score += PR_MERGED_BONUS;
        }
        if !pr.linked_issues.is_empty() {
            score += PR_LINKED_ISSUE_BONUS;
        }
        if FIX_TITLE_RE.is_match(&pr.title) {
            score += PR_FIX_TITLE_BONUS;
        }

        pr.matched_keywords = matched;
        pr.relevance_score = score;
    }

    pub fn score_code_hit(&self, hit: &mut CodeHit) {
        let path_lower = hit.path.to_lowercase();
        let text = format!("{} {}", hit.path, hit.content_snippet).to_lowercase();
        let mut score = 0.0;
        let mut matched = BTreeSet::new();
        let mut long_matched = BTreeSet::new();

        if !self.component.is_empty() && path_lower.contains(&self.component) {
            score += COMPONENT_PATH_BONUS;
        }

        for kw in &self.ordered {
            if !text.contains(kw.as_str()) {
                continue;
            }
            if self.is_suppressed_by(kw, &long_matched) {
                continue;
            }
            matched.insert(kw.clone());
            long_matched.insert(kw.clone());
            score += self.weights[kw];
            if path_lower.contains(kw.as_str()) {
                score += CODE_PATH_KEYWORD_BONUS;
            }
        }

        hit.matched_keywords = matched;
        hit.relevance_score = score;
    }

    pub fn score_commit(&self, commit: &mut CommitHit) {
        let text = commit.message.to_lowercase();
        let first_line = text.lines().next().unwrap_or("").to_string();
        let mut score = 0.0;
        let mut matched = BTreeSet::new();
        let mut long_matched = BTreeSet::new();

        for kw in &self.ordered {
            if !text.contains(kw.as_str()) {
                continue;
            }
            if self.is_suppressed_by(kw, &long_matched) {
                continue;
            }
            matched.insert(kw.clone());
            long_matched.insert(kw.clone());
            score += self.weights[kw];
            if first_line.contains(kw.as_str()) {
                score += COMMIT_SUMMARY_BONUS;
            }
        }

        commit.matched_keywords = matched;
        commit.relevance_score = score;
    }

    pub fn score_discussion(&self, disc: &mut DiscussionHit) {
        let text =
            format!("{} {} {}", disc.title, disc.body, disc.answer_body).to_lowercase();
        let title_lower = disc.title.to_lowercase();

        // Discussion comments arrive inline with the search result, so the
        // comment scan happens here rather than in a detail-fetch pass.
        if !disc.comments_text.is_empty() {
            let comments_lower = disc.comments_text.to_lowercase();
            for kw in &self.ordered {
                if comments_lower.contains(kw.as_str()) {
                    disc.matched_in_comments.insert(kw.clone());
                }
            }
        }

        let (mut score, matched) =
            self.score_keywords(&text, &title_lower, &disc.matched_in_comments);

        if !disc.answer_body.is_empty() {
            let answer_lower = disc.answer_body.to_lowercase();
            for kw in &self.ordered {
                if answer_lower.contains(kw.as_str()) && matched.contains(kw) {
                    score += DISCUSSION_ANSWER_BONUS;
                }
            }
        }

        disc.matched_keywords = matched;
        disc.relevance_score = score;
    }

    pub fn score_item(&self, item: &mut SearchItem) {
        match item {
            SearchItem::Issue(i) => self.score_issue(i),
            SearchItem::Pr(p) => self.score_pr(p),
            SearchItem::Code(c) => self.score_code_hit(c),
            SearchItem::Commit(c) => self.score_commit(c),
            SearchItem::Discussion(d) => self.score_discussion(d),
        }
    }

    // -- map-level scoring --------------------------------------------------

    pub fn score_issues(&self, issues: &mut BTreeMap<u64, Issue>) {
        debug!(count = issues.len(), "scoring issues");
        for issue in issues.values_mut() {
            self.score_issue(issue);
        }
    }

    pub fn score_prs(&self, prs: &mut BTreeMap<u64, PullRequest>) {
        debug!(count = prs.len(), "scoring pull requests");
        for pr in prs.values_mut() {
            self.score_pr(pr);
        }
    }

    pub fn score_code(&self, hits: &mut BTreeMap<String, CodeHit>) {
        debug!(count = hits.len(), "scoring code hits");
        for hit in hits.values_mut() {
            self.score_code_hit(hit);
        }
    }

    pub fn score_commits(&self, commits: &mut BTreeMap<String, CommitHit>) {
        debug!(count = commits.len(), "scoring commits");
        for commit in commits.values_mut() {
            self.score_commit(commit);
        }
    }

    pub fn score_discussions(&self, discs: &mut BTreeMap<u64, DiscussionHit>) {
        debug!(count = discs.len(), "scoring discussions");
        for disc in discs.values_mut() {
            self.score_discussion(disc);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
