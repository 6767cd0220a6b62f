//! Search configuration and the keyword tier model.
//!
//! A [`SearchConfig`] is built from a JSON file, CLI flags, or both. The
//! keyword tiers carry a lazily derived weight map and keyword union behind
//! an explicit [`KeywordTiers::invalidate`] so mutation can never leave a
//! stale cache behind.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ContentType;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Keyword priority tier. The weight feeds directly into relevance scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn weight(&self) -> f64 {
        match self {
            Self::High => 5.0,
            Self::Medium => 3.0,
            Self::Low => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// KeywordTiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TierDerived {
    /// Lowercased keyword -> tier weight. When the same keyword appears in
    /// several tiers the highest tier wins.
    weights: HashMap<String, f64>,
    /// Union of all keywords in their original casing.
    all: BTreeSet<String>,
}

/// The three keyword tiers plus derived lookups.
///
/// Tier vectors are private; mutation goes through [`KeywordTiers::push`]
/// (or [`extend`](KeywordTiers::extend)) which clears the derived cache, so
/// readers can never observe a weight map out of sync with the tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordTiers {
    #[serde(default)]
    high: Vec<String>,
    #[serde(default)]
    medium: Vec<String>,
    #[serde(default)]
    low: Vec<String>,
    #[serde(skip)]
    derived: OnceLock<TierDerived>,
}

impl KeywordTiers {
    pub fn new(high: Vec<String>, medium: Vec<String>, low: Vec<String>) -> Self {
        Self {
            high,
            medium,
            low,
            derived: OnceLock::new(),
        }
    }

    pub fn high(&self) -> &[String] {
        &self.high
    }

    pub fn medium(&self) -> &[String] {
        &self.medium
    }

    pub fn low(&self) -> &[String] {
        &self.low
    }

    pub fn tier(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::High => &self.high,
            Tier::Medium => &self.medium,
            Tier::Low => &self.low,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty() && self.low.is_empty()
    }

    pub fn total(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    /// Append a keyword to a tier and drop the derived cache.
    pub fn push(&mut self, tier: Tier, keyword: impl Into<String>) {
        match tier {
            Tier::High => self.high.push(keyword.into()),
            Tier::Medium => self.medium.push(keyword.into()),
            Tier::Low => self.low.push(keyword.into()),
        }
        self.invalidate();
    }

    pub fn extend(&mut self, tier: Tier, keywords: impl IntoIterator<Item = String>) {
        match tier {
            Tier::High => self.high.extend(keywords),
            Tier::Medium => self.medium.extend(keywords),
            Tier::Low => self.low.extend(keywords),
        }
        self.invalidate();
    }

    /// Explicitly clear the derived weight map and keyword union.
    ///
    /// Called automatically by the mutating methods; recomputed lazily on
    /// next access.
    pub fn invalidate(&mut self) {
        self.derived = OnceLock::new();
    }

    fn derived(&self) -> &TierDerived {
        self.derived.get_or_init(|| {
            let mut weights = HashMap::new();
            let mut all = BTreeSet::new();
            // Low first so a keyword duplicated across tiers keeps the
            // highest tier's weight.
            for (tier, list) in [
                (Tier::Low, &self.low),
                (Tier::Medium, &self.medium),
                (Tier::High, &self.high),
            ] {
                for kw in list {
                    weights.insert(kw.to_lowercase(), tier.weight());
                    all.insert(kw.clone());
                }
            }
            TierDerived { weights, all }
        })
    }

    /// Lowercased keyword -> weight map (5.0 / 3.0 / 1.0).
    pub fn weight_map(&self) -> &HashMap<String, f64> {
        &self.derived().weights
    }

    /// Union of all keywords, original casing, sorted.
    pub fn all_keywords(&self) -> &BTreeSet<String> {
        &self.derived().all
    }

    /// Case-insensitive membership test across all tiers.
    pub fn contains_ci(&self, keyword: &str) -> bool {
        self.weight_map().contains_key(&keyword.to_lowercase())
    }

    /// Weight for a keyword (case-insensitive), defaulting to 1.0 for
    /// keywords outside the tiers (e.g. found only in secondary text).
    pub fn weight_of(&self, keyword: &str) -> f64 {
        self.weight_map()
            .get(&keyword.to_lowercase())
            .copied()
            .unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// State and date-range filters applied to issue/PR search and reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub state: String,
    pub date_from: String,
    pub date_to: String,
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

/// Full search run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub repo: String,
    pub component: String,
    pub topic: String,
    pub filters: Filters,
    pub exclude_issues: Vec<u64>,
    /// Raw type names so unknown values surface in [`validate`] instead of
    /// failing deserialization with a less helpful message.
    pub search_types: Vec<String>,
    pub keywords: KeywordTiers,
    /// Query templates, possibly containing the `{component}` placeholder.
    /// Empty means "build them from the keyword tiers".
    pub queries: Vec<String>,
    pub max_queries: usize,
    /// Max pages per search query (3 = up to 300 items per query).
    pub max_pages: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            component: String::new(),
            topic: String::new(),
            filters: Filters::default(),
            exclude_issues: Vec::new(),
            search_types: vec!["issues".to_string()],
            keywords: KeywordTiers::default(),
            queries: Vec::new(),
            max_queries: crate::query::DEFAULT_MAX_QUERIES,
            max_pages: 3,
        }
    }
}

impl SearchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn has_component(&self) -> bool {
        !self.component.trim().is_empty()
    }

    /// Pre-flight validation. Returns every problem found; an empty vec
    /// means the config is runnable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("date_from", &self.filters.date_from),
            ("date_to", &self.filters.date_to),
        ] {
            if !value.is_empty() && !ISO_DATE_RE.is_match(value) {
                errors.push(format!("{name}={value:?} is not an ISO date (YYYY-MM-DD)"));
            }
        }
        if !self.filters.date_from.is_empty()
            && !self.filters.date_to.is_empty()
            && self.filters.date_from > self.filters.date_to
        {
            errors.push(format!(
                "date_from ({}) is after date_to ({})",
                self.filters.date_from, self.filters.date_to
            ));
        }
        if !self.filters.state.is_empty() && !matches!(self.filters.state.as_str(), "open" | "closed")
        {
            errors.push(format!(
                "state={:?} is invalid (expected 'open' or 'closed')",
                self.filters.state
            ));
        }
        for st in &self.search_types {
            if ContentType::from_str_loose(st).is_none() {
                errors.push(format!("unknown search type: {st:?}"));
            }
        }
        if self.repo.is_empty() || !self.repo.contains('/') {
            errors.push(format!("repo={:?} must be 'owner/name'", self.repo));
        }
        errors
    }

    /// Content types to search, in canonical order, duplicates removed.
    /// Call only after [`validate`] passed; unknown names are skipped.
    pub fn resolved_types(&self) -> Vec<ContentType> {
        let requested: Vec<ContentType> = self
            .search_types
            .iter()
            .filter_map(|s| ContentType::from_str_loose(s))
            .collect();
        crate::types::ALL_CONTENT_TYPES
            .into_iter()
            .filter(|ct| requested.contains(ct))
            .collect()
    }

    /// GitHub search qualifiers derived from the filters, e.g.
    /// `is:open created:2024-01-01..2024-06-30`.
    pub fn filter_qualifiers(&self) -> String {
        let mut parts = Vec::new();
        if matches!(self.filters.state.as_str(), "open" | "closed") {
            parts.push(format!("is:{}", self.filters.state));
        }
        let (from, to) = (&self.filters.date_from, &self.filters.date_to);
        if !from.is_empty() && !to.is_empty() {
            parts.push(format!("created:{from}..{to}"));
        } else if !from.is_empty() {
            parts.push(format!("created:>={from}"));
        } else if !to.is_empty() {
            parts.push(format!("created:<={to}"));
        }
        parts.join(" ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn tiers() -> KeywordTiers {
        KeywordTiers::new(
            vec!["page fault".into(), "SIGSEGV".into()],
            vec!["crash".into()],
            vec!["gpu".into()],
        )
    }

    // -- Tier ---------------------------------------------------------------

    #[test_case(Tier::High, 5.0 ; "high")]
    #[test_case(Tier::Medium, 3.0 ; "medium")]
    #[test_case(Tier::Low, 1.0 ; "low")]
    fn tier_weights(tier: Tier, expected: f64) {
        assert_eq!(tier.weight(), expected);
    }

    // -- KeywordTiers -------------------------------------------------------

    #[test]
    fn weight_map_is_lowercased() {
        let t = tiers();
        let map = t.weight_map();
        assert_eq!(map.get("sigsegv"), Some(&5.0));
        assert_eq!(map.get("page fault"), Some(&5.0));
        assert_eq!(map.get("crash"), Some(&3.0));
        assert_eq!(map.get("gpu"), Some(&1.0));
        assert_eq!(map.get("SIGSEGV"), None);
    }

    #[test]
    fn all_keywords_keeps_original_casing() {
        let t = tiers();
        assert!(t.all_keywords().contains("SIGSEGV"));
        assert!(!t.all_keywords().contains("sigsegv"));
        assert_eq!(t.all_keywords().len(), 4);
    }

    #[test]
    fn push_invalidates_derived_cache() {
        let mut t = tiers();
        // Force derivation.
        assert_eq!(t.weight_map().len(), 4);
        t.push(Tier::Medium, "hang");
        assert_eq!(t.weight_map().get("hang"), Some(&3.0));
        assert_eq!(t.all_keywords().len(), 5);
    }

    #[test]
    fn high_tier_wins_on_duplicates() {
        let t = KeywordTiers::new(vec!["crash".into()], vec![], vec!["crash".into()]);
        assert_eq!(t.weight_map().get("crash"), Some(&5.0));

        let t = KeywordTiers::new(vec![], vec!["hang".into()], vec!["hang".into()]);
        assert_eq!(t.weight_map().get("hang"), Some(&3.0));
    }

    #[test]
    fn weight_of_defaults_to_one() {
        let t = tiers();
        assert_eq!(t.weight_of("unknown keyword"), 1.0);
        assert_eq!(t.weight_of("Page Fault"), 5.0);
    }

    #[test]
    fn contains_ci_checks_all_tiers() {
        let t = tiers();
        assert!(t.contains_ci("sigsegv"));
        assert!(t.contains_ci("GPU"));
        assert!(!t.contains_ci("hang"));
    }

    #[test]
    fn tiers_serde_skips_derived() {
        let t = tiers();
        let json = serde_json::to_string(&t).unwrap();
        assert!(!json.contains("derived"));
        let back: KeywordTiers = serde_json::from_str(&json).unwrap();
        assert_eq!(back.high(), t.high());
        assert_eq!(back.weight_map().len(), 4);
    }

    // -- filter_qualifiers --------------------------------------------------

    fn config_with_filters(state: &str, from: &str, to: &str) -> SearchConfig {
        SearchConfig {
            repo: "octo/widgets".into(),
            filters: Filters {
                state: state.into(),
                date_from: from.into(),
                date_to: to.into(),
            },
            ..Default::default()
        }
    }

    #[test_case("", "", "", "" ; "none")]
    #[test_case("open", "", "", "is:open" ; "state_only")]
    #[test_case("", "2024-01-01", "2024-06-30", "created:2024-01-01..2024-06-30" ; "date_range")]
    #[test_case("", "2024-01-01", "", "created:>=2024-01-01" ; "from_only")]
    #[test_case("", "", "2024-06-30", "created:<=2024-06-30" ; "to_only")]
    #[test_case("closed", "2024-01-01", "", "is:closed created:>=2024-01-01" ; "state_and_from")]
    fn filter_qualifiers_render(state: &str, from: &str, to: &str, expected: &str) {
        assert_eq!(config_with_filters(state, from, to).filter_qualifiers(), expected);
    }

    // -- validate -----------------------------------------------------------

    #[test]
    fn validate_accepts_good_config() {
        let cfg = config_with_filters("open", "2024-01-01", "2024-06-30");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_rejects_bad_dates() {
        let cfg = config_with_filters("", "01/02/2024", "");
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("ISO date"));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let cfg = config_with_filters("", "2024-06-30", "2024-01-01");
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("after")));
    }

    #[test]
    fn validate_rejects_bad_state() {
        let cfg = config_with_filters("merged", "", "");
        assert!(cfg.validate().iter().any(|e| e.contains("state")));
    }

    #[test]
    fn validate_rejects_unknown_search_type() {
        let mut cfg = config_with_filters("", "", "");
        cfg.search_types = vec!["issues".into(), "wikis".into()];
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("wikis")));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = config_with_filters("merged", "bad", "");
        cfg.repo = "nodash".into();
        assert!(cfg.validate().len() >= 3);
    }

    #[test]
    fn resolved_types_canonical_order_and_dedup() {
        let mut cfg = config_with_filters("", "", "");
        cfg.search_types = vec!["commits".into(), "issues".into(), "issues".into()];
        assert_eq!(
            cfg.resolved_types(),
            vec![ContentType::Issues, ContentType::Commits]
        );
    }

    // -- load/save ----------------------------------------------------------

    #[test]
    fn config_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = config_with_filters("open", "2024-01-01", "");
        cfg.keywords = tiers();
        cfg.search_types = vec!["issues".into(), "prs".into()];
        cfg.save(&path).unwrap();

        let back = SearchConfig::load(&path).unwrap();
        assert_eq!(back.repo, "octo/widgets");
        assert_eq!(back.filters.state, "open");
        assert_eq!(back.keywords.high().len(), 2);
        assert_eq!(back.max_queries, crate::query::DEFAULT_MAX_QUERIES);
    }

    #[test]
    fn config_parses_original_file_shape() {
        let json = r#"{
            "repo": "octo/widgets",
            "component": "renderer",
            "topic": "page fault",
            "filters": {"state": "open", "date_from": "2024-01-01"},
            "search_types": ["issues", "prs"],
            "keywords": {"high": ["page fault"], "medium": ["crash"], "low": []},
            "queries": []
        }"#;
        let cfg: SearchConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.has_component());
        assert_eq!(cfg.keywords.weight_map().get("crash"), Some(&3.0));
        assert_eq!(cfg.filter_qualifiers(), "is:open created:>=2024-01-01");
    }

    // =====================================================================
    // Property-based tests
    // =====================================================================

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn validate_never_panics(
            state in "\\PC{0,10}",
            from in "\\PC{0,12}",
            to in "\\PC{0,12}"
        ) {
            let cfg = config_with_filters(&state, &from, &to);
            let _ = cfg.validate();
        }

        #[test]
        fn weight_map_covers_every_keyword(
            high in proptest::collection::vec("[a-z]{1,8}", 0..5),
            low in proptest::collection::vec("[a-z]{1,8}", 0..5)
        ) {
            let t = KeywordTiers::new(high.clone(), vec![], low.clone());
            for kw in high.iter().chain(low.iter()) {
                prop_assert!(t.weight_map().contains_key(&kw.to_lowercase()));
            }
        }
    }
}
