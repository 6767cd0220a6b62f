//! Seed synonym expansion.
//!
//! A small curated database maps trigger substrings (matched against the
//! investigation topic) to extra keywords per tier. Merging runs before
//! query construction so the expanded tiers feed both query templates and
//! relevance scoring.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{SearchConfig, Tier};
use crate::error::Result;

const EMBEDDED_SEED_JSON: &str = include_str!("../../data/seed_synonyms.json");

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTopic {
    pub id: String,
    pub triggers: Vec<String>,
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

impl SeedTopic {
    fn keywords(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::High => &self.high,
            Tier::Medium => &self.medium,
            Tier::Low => &self.low,
        }
    }

    /// A topic matches when any trigger appears as a substring of the
    /// investigation topic, case-insensitively.
    fn matches(&self, topic_lower: &str) -> bool {
        self.triggers
            .iter()
            .any(|t| topic_lower.contains(&t.to_lowercase()))
    }
}

/// The seed synonym database.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedDb {
    pub topics: Vec<SeedTopic>,
}

impl SeedDb {
    /// The database compiled into the binary.
    pub fn embedded() -> Self {
        // Parse failure here is a build defect, not a runtime condition.
        serde_json::from_str(EMBEDDED_SEED_JSON).expect("embedded seed synonyms parse")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Expand the config's keyword tiers from the embedded seed database.
///
/// Every matching topic contributes; keywords already present in any tier
/// (case-insensitive) are skipped. Returns the number of keywords added.
pub fn merge_seed_synonyms(config: &mut SearchConfig) -> usize {
    merge_from(config, &SeedDb::embedded())
}

pub fn merge_from(config: &mut SearchConfig, db: &SeedDb) -> usize {
    if config.topic.trim().is_empty() {
        return 0;
    }
    let topic_lower = config.topic.to_lowercase();

    let mut existing: HashSet<String> = config
        .keywords
        .all_keywords()
        .iter()
        .map(|k| k.to_lowercase())
        .collect();

    let mut total = 0;
    for topic in &db.topics {
        if !topic.matches(&topic_lower) {
            continue;
        }
        let mut added_here = 0;
        for tier in [Tier::High, Tier::Medium, Tier::Low] {
            let fresh: Vec<String> = topic
                .keywords(tier)
                .iter()
                .filter(|kw| existing.insert(kw.to_lowercase()))
                .cloned()
                .collect();
            added_here += fresh.len();
            if !fresh.is_empty() {
                config.keywords.extend(tier, fresh);
            }
        }
        if added_here > 0 {
            info!(seed = %topic.id, added = added_here, "merged seed synonyms");
        } else {
            debug!(seed = %topic.id, "seed topic matched but added nothing new");
        }
        total += added_here;
    }
    total
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordTiers;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn db() -> SeedDb {
        SeedDb::from_json(
            r#"{
                "topics": [
                    {
                        "id": "crash",
                        "triggers": ["crash", "segfault"],
                        "high": ["crash", "segfault"],
                        "medium": ["SIGSEGV", "core dump"],
                        "low": ["backtrace"]
                    },
                    {
                        "id": "deadlock",
                        "triggers": ["deadlock", "hang"],
                        "high": ["deadlock"],
                        "medium": ["hang"],
                        "low": []
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn config_with_topic(topic: &str) -> SearchConfig {
        SearchConfig {
            repo: "octo/widgets".into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    #[test]
    fn embedded_database_parses() {
        let db = SeedDb::embedded();
        assert!(db.topics.len() >= 8);
        for topic in &db.topics {
            assert!(!topic.triggers.is_empty(), "topic {} has no triggers", topic.id);
        }
    }

    #[test]
    fn merge_adds_keywords_for_matching_topic() {
        let mut cfg = config_with_topic("renderer crash on resize");
        let added = merge_from(&mut cfg, &db());
        assert_eq!(added, 5);
        assert_eq!(cfg.keywords.high(), &["crash", "segfault"]);
        assert!(cfg.keywords.contains_ci("sigsegv"));
        assert!(cfg.keywords.contains_ci("backtrace"));
    }

    #[test]
    fn merge_skips_keywords_already_present() {
        let mut cfg = config_with_topic("app crash");
        cfg.keywords = KeywordTiers::new(vec!["Crash".into()], vec![], vec![]);
        let added = merge_from(&mut cfg, &db());
        // "crash" already present case-insensitively, the other four land.
        assert_eq!(added, 4);
        assert_eq!(cfg.keywords.high(), &["Crash", "segfault"]);
    }

    #[test]
    fn merge_applies_every_matching_topic() {
        let mut cfg = config_with_topic("crash then deadlock under load");
        let added = merge_from(&mut cfg, &db());
        assert_eq!(added, 7);
        assert!(cfg.keywords.contains_ci("deadlock"));
        assert!(cfg.keywords.contains_ci("hang"));
    }

    #[test]
    fn merged_keywords_are_visible_to_weight_map() {
        let mut cfg = config_with_topic("segfault in parser");
        // Force the derived cache before merging.
        assert!(cfg.keywords.weight_map().is_empty());
        merge_from(&mut cfg, &db());
        assert_eq!(cfg.keywords.weight_map().get("core dump"), Some(&3.0));
    }

    #[test_case("" ; "empty_topic")]
    #[test_case("   " ; "blank_topic")]
    #[test_case("slow startup" ; "no_trigger_matches")]
    fn merge_adds_nothing(topic: &str) {
        let mut cfg = config_with_topic(topic);
        assert_eq!(merge_from(&mut cfg, &db()), 0);
        assert!(cfg.keywords.is_empty());
    }

    #[test]
    fn trigger_match_is_case_insensitive() {
        let mut cfg = config_with_topic("Random SEGFAULT in CI");
        assert!(merge_from(&mut cfg, &db()) > 0);
    }
}
