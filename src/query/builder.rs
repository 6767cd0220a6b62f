//! Round-based query template generation.
//!
//! Turns the keyword tiers into a small, ordered set of search query
//! templates. Each round targets a different precision/recall trade-off:
//!
//! 1. Single high-tier keywords scoped to the component
//! 2. High-tier pairs OR-joined, unscoped (recall net for the best terms)
//! 3. Medium-tier pairs OR-joined, component-scoped
//! 4. Mixed high+medium OR groups, unscoped
//! 5. Low-tier triples OR-joined, component-scoped
//!
//! Rounds 1 and 3 interleave in the final ordering so early-stop cutoffs
//! still see both precision and breadth. Templates keep the literal
//! `{component}` placeholder; collectors substitute per run.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::SearchConfig;

/// Hard cap on a query template after `{component}` substitution. GitHub
/// rejects search queries past 256 chars; 160 leaves headroom for the
/// `repo:` and filter qualifiers appended later.
pub const MAX_TEMPLATE_LEN: usize = 160;

/// Default cap on the number of generated templates per run.
pub const DEFAULT_MAX_QUERIES: usize = 15;

const R1_CAP: usize = 5;
const R2_CAP: usize = 3;
const R3_CAP: usize = 4;

/// Quote a keyword for the search syntax when it contains whitespace.
fn quote(keyword: &str) -> String {
    if keyword.contains(' ') {
        format!("\"{keyword}\"")
    } else {
        keyword.to_string()
    }
}

fn or_join(keywords: &[String]) -> String {
    keywords.iter().map(|k| quote(k)).collect::<Vec<_>>().join(" OR ")
}

fn with_component(query: String, has_component: bool) -> String {
    if has_component {
        format!("{{component}} {query}")
    } else {
        query
    }
}

/// Template length as it will be after `{component}` substitution.
fn substituted_len(template: &str, component: &str) -> usize {
    template.replace("{component}", component).chars().count()
}

/// Push a candidate, dropping templates that would exceed the length cap
/// once the component is substituted in.
fn push_checked(out: &mut Vec<String>, candidate: String, component: &str) {
    if substituted_len(&candidate, component) > MAX_TEMPLATE_LEN {
        debug!(template = %candidate, "dropping over-length query template");
    } else {
        out.push(candidate);
    }
}

/// Build the ordered query template list for a config.
///
/// Returns an empty vec (with a warning) when no keywords exist at all;
/// otherwise at least round 1 or round 3 produces something.
pub fn build_queries(config: &SearchConfig) -> Vec<String> {
    let tiers = &config.keywords;
    if tiers.is_empty() {
        warn!("no keywords in any tier, cannot build queries");
        return Vec::new();
    }

    let has_comp = config.has_component();
    let comp = config.component.trim();
    let high = tiers.high();
    let medium = tiers.medium();
    let low = tiers.low();

    // Round 1: single high keywords, component-scoped.
    let mut r1 = Vec::new();
    for kw in high.iter().take(R1_CAP) {
        push_checked(&mut r1, with_component(quote(kw), has_comp), comp);
    }

    // Round 2: high pairs, unscoped. Only worthwhile with a component to
    // escape from and at least one complete pair.
    let mut r2 = Vec::new();
    if has_comp && high.len() >= 2 {
        for pair in high[..high.len().min(R2_CAP * 2)].chunks(2) {
            if pair.len() == 2 {
                push_checked(&mut r2, or_join(pair), comp);
            }
        }
    }

    // Round 3: medium pairs, component-scoped. Last group may be a single.
    let mut r3 = Vec::new();
    for group in medium.chunks(2).take(R3_CAP) {
        push_checked(&mut r3, with_component(or_join(group), has_comp), comp);
    }

    // Round 4: cross-tier OR groups, unscoped.
    let mut r4 = Vec::new();
    if !high.is_empty() && !medium.is_empty() {
        let mut group = vec![high[0].clone()];
        group.extend(medium.iter().take(2).cloned());
        push_checked(&mut r4, or_join(&group), comp);
    }
    if high.len() >= 2 && medium.len() >= 3 {
        let mut group = vec![high[1].clone()];
        group.extend(medium[2..medium.len().min(4)].iter().cloned());
        push_checked(&mut r4, or_join(&group), comp);
    }

    // Round 5: low triples, component-scoped, uncapped.
    let mut r5 = Vec::new();
    for group in low.chunks(3) {
        push_checked(&mut r5, with_component(or_join(group), has_comp), comp);
    }

    // Interleave rounds 1 and 3, then append the rest in order.
    let mut ordered = Vec::new();
    for i in 0..r1.len().max(r3.len()) {
        if let Some(q) = r1.get(i) {
            ordered.push(q.clone());
        }
        if let Some(q) = r3.get(i) {
            ordered.push(q.clone());
        }
    }
    ordered.extend(r2);
    ordered.extend(r4);
    ordered.extend(r5);

    // Dedup on whitespace-normalized form, preserving first occurrence.
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for q in ordered {
        let norm = q.split_whitespace().collect::<Vec<_>>().join(" ");
        if seen.insert(norm) {
            queries.push(q);
        }
    }

    queries.truncate(config.max_queries);
    debug!(count = queries.len(), "built query templates");
    queries
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
