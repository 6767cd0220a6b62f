//! Tiered keyword search, relevance ranking, and cross-reference mapping
//! for GitHub repositories.
//!
//! Given a topic, a component, and three tiers of weighted keywords,
//! gitscout builds rounds of search queries, runs them across issues,
//! pull requests, code, commits, and discussions, scores every result for
//! relevance, links issues, PRs, and commits that reference each other,
//! and renders the whole thing as a Markdown or JSON report.
//!
//! - [`config`] — search configuration and keyword tiers
//! - [`query`] — query construction rounds and seed synonym expansion
//! - [`github`] — REST/GraphQL transport with rate-limit tracking
//! - [`search`] — per-content-type collectors with early-stop scheduling
//! - [`score`] — keyword and component relevance scoring
//! - [`xref`] — cross-reference graph between issues, PRs, and commits
//! - [`cache`] — incremental result cache for multi-round searches
//! - [`report`] — Markdown and JSON report rendering
//! - [`pipeline`] — run orchestration tying the above together

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod report;
pub mod score;
pub mod search;
pub mod types;
pub mod xref;

pub use error::{Error, Result};
