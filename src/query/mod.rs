//! Search query construction.
//!
//! - [`builder`] — Tiered round-based query generation from keyword tiers
//! - [`synonyms`] — Seed synonym expansion keyed off the investigation topic

pub mod builder;
pub mod synonyms;

pub use builder::{build_queries, DEFAULT_MAX_QUERIES, MAX_TEMPLATE_LEN};
pub use synonyms::{merge_seed_synonyms, SeedDb};
