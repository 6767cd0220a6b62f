//! GitHub API access.
//!
//! [`SearchTransport`] is the seam between collectors and the network: the
//! real [`GitHubClient`] speaks REST and GraphQL with rate limiting and
//! retry, tests substitute a scripted fake.

pub mod client;

pub use client::GitHubClient;

use async_trait::async_trait;
use serde_json::Value;

pub const API_BASE: &str = "https://api.github.com";
pub const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
/// Media type that includes text-match fragments in code search results.
pub const ACCEPT_TEXT_MATCH: &str = "application/vnd.github.text-match+json";
/// Media type required by the commit search endpoint.
pub const ACCEPT_COMMIT_SEARCH: &str = "application/vnd.github.cloak-preview+json";

/// GitHub tracks search and core (REST/GraphQL) quotas separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePool {
    Search,
    Core,
}

// ---------------------------------------------------------------------------
// SearchEndpoint
// ---------------------------------------------------------------------------

/// REST search endpoints used by the collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEndpoint {
    /// Issues and pull requests share one endpoint, split by `is:` qualifier.
    Issues,
    Code,
    Commits,
}

impl SearchEndpoint {
    pub fn url(&self) -> String {
        let path = match self {
            Self::Issues => "issues",
            Self::Code => "code",
            Self::Commits => "commits",
        };
        format!("{API_BASE}/search/{path}")
    }

    /// Accept header override, where the endpoint needs a special media type.
    pub fn accept(&self) -> Option<&'static str> {
        match self {
            Self::Issues => None,
            Self::Code => Some(ACCEPT_TEXT_MATCH),
            Self::Commits => Some(ACCEPT_COMMIT_SEARCH),
        }
    }
}

// ---------------------------------------------------------------------------
// SearchTransport
// ---------------------------------------------------------------------------

/// Network operations the collectors depend on.
///
/// Every method degrades instead of failing: a broken query or exhausted
/// retry budget yields `None`/empty, never an error, so one bad query
/// cannot abort a whole run.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    fn has_token(&self) -> bool;

    /// Remaining core-API quota, refreshed from `/rate_limit` when possible.
    async fn check_core_budget(&self) -> u64;

    /// Plain GET returning parsed JSON, with rate limiting and retry.
    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        pool: RatePool,
        accept: Option<&str>,
    ) -> Option<Value>;

    /// Paginated search query. Returns the accumulated `items` arrays.
    async fn search(
        &self,
        endpoint: SearchEndpoint,
        query: &str,
        per_page: u32,
        max_pages: u32,
    ) -> Vec<Value>;

    /// GraphQL request; returns the response `data` field.
    async fn graphql(&self, query: &str, variables: Value) -> Option<Value>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(SearchEndpoint::Issues, "https://api.github.com/search/issues" ; "issues")]
    #[test_case(SearchEndpoint::Code, "https://api.github.com/search/code" ; "code")]
    #[test_case(SearchEndpoint::Commits, "https://api.github.com/search/commits" ; "commits")]
    fn endpoint_urls(endpoint: SearchEndpoint, expected: &str) {
        assert_eq!(endpoint.url(), expected);
    }

    #[test]
    fn endpoint_accept_overrides() {
        assert_eq!(SearchEndpoint::Issues.accept(), None);
        assert_eq!(SearchEndpoint::Code.accept(), Some(ACCEPT_TEXT_MATCH));
        assert_eq!(SearchEndpoint::Commits.accept(), Some(ACCEPT_COMMIT_SEARCH));
    }
}
