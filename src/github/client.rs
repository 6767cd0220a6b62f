//! The real GitHub API client: REST + GraphQL over reqwest.
//!
//! Tracks both rate pools from response headers, waits before requests when
//! a pool runs low, and retries 403/5xx/connection failures with bounded
//! backoff. All failures degrade to `None`/empty rather than erroring.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::{RatePool, SearchEndpoint, SearchTransport, ACCEPT_JSON, API_BASE};

const USER_AGENT: &str = concat!("gitscout/", env!("CARGO_PKG_VERSION"));
const MAX_RETRIES: u32 = 3;
/// GitHub's search API never returns results past the first 1000.
const SEARCH_RESULT_CEILING: usize = 1000;
const PAGE_PAUSE_MS: u64 = 500;

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Seconds until a pool resets, clamped to `[min, max]`.
fn rate_wait_secs(reset: i64, now: i64, min: u64, max: u64) -> u64 {
    let wait = (reset - now).max(0) as u64;
    wait.clamp(min, max)
}

/// Exponential backoff for 5xx and connection failures: 2s, 4s, 8s.
fn backoff_secs(retries: u32) -> u64 {
    2u64.pow(retries) * 2
}

#[derive(Debug)]
struct RateState {
    search_remaining: i64,
    search_reset: i64,
    core_remaining: i64,
    core_reset: i64,
}

impl Default for RateState {
    fn default() -> Self {
        // Authenticated defaults; real numbers arrive with the first response.
        Self {
            search_remaining: 30,
            search_reset: 0,
            core_remaining: 5000,
            core_reset: 0,
        }
    }
}

pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    state: Mutex<RateState>,
}

impl GitHubClient {
    /// Build a client; falls back to the `GITHUB_TOKEN` environment variable
    /// when no token is given.
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            token,
            state: Mutex::new(RateState::default()),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder, accept: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = builder
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, accept.unwrap_or(ACCEPT_JSON));
        if !self.token.is_empty() {
            builder = builder.header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.token),
            );
        }
        builder
    }

    /// Wait out a nearly-exhausted pool. After waiting the counter is set to
    /// a small positive value rather than assuming full recovery; the next
    /// response's headers carry the real count.
    async fn wait_if_needed(&self, pool: RatePool) {
        let (wait, remaining) = {
            let state = self.state.lock().await;
            match pool {
                RatePool::Search if state.search_remaining < 3 => (
                    rate_wait_secs(state.search_reset, now_ts(), 5, 65),
                    state.search_remaining,
                ),
                RatePool::Core if state.core_remaining < 5 => (
                    rate_wait_secs(state.core_reset, now_ts(), 5, 65),
                    state.core_remaining,
                ),
                _ => return,
            }
        };

        warn!(remaining, wait_secs = wait, "rate limit low, waiting");
        // Visible even in quiet mode; a silent minute-long stall looks hung.
        eprintln!("  waiting {wait}s for rate limit (remaining {remaining})");
        tokio::time::sleep(Duration::from_secs(wait)).await;

        let mut state = self.state.lock().await;
        match pool {
            RatePool::Search => state.search_remaining = 3,
            RatePool::Core => state.core_remaining = 5,
        }
    }

    async fn record_headers(&self, pool: RatePool, headers: &reqwest::header::HeaderMap) {
        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
        };
        let Some(remaining) = parse("x-ratelimit-remaining") else {
            return;
        };
        let reset = parse("x-ratelimit-reset").unwrap_or(0);
        let mut state = self.state.lock().await;
        match pool {
            RatePool::Search => {
                state.search_remaining = remaining;
                state.search_reset = reset;
            }
            RatePool::Core => {
                state.core_remaining = remaining;
                state.core_reset = reset;
            }
        }
    }
}

#[async_trait]
impl SearchTransport for GitHubClient {
    fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    async fn check_core_budget(&self) -> u64 {
        if self.token.is_empty() {
            // Unauthenticated core quota.
            return 60;
        }
        let url = format!("{API_BASE}/rate_limit");
        let resp = self.request(self.http.get(&url), None).send().await;
        if let Ok(resp) = resp {
            if resp.status().is_success() {
                if let Ok(body) = resp.json::<Value>().await {
                    let core = &body["resources"]["core"];
                    let remaining = core["remaining"].as_i64().unwrap_or(0);
                    let mut state = self.state.lock().await;
                    state.core_remaining = remaining;
                    if let Some(reset) = core["reset"].as_i64() {
                        state.core_reset = reset;
                    }
                    return remaining.max(0) as u64;
                }
            }
        }
        let state = self.state.lock().await;
        state.core_remaining.max(0) as u64
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        pool: RatePool,
        accept: Option<&str>,
    ) -> Option<Value> {
        for retries in 0..=MAX_RETRIES {
            self.wait_if_needed(pool).await;

            let resp = self
                .request(self.http.get(url).query(params), accept)
                .send()
                .await;
            let resp = match resp {
                Ok(resp) => resp,
                Err(err) => {
                    if err.is_connect() && retries < MAX_RETRIES {
                        let wait = backoff_secs(retries);
                        warn!(%err, wait_secs = wait, "connection failed, retrying");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        continue;
                    }
                    error!(%err, url, "request failed");
                    return None;
                }
            };

            self.record_headers(pool, resp.headers()).await;
            let status = resp.status();

            if status.is_success() {
                return resp.json().await.ok();
            }
            if status.as_u16() == 403 {
                if retries >= MAX_RETRIES {
                    error!("rate limited after {MAX_RETRIES} retries, skipping");
                    return None;
                }
                let reset = resp
                    .headers()
                    .get("x-ratelimit-reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                let wait = rate_wait_secs(reset, now_ts(), 10, 120);
                warn!(
                    wait_secs = wait,
                    retry = retries + 1,
                    "rate limited (403), waiting"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            if status.as_u16() == 422 {
                warn!(url, "query rejected as malformed, skipping");
                return None;
            }
            if status.is_server_error() && retries < MAX_RETRIES {
                let wait = backoff_secs(retries);
                warn!(status = status.as_u16(), wait_secs = wait, "server error, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %crate::types::truncate_chars(&body, 200), "api error");
            return None;
        }
        None
    }

    async fn search(
        &self,
        endpoint: SearchEndpoint,
        query: &str,
        per_page: u32,
        max_pages: u32,
    ) -> Vec<Value> {
        let url = endpoint.url();
        let mut all_items = Vec::new();
        let mut warned_ceiling = false;

        for page in 1..=max_pages.max(1) {
            let params = [
                ("q", query.to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ];
            let Some(data) = self
                .get_json(&url, &params, RatePool::Search, endpoint.accept())
                .await
            else {
                break;
            };
            let Some(items) = data.get("items").and_then(Value::as_array) else {
                break;
            };
            all_items.extend(items.iter().cloned());
            let total = data["total_count"].as_u64().unwrap_or(0) as usize;

            if total > SEARCH_RESULT_CEILING && !warned_ceiling {
                warned_ceiling = true;
                warn!(
                    total,
                    pages = max_pages,
                    "query matches more than the API will return"
                );
            }
            if all_items.len() >= total
                || items.len() < per_page as usize
                || all_items.len() >= SEARCH_RESULT_CEILING
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(PAGE_PAUSE_MS)).await;
        }

        debug!(query, count = all_items.len(), "search query finished");
        all_items
    }

    async fn graphql(&self, query: &str, variables: Value) -> Option<Value> {
        let url = format!("{API_BASE}/graphql");
        let payload = serde_json::json!({ "query": query, "variables": variables });

        for retries in 0..=MAX_RETRIES {
            // GraphQL shares the core rate pool.
            self.wait_if_needed(RatePool::Core).await;

            let resp = self
                .request(self.http.post(&url).json(&payload), None)
                .send()
                .await;
            let resp = match resp {
                Ok(resp) => resp,
                Err(err) => {
                    if err.is_connect() && retries < MAX_RETRIES {
                        let wait = backoff_secs(retries);
                        warn!(%err, wait_secs = wait, "graphql connection failed, retrying");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        continue;
                    }
                    error!(%err, "graphql request failed");
                    return None;
                }
            };

            self.record_headers(RatePool::Core, resp.headers()).await;
            let status = resp.status();

            if status.is_success() {
                let body: Value = resp.json().await.ok()?;
                if let Some(errors) = body.get("errors").and_then(Value::as_array) {
                    for err in errors.iter().take(3) {
                        error!(message = %err["message"], "graphql error");
                    }
                    return None;
                }
                return body.get("data").cloned();
            }
            if status.as_u16() == 401 {
                error!("graphql requires authentication (GITHUB_TOKEN)");
                return None;
            }
            if status.as_u16() == 403 {
                if retries >= MAX_RETRIES {
                    error!("graphql rate limited after {MAX_RETRIES} retries, skipping");
                    return None;
                }
                let reset = resp
                    .headers()
                    .get("x-ratelimit-reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                let wait = rate_wait_secs(reset, now_ts(), 10, 120);
                warn!(wait_secs = wait, retry = retries + 1, "graphql rate limited, waiting");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            if status.is_server_error() && retries < MAX_RETRIES {
                let wait = backoff_secs(retries);
                warn!(status = status.as_u16(), wait_secs = wait, "graphql server error, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %crate::types::truncate_chars(&body, 200), "graphql error");
            return None;
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 2 ; "first_retry")]
    #[test_case(1, 4 ; "second_retry")]
    #[test_case(2, 8 ; "third_retry")]
    fn backoff_doubles(retries: u32, expected: u64) {
        assert_eq!(backoff_secs(retries), expected);
    }

    #[test_case(1000, 990, 5, 65, 10 ; "within_bounds")]
    #[test_case(1000, 999, 5, 65, 5 ; "clamped_to_min")]
    #[test_case(1000, 0, 5, 65, 65 ; "clamped_to_max")]
    #[test_case(0, 1000, 5, 65, 5 ; "reset_in_past")]
    fn rate_wait_clamps(reset: i64, now: i64, min: u64, max: u64, expected: u64) {
        assert_eq!(rate_wait_secs(reset, now, min, max), expected);
    }

    #[test]
    fn default_rate_state_assumes_authenticated_quotas() {
        let state = RateState::default();
        assert_eq!(state.search_remaining, 30);
        assert_eq!(state.core_remaining, 5000);
    }

    #[test]
    fn client_without_token_reports_none() {
        // Construct with an explicit empty token so the environment can't
        // leak into the test.
        let client = GitHubClient::new(Some(String::new()));
        assert!(!client.has_token());
    }
}
