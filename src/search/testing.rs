//! Scripted in-memory transport for collector tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::github::{RatePool, SearchEndpoint, SearchTransport};

/// A [`SearchTransport`] that answers from pre-scripted responses.
///
/// Search queries are matched by their full query string; unknown queries
/// return no items. GET responses are keyed by URL and returned on page 1,
/// with an empty array on later pages. GraphQL responses are consumed in
/// the order they were scripted.
#[derive(Default)]
pub(crate) struct FakeTransport {
    pub token: bool,
    pub core_budget: u64,
    pub search_results: HashMap<String, Vec<Value>>,
    pub get_responses: HashMap<String, Value>,
    pub graphql_responses: Mutex<Vec<Value>>,
    pub search_calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn with_token() -> Self {
        Self {
            token: true,
            core_budget: 5000,
            ..Default::default()
        }
    }

    pub fn script_search(&mut self, full_query: &str, items: Vec<Value>) {
        self.search_results.insert(full_query.to_string(), items);
    }

    pub fn script_get(&mut self, url: &str, response: Value) {
        self.get_responses.insert(url.to_string(), response);
    }

    pub fn script_graphql(&mut self, response: Value) {
        self.graphql_responses.lock().unwrap().push(response);
    }

    pub fn search_call_count(&self) -> usize {
        self.search_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchTransport for FakeTransport {
    fn has_token(&self) -> bool {
        self.token
    }

    async fn check_core_budget(&self) -> u64 {
        self.core_budget
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        _pool: RatePool,
        _accept: Option<&str>,
    ) -> Option<Value> {
        let page = params
            .iter()
            .find(|(k, _)| *k == "page")
            .map(|(_, v)| v.as_str())
            .unwrap_or("1");
        if page != "1" {
            return Some(Value::Array(vec![]));
        }
        self.get_responses.get(url).cloned()
    }

    async fn search(
        &self,
        _endpoint: SearchEndpoint,
        query: &str,
        _per_page: u32,
        _max_pages: u32,
    ) -> Vec<Value> {
        self.search_calls.lock().unwrap().push(query.to_string());
        self.search_results.get(query).cloned().unwrap_or_default()
    }

    async fn graphql(&self, _query: &str, _variables: Value) -> Option<Value> {
        let mut responses = self.graphql_responses.lock().unwrap();
        if responses.is_empty() {
            None
        } else {
            Some(responses.remove(0))
        }
    }
}
