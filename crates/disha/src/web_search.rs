//! Web-search collaborator (Tavily-style JSON API).
//!
//! Entirely optional: with no API key configured every search is a graceful
//! no-op returning an empty context string. Successful results are cached
//! in memory, keyed by query text, for a configurable TTL so repeated
//! questions within the window never hit the network twice.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const MAX_RESULTS: usize = 3;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

pub struct WebSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    cache: Mutex<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl WebSearch {
    pub fn new(api_key: Option<String>, ttl: Duration) -> Self {
        if api_key.is_none() {
            tracing::warn!("No web search API key configured; web search disabled");
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Search the web and return a combined context string ("" on any
    /// failure — the pipeline treats an empty context as "no web
    /// information", never as an error).
    pub async fn search_context(&self, query: &str) -> String {
        if let Some(cached) = self.cached(query) {
            tracing::info!(query = query, "Web search cache hit");
            return cached;
        }

        let Some(api_key) = &self.api_key else {
            return String::new();
        };

        let request = json!({
            "api_key": api_key,
            "query": query,
            "search_depth": "advanced",
            "max_results": MAX_RESULTS,
        });

        tracing::info!(query = query, "Searching web");
        let response = match self.client.post(TAVILY_ENDPOINT).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Web search request failed");
                return String::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Web search returned error status");
            return String::new();
        }

        let parsed: SearchResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable web search response");
                return String::new();
            }
        };

        if parsed.results.is_empty() {
            return String::new();
        }

        let context = parsed
            .results
            .iter()
            .take(MAX_RESULTS)
            .map(|r| format!("Source: {} ({})\nContent: {}\n", r.title, r.url, r.content))
            .collect::<Vec<_>>()
            .join("\n---\n");

        self.cache
            .lock()
            .insert(query.to_string(), (context.clone(), Instant::now()));

        context
    }

    fn cached(&self, query: &str) -> Option<String> {
        let mut cache = self.cache.lock();
        match cache.get(query) {
            Some((context, stored)) if stored.elapsed() < self.ttl => Some(context.clone()),
            Some(_) => {
                cache.remove(query);
                None
            }
            None => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn seed_cache(&self, query: &str, context: &str) {
        self.cache
            .lock()
            .insert(query.to_string(), (context.to_string(), Instant::now()));
    }
}
