//! Web search backed by the Brave Search API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::SearchConfig;
use crate::error::{Error, Result};

/// Largest page Brave serves for one request.
pub const MAX_RESULTS: usize = 20;

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    /// Text block used in tool output and prompt context.
    pub fn to_snippet(&self) -> String {
        format!(
            "Title: {}\nURL: {}\nSnippet: {}",
            self.title, self.url, self.snippet
        )
    }
}

/// Something that can answer a web search.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Search for `query`, returning at most `limit` results.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
}

/// Reject empty or whitespace-only queries, returning the trimmed query.
pub fn validate_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidParams("query must not be empty".into()));
    }
    Ok(trimmed)
}

/// Clamp a requested result count to what one request can return.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_RESULTS)
}

/// Brave Search API client.
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl BraveSearch {
    /// Create a client from search settings and a shared HTTP client.
    pub fn new(config: &SearchConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for BraveSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query = validate_query(query)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("missing Brave API key (BRAVE_API_KEY)".into()))?;
        let count = clamp_limit(limit).to_string();

        info!(query, count = %count, "Searching the web");

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", query), ("count", count.as_str()), ("offset", "0")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        debug!("Brave response status: {}", status);

        if !status.is_success() {
            error!("Brave API error: {} - {}", status, body);
            return Err(Error::Upstream(format!(
                "Brave API error ({}): {}",
                status, body
            )));
        }

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Upstream(format!("invalid Brave response: {}", e)))?;

        let results = parse_brave_response(&data);
        info!(results = results.len(), "Web search complete");
        Ok(results)
    }
}

/// Pull results out of a Brave web search response.
///
/// A response without a `web` section carries no web hits and yields an
/// empty list.
pub fn parse_brave_response(data: &Value) -> Vec<SearchResult> {
    let Some(entries) = data
        .get("web")
        .and_then(|web| web.get("results"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let field = |entry: &Value, key: &str, fallback: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string()
    };

    entries
        .iter()
        .map(|entry| SearchResult {
            title: field(entry, "title", "No Title"),
            url: field(entry, "url", "No URL"),
            snippet: field(entry, "description", "No Description"),
        })
        .collect()
}
