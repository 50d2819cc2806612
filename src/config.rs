//! Configuration for the research agent and its servers.
//!
//! Values are read from the environment by [`AgentConfig::from_env`]:
//! - `BRAVE_API_KEY` - Brave Search subscription token. Required by the search tool.
//! - `BRAVE_SEARCH_URL` - Search endpoint. Defaults to the public Brave web search API.
//! - `SEARCH_LIMIT` - Results requested per query. Defaults to `3`.
//! - `OPENAI_API_KEY` - API key for the completion endpoint. Required by the sampler.
//! - `OPENAI_BASE_URL` - Base URL of an OpenAI-compatible API.
//!   Defaults to `https://api.openai.com/v1`.
//! - `OPENAI_MODEL` - Model name. Defaults to `gpt-4o-mini`.
//! - `OPENAI_TEMPERATURE` - Default sampling temperature. Defaults to `0.7`.
//! - `OPENAI_MAX_TOKENS` - Optional completion token cap.
//! - `RESOURCE_DIR` - Directory holding stored resources. Defaults to `./resources`.
//! - `HTTP_TIMEOUT_SECS` - Optional timeout for outbound HTTP calls. Off by default.
//! - `INCLUDE_PAPERS` - Whether the agent also searches the paper catalog. Defaults to `true`.
//! - `OPENSEARCH_HOST`, `OPENSEARCH_PORT` - Document index location. Defaults to `localhost:9200`.
//! - `OPENSEARCH_USER`, `OPENSEARCH_PASSWORD` - Basic auth, sent only when both are set.
//! - `OPENSEARCH_INDEX` - Index holding documents and their chunks. Defaults to `documents`.
//! - `OPENAI_EMBEDDINGS_MODEL` - Query embedding model. Defaults to `text-embedding-ada-002`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDINGS_MODEL: &str = "text-embedding-ada-002";

/// Web search settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_BRAVE_SEARCH_URL.to_string(),
            default_limit: 3,
        }
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// OpenSearch document index settings.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub index: String,
    pub embeddings_model: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            user: None,
            password: None,
            index: "documents".to_string(),
            embeddings_model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
        }
    }
}

impl DocumentConfig {
    /// Base URL of the cluster. A host without a scheme is reached over plain HTTP.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }

    /// Basic-auth credentials, present only when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.user.as_deref().zip(self.password.as_deref())
    }
}

/// Top-level configuration, passed to each component at construction.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub documents: DocumentConfig,
    /// Directory holding stored resources.
    pub resource_dir: PathBuf,
    /// Timeout for outbound HTTP calls; `None` waits indefinitely.
    pub http_timeout: Option<Duration>,
    /// Whether the agent also searches the paper catalog.
    pub include_papers: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            documents: DocumentConfig::default(),
            resource_dir: PathBuf::from("resources"),
            http_timeout: None,
            include_papers: true,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// API keys are optional here; the components that need them fail with
    /// [`Error::Config`] when called without one.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let search = SearchConfig {
            api_key: non_empty_var("BRAVE_API_KEY"),
            endpoint: non_empty_var("BRAVE_SEARCH_URL").unwrap_or(defaults.search.endpoint),
            default_limit: parse_var("SEARCH_LIMIT")?.unwrap_or(defaults.search.default_limit),
        };

        let llm = LlmConfig {
            api_key: non_empty_var("OPENAI_API_KEY"),
            base_url: non_empty_var("OPENAI_BASE_URL").unwrap_or(defaults.llm.base_url),
            model: non_empty_var("OPENAI_MODEL").unwrap_or(defaults.llm.model),
            temperature: parse_var("OPENAI_TEMPERATURE")?.unwrap_or(defaults.llm.temperature),
            max_tokens: parse_var("OPENAI_MAX_TOKENS")?,
        };

        let documents = DocumentConfig {
            host: non_empty_var("OPENSEARCH_HOST").unwrap_or(defaults.documents.host),
            port: parse_var("OPENSEARCH_PORT")?.unwrap_or(defaults.documents.port),
            user: non_empty_var("OPENSEARCH_USER"),
            password: non_empty_var("OPENSEARCH_PASSWORD"),
            index: non_empty_var("OPENSEARCH_INDEX").unwrap_or(defaults.documents.index),
            embeddings_model: non_empty_var("OPENAI_EMBEDDINGS_MODEL")
                .unwrap_or(defaults.documents.embeddings_model),
        };

        let resource_dir = non_empty_var("RESOURCE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.resource_dir);

        let http_timeout = parse_var::<u64>("HTTP_TIMEOUT_SECS")?.map(Duration::from_secs);

        let include_papers = parse_var("INCLUDE_PAPERS")?.unwrap_or(defaults.include_papers);

        tracing::debug!(
            search_endpoint = %search.endpoint,
            model = %llm.model,
            opensearch = %documents.base_url(),
            resource_dir = %resource_dir.display(),
            "Loaded configuration"
        );

        Ok(Self {
            search,
            llm,
            documents,
            resource_dir,
            http_timeout,
            include_papers,
        })
    }

    /// Build the shared HTTP client for outbound calls.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("mcp-research-agent/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.http_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", key, raw))),
        None => Ok(None),
    }
}
