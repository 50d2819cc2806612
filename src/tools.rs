//! Tool definitions and the search-tool server.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::protocol::{
    ContentItem, ServerCapabilities, ServerInfo, ToolCallResult, ToolCapabilities, ToolDefinition,
};
use crate::search::{clamp_limit, validate_query, SearchBackend, SearchResult};
use crate::server::McpHandler;

/// Name of the web search tool.
pub const SEARCH_WEB: &str = "searchWeb";

/// Tool trait for implementing MCP tools.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value) -> Result<ToolCallResult>;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.insert(name, tool);
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::InvalidParams(format!("unknown tool: {}", name)))?;

        tool.execute(arguments).await
    }
}

// =============================================================================
// Tool Implementations
// =============================================================================

/// Tool for searching the web.
pub struct SearchWebTool {
    backend: Arc<dyn SearchBackend>,
    default_limit: usize,
}

impl SearchWebTool {
    pub fn new(backend: Arc<dyn SearchBackend>, default_limit: usize) -> Self {
        Self {
            backend,
            default_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchWebArgs {
    query: String,
    limit: Option<usize>,
}

#[async_trait::async_trait]
impl Tool for SearchWebTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_WEB.into(),
            description:
                "Search the web via Brave Search. Returns title, URL and snippet per result."
                    .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results",
                        "minimum": 1,
                        "maximum": crate::search::MAX_RESULTS,
                        "default": self.default_limit
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolCallResult> {
        let args: SearchWebArgs =
            serde_json::from_value(arguments).map_err(|e| Error::InvalidParams(e.to_string()))?;
        let query = validate_query(&args.query)?;
        let limit = clamp_limit(args.limit.unwrap_or(self.default_limit));

        let results = self.backend.search(query, limit).await?;

        Ok(ToolCallResult {
            content: results
                .iter()
                .map(|r| ContentItem::text(r.to_snippet()))
                .collect(),
            structured_content: Some(json!({ "results": results })),
            is_error: false,
        })
    }
}

/// Recover search results from a `searchWeb` tool result.
pub fn search_results_from(result: &ToolCallResult) -> Result<Vec<SearchResult>> {
    let results = result
        .structured_content
        .as_ref()
        .and_then(|v| v.get("results"))
        .cloned()
        .ok_or_else(|| Error::Protocol("searchWeb result carries no structured results".into()))?;
    Ok(serde_json::from_value(results)?)
}

// =============================================================================
// Server
// =============================================================================

/// Search-tool server role.
pub struct ToolServer {
    registry: ToolRegistry,
}

impl ToolServer {
    /// Server exposing `searchWeb` over the given backend.
    pub fn new(backend: Arc<dyn SearchBackend>, default_limit: usize) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SearchWebTool::new(backend, default_limit)));
        Self::with_registry(registry)
    }

    /// Server over a custom registry.
    pub fn with_registry(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[async_trait::async_trait]
impl McpHandler for ToolServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::named("brave-tools")
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolCapabilities { list_changed: false }),
            ..Default::default()
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &["tools/list", "tools/call"]
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "tools/list" => Ok(json!({ "tools": self.registry.definitions() })),
            "tools/call" => {
                let params: CallToolParams = serde_json::from_value(params)
                    .map_err(|_| Error::InvalidParams("missing tool name".into()))?;

                info!("Calling tool: {}", params.name);

                let result = self
                    .registry
                    .execute(&params.name, params.arguments.unwrap_or_else(|| json!({})))
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            other => Err(Error::Protocol(format!("unsupported method: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Backend returning canned results and recording the requested limit.
    struct CannedSearch {
        results: Vec<SearchResult>,
        seen_limit: Mutex<Option<usize>>,
    }

    #[async_trait::async_trait]
    impl SearchBackend for CannedSearch {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchResult>> {
            *self.seen_limit.lock().unwrap() = Some(limit);
            Ok(self.results.iter().take(limit).cloned().collect())
        }
    }

    fn canned(n: usize) -> Arc<CannedSearch> {
        Arc::new(CannedSearch {
            results: (0..n)
                .map(|i| SearchResult {
                    title: format!("t{i}"),
                    url: format!("https://{i}.example"),
                    snippet: format!("s{i}"),
                })
                .collect(),
            seen_limit: Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn test_search_tool_returns_structured_results() {
        let backend = canned(5);
        let server = ToolServer::new(backend.clone(), 3);

        let value = server
            .handle("tools/call", json!({"name": SEARCH_WEB, "arguments": {"query": "rust"}}))
            .await
            .unwrap();
        let result: ToolCallResult = serde_json::from_value(value).unwrap();

        assert_eq!(result.content.len(), 3);
        assert_eq!(*backend.seen_limit.lock().unwrap(), Some(3));
        let results = search_results_from(&result).unwrap();
        assert_eq!(results[2].title, "t2");
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let backend = canned(1);
        let tool = SearchWebTool::new(backend.clone(), 3);
        tool.execute(json!({"query": "rust", "limit": 1000}))
            .await
            .unwrap();
        assert_eq!(
            *backend.seen_limit.lock().unwrap(),
            Some(crate::search::MAX_RESULTS)
        );
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let server = ToolServer::new(canned(1), 3);
        let err = server
            .handle("tools/call", json!({"name": SEARCH_WEB, "arguments": {"query": ""}}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let server = ToolServer::new(canned(1), 3);
        let err = server
            .handle("tools/call", json!({"name": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let server = ToolServer::new(canned(0), 3);
        let value = server.handle("tools/list", json!({})).await.unwrap();
        assert_eq!(value["tools"][0]["name"], SEARCH_WEB);
        assert_eq!(value["tools"][0]["inputSchema"]["required"][0], "query");
    }
}
