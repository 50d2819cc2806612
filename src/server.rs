//! MCP server shared by every role.
//!
//! [`McpServer`] owns the protocol lifecycle (`initialize`, `ping`,
//! notifications) and hands every capability method to an [`McpHandler`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::protocol::{
    error_codes, InitializeResult, McpRequest, McpResponse, ServerCapabilities, ServerInfo,
    PROTOCOL_VERSION,
};

/// Capability surface of one server role.
#[async_trait::async_trait]
pub trait McpHandler: Send + Sync {
    /// Name and version reported by `initialize`.
    fn server_info(&self) -> ServerInfo;

    /// Capabilities reported by `initialize`.
    fn capabilities(&self) -> ServerCapabilities;

    /// Methods this handler answers, besides the lifecycle methods.
    fn methods(&self) -> &'static [&'static str];

    /// Handle one capability method.
    async fn handle(&self, method: &str, params: Value) -> Result<Value>;
}

/// MCP server wrapping a role handler.
pub struct McpServer {
    handler: Arc<dyn McpHandler>,
    /// Whether the client sent `initialized`.
    initialized: AtomicBool,
}

impl McpServer {
    /// Create a new MCP server.
    pub fn new(handler: impl McpHandler + 'static) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Create a server around a shared handler.
    pub fn from_arc(handler: Arc<dyn McpHandler>) -> Self {
        Self {
            handler,
            initialized: AtomicBool::new(false),
        }
    }

    /// Server info of the wrapped handler.
    pub fn info(&self) -> ServerInfo {
        self.handler.server_info()
    }

    /// Whether the `initialized` notification has been received.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Run the server on stdio, one JSON message per line.
    #[cfg(feature = "stdio")]
    pub async fn run_stdio(&self) -> Result<()> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        info!(server = %self.info().name, "Starting MCP server on stdio");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            let Some(response) = self.handle_message(&line).await else {
                continue;
            };
            let response_json = serde_json::to_string(&response)?;

            debug!("Sending: {}", response_json);

            stdout.write_all(response_json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        info!("stdin closed, MCP server stopping");
        Ok(())
    }

    /// Handle a single raw message. Returns `None` for notifications.
    pub async fn handle_message(&self, message: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return Some(McpResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    e.to_string(),
                ));
            }
        };

        self.handle_request(request).await
    }

    /// Handle a parsed request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.jsonrpc != "2.0" {
            return Some(McpResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                format!("unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let is_capability = self.handler.methods().contains(&request.method.as_str());

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&request),
            "initialized" => {
                // Older clients send this as a request.
                self.initialized.store(true, Ordering::SeqCst);
                McpResponse::success(request.id.clone(), json!({}))
            }
            "ping" => McpResponse::success(request.id.clone(), json!({})),
            _ if is_capability => self.handle_capability(request).await,
            _ => McpResponse::error(
                request.id,
                error_codes::METHOD_NOT_FOUND,
                format!("unknown method: {}", request.method),
            ),
        };

        Some(response)
    }

    fn handle_notification(&self, request: &McpRequest) {
        match request.method.as_str() {
            "initialized" | "notifications/initialized" => {
                self.initialized.store(true, Ordering::SeqCst);
                info!(server = %self.info().name, "MCP server initialized");
            }
            other => debug!("Ignoring notification: {}", other),
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&self, request: &McpRequest) -> McpResponse {
        info!(server = %self.info().name, "Initializing MCP server");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: self.handler.capabilities(),
            server_info: self.handler.server_info(),
        };

        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(request.id.clone(), value),
            Err(e) => McpResponse::error(
                request.id.clone(),
                error_codes::INTERNAL_ERROR,
                e.to_string(),
            ),
        }
    }

    async fn handle_capability(&self, request: McpRequest) -> McpResponse {
        debug!(method = %request.method, "Dispatching capability method");

        match self.handler.handle(&request.method, request.params).await {
            Ok(result) => McpResponse::success(request.id, result),
            Err(e) => {
                warn!(method = %request.method, "Request failed: {}", e);
                McpResponse::error(request.id, e.code(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl McpHandler for EchoHandler {
        fn server_info(&self) -> ServerInfo {
            ServerInfo::named("echo")
        }

        fn capabilities(&self) -> ServerCapabilities {
            ServerCapabilities::default()
        }

        fn methods(&self) -> &'static [&'static str] {
            &["echo", "missing"]
        }

        async fn handle(&self, method: &str, params: Value) -> Result<Value> {
            match method {
                "echo" => Ok(params),
                _ => Err(Error::NotFound("nothing here".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_initialize_reports_server_info() {
        let server = McpServer::new(EchoHandler);
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "echo");
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = McpServer::new(EchoHandler);
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;

        assert!(response.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let server = McpServer::new(EchoHandler);
        let response = server.handle_message("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = McpServer::new(EchoHandler);
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(response.id, Some(json!("a")));
    }

    #[tokio::test]
    async fn test_handler_errors_carry_kind_code() {
        let server = McpServer::new(EchoHandler);
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"missing"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_capability_dispatch() {
        let server = McpServer::new(EchoHandler);
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":3,"method":"echo","params":{"x":1}}"#)
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let server = McpServer::new(EchoHandler);
        let response = server
            .handle_message(r#"{"jsonrpc":"1.0","id":4,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::INVALID_REQUEST);
    }
}
