//! MCP client used by the research agent to reach each server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{
    CreateMessageParams, CreateMessageResult, GetPromptResult, InitializeResult, McpRequest,
    McpResponse, ReadResourceResult, ToolCallResult, ToolDefinition, PROTOCOL_VERSION,
};
use crate::server::McpServer;

/// How requests reach a server.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message. Notifications yield `None`.
    async fn send(&self, request: McpRequest) -> Result<Option<McpResponse>>;

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// Dispatches straight into a server living in this process.
pub struct InProcessTransport {
    server: Arc<McpServer>,
}

impl InProcessTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl Transport for InProcessTransport {
    async fn send(&self, request: McpRequest) -> Result<Option<McpResponse>> {
        Ok(self.server.handle_request(request).await)
    }

    fn describe(&self) -> String {
        format!("in-process:{}", self.server.info().name)
    }
}

/// Posts JSON-RPC messages to a server's HTTP endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: McpRequest) -> Result<Option<McpResponse>> {
        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::ACCEPTED || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "server {} returned {}: {}",
                self.url, status, body
            )));
        }

        let body = response.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Client for one MCP server.
pub struct McpClient {
    transport: Box<dyn Transport>,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            next_id: AtomicU64::new(1),
        }
    }

    /// Client talking to an in-process server.
    pub fn in_process(server: Arc<McpServer>) -> Self {
        Self::new(InProcessTransport::new(server))
    }

    /// Client talking to a server over HTTP.
    pub fn http(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self::new(HttpTransport::new(client, url))
    }

    /// Endpoint description, for logs.
    pub fn endpoint(&self) -> String {
        self.transport.describe()
    }

    /// Perform the `initialize` handshake.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request_as(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;

        info!(
            endpoint = %self.endpoint(),
            server = %result.server_info.name,
            "Connected to MCP server"
        );
        Ok(result)
    }

    /// Send a request and return its raw result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint(), method, id, "Sending request");

        let response = self
            .transport
            .send(McpRequest::new(id, method, params))
            .await?
            .ok_or_else(|| Error::Protocol(format!("no response to {}", method)))?;

        if let Some(error) = response.error {
            return Err(Error::from_rpc(&error));
        }
        response
            .result
            .ok_or_else(|| Error::Protocol(format!("empty result for {}", method)))
    }

    async fn request_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.transport
            .send(McpRequest::notification(method, params))
            .await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.request("ping", json!({})).await.map(|_| ())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let value = self.request("tools/list", json!({})).await?;
        Ok(serde_json::from_value(value["tools"].clone())?)
    }

    /// Call a tool. A result flagged `isError` becomes an upstream error.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let result: ToolCallResult = self
            .request_as("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        if result.is_error {
            let text = result
                .content
                .iter()
                .map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::Upstream(format!("tool {} failed: {}", name, text)));
        }
        Ok(result)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        self.request_as(
            "prompts/get",
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.request_as("resources/read", json!({ "uri": uri })).await
    }

    /// Store `text` under `name`, returning the resource URI.
    pub async fn create_resource(&self, name: &str, text: &str) -> Result<String> {
        let value = self
            .request("resources/create", json!({ "name": name, "text": text }))
            .await?;
        value["uri"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("resources/create returned no uri".into()))
    }

    pub async fn delete_resource(&self, name: &str) -> Result<()> {
        self.request("resources/delete", json!({ "name": name }))
            .await
            .map(|_| ())
    }

    pub async fn create_message(
        &self,
        params: &CreateMessageParams,
    ) -> Result<CreateMessageResult> {
        self.request_as("sampling/createMessage", serde_json::to_value(params)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PaperCatalog;
    use crate::prompts::{PromptServer, RESEARCH_PROMPT};
    use crate::resources::{ResourceServer, ResourceStore};

    fn prompt_client() -> McpClient {
        McpClient::in_process(Arc::new(McpServer::new(PromptServer::default())))
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let server = Arc::new(McpServer::new(PromptServer::default()));
        let client = McpClient::in_process(server.clone());

        let init = client.initialize().await.unwrap();
        assert_eq!(init.server_info.name, "research-prompt-server");
        assert!(init.capabilities.prompts.is_some());
        assert!(server.is_initialized());
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_not_found_survives_the_wire() {
        let client = prompt_client();
        let err = client
            .get_prompt("missing", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_get_prompt() {
        let client = prompt_client();
        let prompt = client
            .get_prompt(RESEARCH_PROMPT, &HashMap::new())
            .await
            .unwrap();
        assert!(prompt.template.contains("{search_results}"));
    }

    #[tokio::test]
    async fn test_method_not_served_is_protocol_error() {
        let client = prompt_client();
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_resource_calls() {
        let dir = tempfile::tempdir().unwrap();
        let server = ResourceServer::new(ResourceStore::new(dir.path()), PaperCatalog::seeded());
        let client = McpClient::in_process(Arc::new(McpServer::new(server)));

        let uri = client.create_resource("a.md", "body").await.unwrap();
        let read = client.read_resource(&uri).await.unwrap();
        assert_eq!(read.contents[0].text, "body");

        client.delete_resource("a.md").await.unwrap();
        let err = client.read_resource(&uri).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
