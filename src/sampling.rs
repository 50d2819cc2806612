//! LLM sampling backed by an OpenAI-compatible chat completion API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    ContentItem, CreateMessageParams, CreateMessageResult, SamplingCapabilities,
    ServerCapabilities, ServerInfo,
};
use crate::server::McpHandler;

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Something that can complete a prompt.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier reported in sampling results.
    fn model(&self) -> &str;

    /// Generate text for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

// ============================================================================
// OpenAI wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completion client.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiCompletion {
    /// Create a client from LLM settings and a shared HTTP client.
    pub fn new(config: &LlmConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.or(self.max_tokens),
        }
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiCompletion {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("missing OpenAI API key (OPENAI_API_KEY)".into()))?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);

        info!(model = %self.model, prompt_chars = request.prompt.len(), "Requesting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        debug!("[OpenAI] Response status: {}", status);

        if !status.is_success() {
            error!("[OpenAI] API error: {} - {}", status, text);
            return Err(Error::Upstream(format!(
                "OpenAI API error ({}): {}",
                status, text
            )));
        }

        parse_completion(&text)
    }
}

/// Extract the first choice's text from a chat completion body.
fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Upstream(format!("invalid OpenAI response: {}", e)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Upstream("OpenAI response contained no choices".into()))?;

    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

/// LLM sampling server role.
pub struct SamplingServer {
    backend: std::sync::Arc<dyn CompletionBackend>,
}

impl SamplingServer {
    pub fn new(backend: std::sync::Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

/// Turn `sampling/createMessage` params into a completion request.
///
/// Only user messages are forwarded; several are joined by blank lines.
pub fn completion_request_from(params: &CreateMessageParams) -> Result<CompletionRequest> {
    let prompt = params
        .messages
        .iter()
        .filter(|m| m.role == "user")
        .map(|m| m.content.as_text())
        .collect::<Vec<_>>()
        .join("\n\n");

    if prompt.trim().is_empty() {
        return Err(Error::InvalidParams("no user message to sample".into()));
    }

    Ok(CompletionRequest {
        system: params.system_prompt.clone(),
        prompt,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
    })
}

#[async_trait::async_trait]
impl McpHandler for SamplingServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::named("openai-llm-sampler")
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            sampling: Some(SamplingCapabilities::default()),
            ..Default::default()
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &["sampling/createMessage"]
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        if method != "sampling/createMessage" {
            return Err(Error::Protocol(format!("unsupported method: {}", method)));
        }

        let params: CreateMessageParams =
            serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))?;
        let request = completion_request_from(&params)?;
        let text = self.backend.complete(&request).await?;

        Ok(serde_json::to_value(CreateMessageResult {
            role: "assistant".into(),
            content: ContentItem::text(text),
            model: self.backend.model().to_string(),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptMessage;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct RecordingBackend {
        seen: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait::async_trait]
    impl CompletionBackend for RecordingBackend {
        fn model(&self) -> &str {
            "stub-model"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(format!("summary of {} chars", request.prompt.len()))
        }
    }

    #[test]
    fn test_parse_completion_trims() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"  Paris is mild.\n"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Paris is mild.");
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.is_upstream());
        assert!(parse_completion("<html>").unwrap_err().is_upstream());
    }

    #[test]
    fn test_body_includes_system_and_defaults() {
        let config = LlmConfig {
            max_tokens: Some(300),
            ..Default::default()
        };
        let client = OpenAiCompletion::new(&config, reqwest::Client::new());
        let request = CompletionRequest::new("q").with_system("be brief");

        let body = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(body["model"], config.model);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "q");
        assert_eq!(body["max_tokens"], 300);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let cooler = CompletionRequest::new("q").with_temperature(0.2);
        let body = serde_json::to_value(client.build_body(&cooler)).unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let client = OpenAiCompletion::new(&LlmConfig::default(), reqwest::Client::new());
        let err = client.complete(&CompletionRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_create_message_forwards_user_text() {
        let backend = Arc::new(RecordingBackend {
            seen: Mutex::new(None),
        });
        let server = SamplingServer::new(backend.clone());

        let params = CreateMessageParams {
            messages: vec![PromptMessage::user("hello")],
            system_prompt: Some("sys".into()),
            temperature: Some(0.4),
            max_tokens: None,
        };
        let value = server
            .handle("sampling/createMessage", serde_json::to_value(params).unwrap())
            .await
            .unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["model"], "stub-model");
        assert_eq!(value["content"]["text"], "summary of 5 chars");

        let seen = backend.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.system.as_deref(), Some("sys"));
        assert_eq!(seen.temperature, Some(0.4));
    }

    #[tokio::test]
    async fn test_create_message_requires_user_text() {
        let server = SamplingServer::new(Arc::new(RecordingBackend {
            seen: Mutex::new(None),
        }));
        let err = server
            .handle("sampling/createMessage", json!({"messages": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }
}
