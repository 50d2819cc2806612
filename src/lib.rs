//! MCP Research Agent
//!
//! This crate chains four small MCP servers behind one coordinating client:
//!
//! - a search-tool server calling the Brave Search API
//! - a prompt-template server with fixed templates
//! - a file-backed resource server (plus a built-in paper catalog)
//! - an LLM-sampling server calling an OpenAI-compatible completion API
//!
//! A fifth, standalone server searches an OpenSearch index of embedded
//! document chunks (`documents://search/<query>`).
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   user query ──▶│        ResearchAgent         │──▶ summary
//!                 │  (sequential state machine)  │
//!                 └──┬────────┬────────┬───────┬─┘
//!                    │ MCP JSON-RPC (in-process or HTTP)
//!         ┌──────────┘        │        │       └──────────┐
//!         ▼                   ▼        ▼                  ▼
//! ┌───────────────┐ ┌──────────────┐ ┌──────────────┐ ┌───────────────┐
//! │ prompts       │ │ tools        │ │ resources    │ │ sampling      │
//! │ researchPrompt│ │ searchWeb    │ │ store://     │ │ createMessage │
//! │               │ │ (Brave)      │ │ papers://    │ │ (OpenAI)      │
//! └───────────────┘ └──────────────┘ └──────────────┘ └───────────────┘
//! ```
//!
//! A run moves through `AwaitingQuery → FetchingTemplate → Searching →
//! Summarizing → Storing → Done`; any failure ends it in `Failed`.

pub mod catalog;
pub mod client;
pub mod config;
pub mod documents;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod orchestrator;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod roles;
pub mod sampling;
pub mod search;
pub mod server;
pub mod tools;
pub mod workflow;

pub use client::McpClient;
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use orchestrator::{AgentClients, AgentOptions, Endpoints, ResearchAgent, ResearchReport};
pub use protocol::{McpRequest, McpResponse};
pub use roles::{Backends, ServerRole};
pub use server::{McpHandler, McpServer};
pub use workflow::{ResearchRun, RunState};
