//! The server roles and the backends they run on.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::catalog::PaperCatalog;
use crate::config::AgentConfig;
use crate::documents::{DocumentBackend, DocumentServer, OpenSearchDocuments};
use crate::error::{Error, Result};
use crate::prompts::PromptServer;
use crate::resources::{ResourceServer, ResourceStore};
use crate::sampling::{CompletionBackend, OpenAiCompletion, SamplingServer};
use crate::search::{BraveSearch, SearchBackend};
use crate::server::McpServer;
use crate::tools::ToolServer;

/// One of the servers this crate can run.
///
/// The agent talks to the first four; `Documents` serves the OpenSearch
/// document index on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    Tools,
    Prompts,
    Resources,
    Sampling,
    Documents,
}

impl ServerRole {
    pub const ALL: [ServerRole; 5] = [
        ServerRole::Tools,
        ServerRole::Prompts,
        ServerRole::Resources,
        ServerRole::Sampling,
        ServerRole::Documents,
    ];

    /// Build the MCP server for this role.
    pub fn build(self, backends: &Backends, config: &AgentConfig) -> McpServer {
        match self {
            ServerRole::Tools => McpServer::new(ToolServer::new(
                backends.search.clone(),
                config.search.default_limit,
            )),
            ServerRole::Prompts => McpServer::new(PromptServer::default()),
            ServerRole::Resources => McpServer::new(ResourceServer::new(
                ResourceStore::new(&config.resource_dir),
                PaperCatalog::seeded(),
            )),
            ServerRole::Sampling => {
                McpServer::new(SamplingServer::new(backends.completion.clone()))
            }
            ServerRole::Documents => {
                McpServer::new(DocumentServer::new(backends.documents.clone()))
            }
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerRole::Tools => "tools",
            ServerRole::Prompts => "prompts",
            ServerRole::Resources => "resources",
            ServerRole::Sampling => "sampling",
            ServerRole::Documents => "documents",
        };
        f.write_str(name)
    }
}

impl FromStr for ServerRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tools" | "search" => Ok(ServerRole::Tools),
            "prompts" | "prompt" => Ok(ServerRole::Prompts),
            "resources" | "resource" | "store" => Ok(ServerRole::Resources),
            "sampling" | "llm" => Ok(ServerRole::Sampling),
            "documents" | "document" | "opensearch" => Ok(ServerRole::Documents),
            _ => Err(Error::InvalidParams(format!("unknown server role: {}", s))),
        }
    }
}

/// External services behind the tool, sampling and document roles.
#[derive(Clone)]
pub struct Backends {
    pub search: Arc<dyn SearchBackend>,
    pub completion: Arc<dyn CompletionBackend>,
    pub documents: Arc<dyn DocumentBackend>,
}

impl Backends {
    /// Brave search, OpenAI completion and OpenSearch documents, configured from `config`.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let http = config.http_client()?;
        Ok(Self {
            search: Arc::new(BraveSearch::new(&config.search, http.clone())),
            completion: Arc::new(OpenAiCompletion::new(&config.llm, http.clone())),
            documents: Arc::new(OpenSearchDocuments::new(
                &config.documents,
                &config.llm,
                http,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_round_trip() {
        for role in ServerRole::ALL {
            assert_eq!(role.to_string().parse::<ServerRole>().unwrap(), role);
        }
        assert_eq!("LLM".parse::<ServerRole>().unwrap(), ServerRole::Sampling);
        assert_eq!(
            "opensearch".parse::<ServerRole>().unwrap(),
            ServerRole::Documents
        );
        assert!("mail".parse::<ServerRole>().is_err());
    }

    #[test]
    fn test_build_reports_role_name() {
        let config = AgentConfig::default();
        let backends = Backends::from_config(&config).unwrap();
        let server = ServerRole::Prompts.build(&backends, &config);
        assert_eq!(server.info().name, "research-prompt-server");

        let server = ServerRole::Documents.build(&backends, &config);
        assert_eq!(server.info().name, "opensearch-document-server");
    }
}
