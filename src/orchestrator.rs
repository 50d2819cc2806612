//! The research agent: one query through prompt, search, sampling and storage.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument};

use crate::catalog::Paper;
use crate::client::McpClient;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::prompts::{PromptTemplate, RESEARCH_PROMPT};
use crate::protocol::{CreateMessageParams, PromptMessage};
use crate::resources::paper_search_uri;
use crate::roles::{Backends, ServerRole};
use crate::search::{validate_query, SearchResult};
use crate::tools::{search_results_from, SEARCH_WEB};
use crate::workflow::{ResearchRun, RunState};

const SYSTEM_PROMPT: &str = "You are a helpful research assistant. \
Combine the web search results and reference papers provided to answer the user's query.";

const SUMMARY_TEMPERATURE: f32 = 0.4;
const MAX_SLUG_LEN: usize = 64;

/// Clients for the four servers.
pub struct AgentClients {
    pub tools: McpClient,
    pub prompts: McpClient,
    pub resources: McpClient,
    pub sampling: McpClient,
}

/// Remote server URLs. A missing URL means the role runs in-process.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub tools: Option<String>,
    pub prompts: Option<String>,
    pub resources: Option<String>,
    pub sampling: Option<String>,
}

impl Endpoints {
    fn get(&self, role: ServerRole) -> Option<&str> {
        match role {
            ServerRole::Tools => self.tools.as_deref(),
            ServerRole::Prompts => self.prompts.as_deref(),
            ServerRole::Resources => self.resources.as_deref(),
            ServerRole::Sampling => self.sampling.as_deref(),
            ServerRole::Documents => None,
        }
    }
}

impl AgentClients {
    /// Clients for every role, remote where `endpoints` names a URL.
    pub fn connect(
        config: &AgentConfig,
        backends: &Backends,
        endpoints: &Endpoints,
        http: &reqwest::Client,
    ) -> Self {
        let client_for = |role: ServerRole| match endpoints.get(role) {
            Some(url) => McpClient::http(http.clone(), url),
            None => McpClient::in_process(Arc::new(role.build(backends, config))),
        };

        Self {
            tools: client_for(ServerRole::Tools),
            prompts: client_for(ServerRole::Prompts),
            resources: client_for(ServerRole::Resources),
            sampling: client_for(ServerRole::Sampling),
        }
    }

    /// Clients for in-process servers only.
    pub fn in_process(config: &AgentConfig, backends: &Backends) -> Self {
        Self::connect(config, backends, &Endpoints::default(), &reqwest::Client::new())
    }
}

/// Agent behaviour knobs.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Prompt template to request.
    pub template: String,
    /// Web results requested per query.
    pub search_limit: usize,
    /// Whether to search the paper catalog too.
    pub include_papers: bool,
    /// Sampling temperature for the summary.
    pub temperature: f32,
}

impl AgentOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            search_limit: config.search.default_limit,
            include_papers: config.include_papers,
            ..Default::default()
        }
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            template: RESEARCH_PROMPT.to_string(),
            search_limit: 3,
            include_papers: true,
            temperature: SUMMARY_TEMPERATURE,
        }
    }
}

/// What the user gets back from a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub summary: String,
    pub resource_name: String,
    pub resource_uri: String,
    pub model: String,
    pub web_results: Vec<SearchResult>,
    pub papers: Vec<Paper>,
    pub run: ResearchRun,
}

/// Sequential research agent.
pub struct ResearchAgent {
    clients: AgentClients,
    options: AgentOptions,
}

impl ResearchAgent {
    pub fn new(clients: AgentClients, options: AgentOptions) -> Self {
        Self { clients, options }
    }

    /// Agent with all four servers in-process over the given backends.
    pub fn in_process(config: &AgentConfig, backends: &Backends) -> Self {
        Self::new(
            AgentClients::in_process(config, backends),
            AgentOptions::from_config(config),
        )
    }

    /// Run the `initialize` handshake with every server.
    pub async fn connect(&self) -> Result<()> {
        for client in [
            &self.clients.prompts,
            &self.clients.tools,
            &self.clients.resources,
            &self.clients.sampling,
        ] {
            client.initialize().await?;
        }
        Ok(())
    }

    /// Research `query` from start to finish.
    pub async fn run(&self, query: &str) -> Result<ResearchReport> {
        let query = validate_query(query)?;
        let mut run = ResearchRun::new(query);
        self.run_with(&mut run).await
    }

    /// Drive an existing run. On failure the run is left in `Failed`.
    #[instrument(skip(self, run), fields(run_id = %run.id, query = %run.query))]
    pub async fn run_with(&self, run: &mut ResearchRun) -> Result<ResearchReport> {
        validate_query(&run.query)?;
        if run.state != RunState::AwaitingQuery {
            return Err(Error::InvalidState(format!(
                "run {} already started ({})",
                run.id, run.state
            )));
        }

        match self.execute(run).await {
            Ok(report) => {
                info!(
                    resource = %report.resource_uri,
                    duration_ms = report.run.duration_ms(),
                    "Research run complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(state = %run.state, "Research run failed: {}", e);
                run.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut ResearchRun) -> Result<ResearchReport> {
        let query = run.query.trim().to_string();

        run.advance_to(RunState::FetchingTemplate)?;
        let template = self.fetch_template().await?;

        run.advance_to(RunState::Searching)?;
        let web_results = self.search_web(&query).await?;
        let papers = if self.options.include_papers {
            Some(self.search_papers(&query).await?)
        } else {
            None
        };

        let context = build_context(&web_results, papers.as_deref());
        let filled = template.fill(&HashMap::from([
            ("query".to_string(), query.clone()),
            ("search_results".to_string(), context),
        ]))?;

        run.advance_to(RunState::Summarizing)?;
        let params = CreateMessageParams {
            messages: vec![PromptMessage::user(filled)],
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            temperature: Some(self.options.temperature),
            max_tokens: None,
        };
        let message = self.clients.sampling.create_message(&params).await?;
        let summary = message.content.as_text().to_string();

        run.advance_to(RunState::Storing)?;
        let resource_name = resource_name_for(&query);
        let resource_uri = self
            .clients
            .resources
            .create_resource(&resource_name, &summary)
            .await?;

        run.advance_to(RunState::Done)?;

        Ok(ResearchReport {
            query,
            summary,
            resource_name,
            resource_uri,
            model: message.model,
            web_results,
            papers: papers.unwrap_or_default(),
            run: run.clone(),
        })
    }

    async fn fetch_template(&self) -> Result<PromptTemplate> {
        let prompt = self
            .clients
            .prompts
            .get_prompt(&self.options.template, &HashMap::new())
            .await?;
        Ok(PromptTemplate::new(
            self.options.template.clone(),
            prompt.description,
            prompt.template,
        ))
    }

    async fn search_web(&self, query: &str) -> Result<Vec<SearchResult>> {
        let result = self
            .clients
            .tools
            .call_tool(
                SEARCH_WEB,
                json!({ "query": query, "limit": self.options.search_limit }),
            )
            .await?;
        let results = search_results_from(&result)?;
        info!(count = results.len(), "Web results received");
        Ok(results)
    }

    async fn search_papers(&self, query: &str) -> Result<Vec<Paper>> {
        #[derive(Deserialize)]
        struct PaperMatches {
            results: Vec<Paper>,
        }

        let read = self
            .clients
            .resources
            .read_resource(&paper_search_uri(query))
            .await?;
        let text = read
            .contents
            .first()
            .map(|c| c.text.as_str())
            .ok_or_else(|| Error::Protocol("paper search returned no contents".into()))?;
        let matches: PaperMatches = serde_json::from_str(text)?;
        info!(count = matches.results.len(), "Paper matches received");
        Ok(matches.results)
    }
}

/// Search context inserted into the prompt: web hits, then papers.
pub fn build_context(web_results: &[SearchResult], papers: Option<&[Paper]>) -> String {
    let mut context = String::from("=== Web Results ===\n");
    if web_results.is_empty() {
        context.push_str("No web results.");
    } else {
        let snippets: Vec<_> = web_results.iter().map(SearchResult::to_snippet).collect();
        context.push_str(&snippets.join("\n\n"));
    }

    if let Some(papers) = papers {
        context.push_str("\n\n=== Local Papers ===\n");
        if papers.is_empty() {
            context.push_str("No local paper matches.");
        } else {
            let snippets: Vec<_> = papers.iter().map(Paper::to_snippet).collect();
            context.push_str(&snippets.join("\n\n"));
        }
    }

    context
}

/// Deterministic resource name for a query's summary.
pub fn resource_name_for(query: &str) -> String {
    let mut slug = String::new();
    for c in query.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "query" } else { slug };
    format!("summary-{}.md", slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_is_deterministic() {
        assert_eq!(
            resource_name_for("Weather in Paris?"),
            "summary-weather-in-paris.md"
        );
        assert_eq!(
            resource_name_for("  weather   in paris "),
            "summary-weather-in-paris.md"
        );
        assert_eq!(resource_name_for("¿¡!"), "summary-query.md");
    }

    #[test]
    fn test_resource_name_is_bounded() {
        let name = resource_name_for(&"a b ".repeat(100));
        assert!(name.len() <= "summary-.md".len() + MAX_SLUG_LEN);
        assert!(!name.contains("-.md"));
        assert!(crate::resources::validate_name(&name).is_ok());
    }

    #[test]
    fn test_context_keeps_order_and_marks_empty_sections() {
        let web = vec![
            SearchResult {
                title: "one".into(),
                url: "u1".into(),
                snippet: "s1".into(),
            },
            SearchResult {
                title: "two".into(),
                url: "u2".into(),
                snippet: "s2".into(),
            },
        ];
        let context = build_context(&web, Some(&[]));
        let first = context.find("Title: one").unwrap();
        let second = context.find("Title: two").unwrap();
        assert!(first < second);
        assert!(context.ends_with("No local paper matches."));

        let empty = build_context(&[], None);
        assert_eq!(empty, "=== Web Results ===\nNo web results.");
    }
}
