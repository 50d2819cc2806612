//! Research Agent - query the web, summarize with an LLM, store the result.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use mcp_research_agent::{
    AgentClients, AgentConfig, AgentOptions, Backends, Endpoints, ResearchAgent, ServerRole,
};

/// Research Agent - chains search, prompt, resource and sampling MCP servers.
#[derive(Parser, Debug)]
#[command(name = "research-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a query and print the summary.
    Ask {
        /// The research query.
        #[arg(required = true)]
        query: Vec<String>,

        /// Web results to request.
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the local paper catalog.
        #[arg(long, default_value = "false")]
        no_papers: bool,

        /// Directory for stored summaries.
        #[arg(long)]
        resource_dir: Option<PathBuf>,

        /// Print the full report as JSON instead of the summary.
        #[arg(long, default_value = "false")]
        json: bool,

        /// URL of a remote search-tool server.
        #[arg(long, env = "TOOLS_SERVER_URL")]
        tools_url: Option<String>,

        /// URL of a remote prompt server.
        #[arg(long, env = "PROMPT_SERVER_URL")]
        prompts_url: Option<String>,

        /// URL of a remote resource server.
        #[arg(long, env = "RESOURCE_SERVER_URL")]
        resources_url: Option<String>,

        /// URL of a remote sampling server.
        #[arg(long, env = "SAMPLING_SERVER_URL")]
        sampling_url: Option<String>,
    },

    /// Run a single server (tools, prompts, resources, sampling or documents).
    Serve {
        /// Server role.
        role: ServerRole,

        /// Serve HTTP on this address instead of stdio.
        #[arg(long)]
        http: Option<SocketAddr>,

        /// Directory for stored resources.
        #[arg(long)]
        resource_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with stdio protocol traffic.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = AgentConfig::from_env().context("failed to load configuration")?;

    match args.command {
        Command::Ask {
            query,
            limit,
            no_papers,
            resource_dir,
            json,
            tools_url,
            prompts_url,
            resources_url,
            sampling_url,
        } => {
            if let Some(limit) = limit {
                config.search.default_limit = limit;
            }
            if no_papers {
                config.include_papers = false;
            }
            if let Some(dir) = resource_dir {
                config.resource_dir = dir;
            }
            let endpoints = Endpoints {
                tools: tools_url,
                prompts: prompts_url,
                resources: resources_url,
                sampling: sampling_url,
            };

            ask(&config, &endpoints, &query.join(" "), json).await
        }
        Command::Serve {
            role,
            http,
            resource_dir,
        } => {
            if let Some(dir) = resource_dir {
                config.resource_dir = dir;
            }
            serve(&config, role, http).await
        }
    }
}

async fn ask(
    config: &AgentConfig,
    endpoints: &Endpoints,
    query: &str,
    json: bool,
) -> anyhow::Result<()> {
    let backends = Backends::from_config(config)?;
    let http = config.http_client()?;
    let clients = AgentClients::connect(config, &backends, endpoints, &http);
    let agent = ResearchAgent::new(clients, AgentOptions::from_config(config));

    agent.connect().await.context("failed to connect to MCP servers")?;

    info!("Researching: {}", query);
    let report = agent.run(query).await.context("research failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary);
        eprintln!("\nSaved to {}", report.resource_uri);
    }
    Ok(())
}

async fn serve(
    config: &AgentConfig,
    role: ServerRole,
    http: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let backends = Backends::from_config(config)?;
    let server = Arc::new(role.build(&backends, config));

    info!("Research agent {} server starting", role);

    match http {
        #[cfg(feature = "http")]
        Some(addr) => mcp_research_agent::http::serve(server, addr).await?,
        #[cfg(not(feature = "http"))]
        Some(_) => anyhow::bail!("built without the `http` feature"),
        #[cfg(feature = "stdio")]
        None => server.run_stdio().await?,
        #[cfg(not(feature = "stdio"))]
        None => anyhow::bail!("built without the `stdio` feature"),
    }

    Ok(())
}
