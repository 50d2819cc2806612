//! Error types for the research agent and its servers.

use thiserror::Error;

use crate::protocol::{error_codes, McpError};

/// Result type for research-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the research agent.
#[derive(Debug, Error)]
pub enum Error {
    /// Search or completion API failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// HTTP transport failure talking to an upstream API or remote server.
    #[error("upstream error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing template, resource or capability.
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Invalid run state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// JSON-RPC error code reported for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Error::NotFound(_) => error_codes::NOT_FOUND,
            Error::Upstream(_) | Error::Http(_) => error_codes::UPSTREAM_ERROR,
            Error::Io(_) => error_codes::IO_ERROR,
            Error::Config(_) => error_codes::CONFIG_ERROR,
            Error::Serialization(_) | Error::InvalidState(_) | Error::Protocol(_) => {
                error_codes::INTERNAL_ERROR
            }
        }
    }

    /// Whether this error came from the search or completion API.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream(_) | Error::Http(_))
    }

    /// Rebuild an error from a JSON-RPC error object received from a server.
    ///
    /// The message is the server-side `Display` output, which already carries
    /// the kind prefix, so it is unwrapped here to avoid doubling it.
    pub fn from_rpc(error: &McpError) -> Self {
        let message = strip_kind_prefix(&error.message).to_string();
        match error.code {
            error_codes::INVALID_PARAMS => Error::InvalidParams(message),
            error_codes::NOT_FOUND => Error::NotFound(message),
            error_codes::UPSTREAM_ERROR => Error::Upstream(message),
            error_codes::IO_ERROR => Error::Io(std::io::Error::other(message)),
            error_codes::CONFIG_ERROR => Error::Config(message),
            _ => Error::Protocol(format!("{} (code {})", error.message, error.code)),
        }
    }
}

fn strip_kind_prefix(message: &str) -> &str {
    const PREFIXES: [&str; 5] = [
        "invalid parameters: ",
        "not found: ",
        "upstream error: ",
        "IO error: ",
        "configuration error: ",
    ];
    PREFIXES
        .iter()
        .find_map(|p| message.strip_prefix(p))
        .unwrap_or(message)
}
