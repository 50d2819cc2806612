//! HTTP transport for MCP servers: one JSON-RPC message per `POST`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::error::Result;
use crate::server::McpServer;

/// Router answering JSON-RPC on `/` and `/mcp`.
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/", post(rpc))
        .route("/mcp", post(rpc))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(server)
}

async fn rpc(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Serve `server` on `addr` until the process exits.
pub async fn serve(server: Arc<McpServer>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        server = %server.info().name,
        addr = %listener.local_addr()?,
        "Starting MCP server on HTTP"
    );
    axum::serve(listener, router(server)).await?;
    Ok(())
}
