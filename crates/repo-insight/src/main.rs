mod cache;
mod chain;
mod config;
mod context;
mod error;
mod fetcher;
mod github;
mod http;
mod lance_store;
mod languages;
mod model;
mod prompt;
mod rate_limit;
mod refresh;
mod search;
mod server;
mod splitter;
mod store;
mod summary;

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use context::AppContext;
use server::RepoInsightServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr only: stdout carries MCP JSON-RPC in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting repo-insight");

    // 1. Load config from environment (and .env if present)
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        mcp_stdio = config.mcp_stdio,
        redis = config.redis_url.is_some(),
        lancedb = config.lancedb_path.is_some(),
        "configuration loaded"
    );

    // 2. Build every component and the qualifier index
    let context = Arc::new(AppContext::initialize(&config).await?);

    // 3. Serve
    if config.mcp_stdio {
        let server = RepoInsightServer::new(Arc::clone(&context));
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
    } else {
        let app = http::router(Arc::clone(&context), &config.cors_allowed_origins);
        let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
        info!(addr = %listener.local_addr()?, "HTTP server listening");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    }

    context.shutdown();
    info!("repo-insight shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
