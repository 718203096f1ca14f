// chat-relay - Streaming chat-completion relay for the mortgage CRM
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use chat_relay::cli::Args;
use chat_relay::config::AppConfig;
use chat_relay::server::create_router;
use chat_relay::upstream::CompletionClient;
use chat_relay::utils::logging;
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting chat-relay v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Build the runtime sized from config
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<()> {
    // Phase 4: Upstream client
    let client = CompletionClient::new(&config.upstream)?;
    if client.has_credential() {
        info!("Relaying to {} with model {}", client.endpoint(), client.model());
    } else {
        warn!("No upstream API key configured; chat requests will be rejected");
    }

    // Phase 5: Build and start HTTP server
    let shutdown = CancellationToken::new();
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(config, client, shutdown.clone())?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then cancels in-flight relays so open
/// streams do not hold the shutdown.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    shutdown.cancel();
}
