// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    chat_handler, health_handler, method_not_allowed_handler, metrics_handler, preflight_handler,
};
use super::middleware::{cors_layers, request_id_layers};
use crate::config::AppConfig;
use crate::error::Result;
use crate::metrics;
use crate::upstream::CompletionClient;
use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: Arc<CompletionClient>,
    /// Cancelled when the server shuts down; every relay holds a child token.
    pub shutdown: CancellationToken,
}

pub fn create_router(
    config: AppConfig,
    client: CompletionClient,
    shutdown: CancellationToken,
) -> Result<Router> {
    metrics::init();

    let max_body_bytes = config.server.max_body_bytes;
    let state = AppState {
        config: Arc::new(config),
        client: Arc::new(client),
        shutdown,
    };

    let (set_request_id, propagate_request_id) = request_id_layers();
    let (allow_origin, allow_methods, allow_headers) = cors_layers();

    let chat = post(chat_handler)
        .options(preflight_handler)
        .fallback(method_not_allowed_handler)
        .layer::<_, Infallible>(allow_origin)
        .layer::<_, Infallible>(allow_methods)
        .layer::<_, Infallible>(allow_headers);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/chat", chat)
        // Oversized bodies surface as a JSON 400 from the chat handler
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
