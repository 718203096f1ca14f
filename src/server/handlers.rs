// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::{RelayError, Result};
use crate::metrics;
use crate::models::ChatRequest;
use crate::upstream::open_stream;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    let credential_check = if state.client.has_credential() {
        HealthCheck {
            status: "ok".to_string(),
            message: "Upstream API key configured".to_string(),
        }
    } else {
        overall_status = HealthStatus::Degraded;
        HealthCheck {
            status: "error".to_string(),
            message: "Upstream API key missing; chat requests will fail".to_string(),
        }
    };
    checks.insert("upstream_credential".to_string(), credential_check);

    checks.insert(
        "upstream".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("{} (model {})", state.client.endpoint(), state.client.model()),
        },
    );

    checks.insert(
        "configuration".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "Listening on {}:{}, app tag '{}'",
                state.config.server.host, state.config.server.port, state.config.upstream.app_tag
            ),
        },
    );

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> Result<Response> {
    let body = metrics::gather_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Handler for `POST /api/chat`.
///
/// Relays the upstream event stream or answers with a JSON error, never both.
pub async fn chat_handler(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let span = tracing::info_span!("chat", request_id = %request_id);

    let result = relay_chat(state, body).instrument(span.clone()).await;
    span.in_scope(|| match &result {
        Ok(_) => metrics::record_outcome("streamed"),
        Err(e) => {
            metrics::record_outcome(e.kind());
            warn!("Chat relay failed: {}", e);
        }
    });
    result
}

async fn relay_chat(
    state: AppState,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let body = body.map_err(|e| RelayError::InvalidRequest(e.body_text()))?;
    let request = ChatRequest::parse(&body)?;

    info!(
        "Received chat request: messages={}, tools={}, tool_choice={:?}",
        request.messages.len(),
        request.tools.as_ref().map_or(0, Vec::len),
        request.tool_choice
    );

    // Cancelled on server shutdown, or by the relay stream when the client drops the body
    let cancel = state.shutdown.child_token();

    let started = Instant::now();
    let response = match state.client.send(request, &cancel).await {
        Ok(response) => {
            metrics::record_upstream_call(Some(response.status().as_u16()));
            response
        }
        Err(e) => {
            if !matches!(e, RelayError::MissingCredential) {
                metrics::record_upstream_call(None);
            }
            return Err(e);
        }
    };
    debug!("Upstream responded with HTTP {} after {:?}", response.status(), started.elapsed());

    let stream = open_stream(
        response,
        cancel,
        started,
        state.config.logging.sanitize_tokens,
    )
    .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| RelayError::Internal(format!("Failed to build stream response: {}", e)))
}

/// Cross-origin pre-flight; CORS headers are added by the router layers.
pub async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed_handler() -> RelayError {
    RelayError::MethodNotAllowed
}
