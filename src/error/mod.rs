// Error types for chat-relay
// Author: kelexine (https://github.com/kelexine)

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Upstream API key is not configured")]
    MissingCredential,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream request failed: {0}")]
    UpstreamTransport(String),

    #[error("Upstream did not respond within {0} seconds")]
    UpstreamTimeout(u64),

    #[error("Upstream returned HTTP {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("Upstream returned an empty response body")]
    EmptyUpstreamBody,

    #[error("Request cancelled by client")]
    Cancelled,

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// HTTP status reported to the browser for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the `outcome` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::MethodNotAllowed => "method_not_allowed",
            RelayError::MissingCredential => "missing_credential",
            RelayError::Config(_) | RelayError::ConfigParsing(_) => "configuration_error",
            RelayError::UpstreamTransport(_) => "upstream_transport",
            RelayError::UpstreamTimeout(_) => "upstream_timeout",
            RelayError::UpstreamStatus { .. } => "upstream_status",
            RelayError::EmptyUpstreamBody => "empty_upstream_body",
            RelayError::Cancelled => "cancelled",
            _ => "internal_error",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::UpstreamTransport(err.to_string())
    }
}

// Every failure leaves the relay as `{"error": "..."}`
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "error": self.to_string() });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("POST, OPTIONS"));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
