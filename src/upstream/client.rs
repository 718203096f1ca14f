// Upstream completion client
// Author: kelexine (https://github.com/kelexine)

use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};
use crate::models::{ChatRequest, UpstreamRequest};
use reqwest::{header, Client, Response};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Client for the upstream Responses API.
///
/// Issues exactly one streaming request per call and hands back the raw
/// response. Status handling and body relaying belong to the caller; this
/// type performs no parsing, retry or backoff.
pub struct CompletionClient {
    http_client: Client,
    config: UpstreamConfig,
}

impl CompletionClient {
    /// Build the client with a pooled, keep-alive HTTP connection.
    ///
    /// No overall request timeout is set because completions stream for as
    /// long as the model generates; only connect and header timeouts apply.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            // A redirect would be a second outbound request
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Created upstream HTTP client for {}", config.responses_url());

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn endpoint(&self) -> String {
        self.config.responses_url()
    }

    pub fn has_credential(&self) -> bool {
        self.config.credential().is_some()
    }

    /// Send the chat request upstream with `stream: true`.
    ///
    /// Returns the response as received, whatever its status. Fails before
    /// any network activity when no credential is configured, and gives up
    /// early if `cancel` fires or headers do not arrive within the response
    /// timeout.
    pub async fn send(&self, request: ChatRequest, cancel: &CancellationToken) -> Result<Response> {
        let api_key = self.config.credential().ok_or(RelayError::MissingCredential)?;
        let url = self.config.responses_url();
        let body = UpstreamRequest::from_chat(request, &self.config.model, &self.config.app_tag);

        debug!(
            "Calling {} with model={} messages={}",
            url,
            body.model,
            body.input.len()
        );

        let pending = self
            .http_client
            .post(&url)
            .bearer_auth(api_key.expose())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .send();

        let timeout = self.config.response_timeout_seconds;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            sent = tokio::time::timeout(Duration::from_secs(timeout), pending) => match sent {
                Ok(response) => Ok(response?),
                Err(_) => Err(RelayError::UpstreamTimeout(timeout)),
            },
        }
    }
}
