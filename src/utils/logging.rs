//! Structured logging and secret redaction.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing a helper that keeps
//! upstream credentials out of log sinks.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{RelayError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

lazy_static! {
    static ref API_KEY_PATTERN: Regex = Regex::new(r"sk-[A-Za-z0-9_\-]{8,}").unwrap();
    static ref BEARER_PATTERN: Regex = Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/\-]+=*").unwrap();
}

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    installed.map_err(|e| RelayError::Internal(format!("Failed to initialize logging: {}", e)))
}

/// Replaces OpenAI-style API keys and bearer tokens with placeholders.
pub fn sanitize(input: &str) -> String {
    let redacted = API_KEY_PATTERN.replace_all(input, "[REDACTED_API_KEY]");
    BEARER_PATTERN
        .replace_all(&redacted, "Bearer [REDACTED_TOKEN]")
        .into_owned()
}

/// Applies [`sanitize`] only when `logging.sanitize_tokens` is enabled.
pub fn redact(input: &str, sanitize_tokens: bool) -> Cow<'_, str> {
    if sanitize_tokens {
        Cow::Owned(sanitize(input))
    } else {
        Cow::Borrowed(input)
    }
}
