//! Inbound chat request posted by the CRM assistant panel.
//!
//! The relay only checks the shape it needs to forward the request: a
//! non-empty list of role-tagged messages. Message content, tool definitions
//! and metadata values stay opaque JSON.

// Author: kelexine (https://github.com/kelexine)

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat request body accepted by `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation so far, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Tool definitions forwarded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,

    /// Tool-selection directive (`auto`, `none`, `required`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    /// Free-form metadata attached to the upstream request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    /// Either a string or structured content parts; never inspected.
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl ChatRequest {
    /// Parse and validate a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let request: ChatRequest = serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidRequest(format!("body is not a valid chat request: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(RelayError::InvalidRequest(
                "messages must be a non-empty array".to_string(),
            ));
        }
        Ok(())
    }
}
