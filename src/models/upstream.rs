//! Outbound body for the upstream Responses API.

// Author: kelexine (https://github.com/kelexine)

use super::chat::{ChatMessage, ChatRequest};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Metadata key carrying the application tag.
pub const APP_TAG_KEY: &str = "app";

/// Request body sent to `{base}/responses`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub input: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub metadata: Map<String, Value>,
    pub stream: bool,
}

impl UpstreamRequest {
    /// Build the streaming upstream body for a validated chat request.
    pub fn from_chat(request: ChatRequest, model: &str, app_tag: &str) -> Self {
        Self {
            model: model.to_string(),
            input: request.messages,
            tools: request.tools,
            tool_choice: request.tool_choice,
            metadata: merge_metadata(request.metadata, app_tag),
            stream: true,
        }
    }
}

/// Merge the application tag into caller metadata. The tag wins on collision.
pub fn merge_metadata(caller: Option<Map<String, Value>>, app_tag: &str) -> Map<String, Value> {
    let mut metadata = caller.unwrap_or_default();
    if let Some(previous) = metadata.insert(APP_TAG_KEY.to_string(), Value::String(app_tag.to_string())) {
        if previous.as_str() != Some(app_tag) {
            debug!(
                "Caller metadata key '{}' ({}) replaced by application tag",
                APP_TAG_KEY, previous
            );
        }
    }
    metadata
}
