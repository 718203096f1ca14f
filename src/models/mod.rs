//! Data models for the relay boundary.
//!
//! - The inbound chat request posted by the browser (`chat`)
//! - The outbound Responses API body (`upstream`)

// Author: kelexine (https://github.com/kelexine)

pub mod chat;
pub mod upstream;

pub use chat::{ChatMessage, ChatRequest, Role};
pub use upstream::{merge_metadata, UpstreamRequest, APP_TAG_KEY};
