// Upstream completion API module
// Author: kelexine (https://github.com/kelexine)

mod client;
pub mod streaming;

pub use client::CompletionClient;
pub use streaming::{open_stream, RelayStream};
