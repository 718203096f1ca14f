//! Axum-based HTTP server for the chat relay.
//!
//! This module sets up the listener routes that the CRM's browser client
//! talks to and wires them to the upstream completion client.
//!
//! # Components
//!
//! - `handlers`: The chat relay endpoint plus health and metrics.
//! - `middleware`: Request ID tracking and cross-origin headers.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::{HealthCheck, HealthResponse, HealthStatus};
pub use routes::{create_router, AppState};
