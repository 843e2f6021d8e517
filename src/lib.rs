//! Supervisor and reverse proxy fronting a local llama-server instance.
//!
//! Prepares a model artifact, launches llama-server on a loopback port, and
//! forwards HTTP traffic (including server-sent-event streams) from the
//! public endpoint to it.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod proxy;
pub mod state;
pub mod supervisor;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the public HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
