//! Public HTTP surface.

pub mod health;
pub mod invocations;
pub mod passthrough;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the gateway router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/invocations", post(invocations::invocations))
        .route(
            "/v1/*path",
            get(passthrough::passthrough)
                .post(passthrough::passthrough)
                .put(passthrough::passthrough)
                .patch(passthrough::passthrough),
        )
}
