//! Liveness endpoint.

/// GET /ping - returns success once the process accepts connections.
/// Does not consult the worker.
pub async fn ping() -> &'static str {
    "OK"
}
