//! Shared application state.

use std::time::Duration;

use reqwest::Client;

use crate::config::Config;
use crate::error::{Error, Result};

/// Connect timeout for calls to the worker.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state passed to all handlers.
pub struct AppState {
    pub config: Config,
    /// Client for upstream calls. Only the connect timeout is set here; the
    /// overall deadline is applied per request so streams are not cut off.
    pub http: Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }
}
