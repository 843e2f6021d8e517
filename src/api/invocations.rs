//! Platform-invocation endpoint.
//!
//! Accepts one JSON body and routes it to the matching OpenAI-compatible
//! path on the worker based on its shape.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::proxy;
use crate::state::AppState;

/// POST /invocations - translate a platform invocation into an upstream call.
pub async fn invocations(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| Error::InvalidRequest("invalid JSON body".to_string()))?;

    let stream = payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let path = choose_openai_path(&payload);

    proxy::proxy_request(&state, method, path, &headers, body, stream).await
}

/// Conversation-shaped bodies win; prompt-shaped is the fallback.
pub(crate) fn choose_openai_path(body: &Value) -> &'static str {
    if body.get("messages").is_some() {
        "/v1/chat/completions"
    } else {
        "/v1/completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_shaped_routes_to_chat() {
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert_eq!(choose_openai_path(&body), "/v1/chat/completions");
    }

    #[test]
    fn test_conversation_wins_over_prompt() {
        let body = json!({"messages": [], "prompt": "hi"});
        assert_eq!(choose_openai_path(&body), "/v1/chat/completions");
    }

    #[test]
    fn test_prompt_shaped_routes_to_completions() {
        let body = json!({"prompt": "once upon a time"});
        assert_eq!(choose_openai_path(&body), "/v1/completions");
    }

    #[test]
    fn test_empty_body_routes_to_completions() {
        let body = json!({});
        assert_eq!(choose_openai_path(&body), "/v1/completions");
    }
}
