//! OpenAI-compatible passthrough endpoint.
//!
//! Forwards /v1 calls to the worker with just enough shape validation to
//! fail fast before a network hop. Validation is advisory; the worker is the
//! source of truth for deep request validity.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::proxy;
use crate::state::AppState;

/// GET/POST/PUT/PATCH /v1/{path} - proxy to the same path on the worker.
pub async fn passthrough(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let stream = if method == Method::GET {
        // No body to parse; the Accept header alone decides.
        wants_event_stream(&headers)
    } else {
        resolve_stream_and_validate(&path, &headers, &body)?
    };

    let upstream_path = format!("/v1/{path}");
    proxy::proxy_request(&state, method, &upstream_path, &headers, body, stream).await
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false)
}

/// Parse the body for the streaming flag and validate known endpoint shapes.
///
/// An unparseable body is not rejected outright when the client asked for an
/// event stream: streaming clients may send chunked bodies we cannot parse,
/// and those go through with validation skipped.
fn resolve_stream_and_validate(path: &str, headers: &HeaderMap, body: &[u8]) -> Result<bool> {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(_) => {
            return if wants_event_stream(headers) {
                Ok(true)
            } else {
                Err(Error::InvalidRequest("invalid JSON body".to_string()))
            };
        }
    };

    match path {
        "chat/completions" => match payload.get("messages") {
            Some(Value::Array(messages)) if !messages.is_empty() => {}
            Some(_) => {
                return Err(Error::InvalidRequest("invalid messages field".to_string()));
            }
            None => {
                return Err(Error::InvalidRequest(
                    "missing required field: messages".to_string(),
                ));
            }
        },
        "completions" => {
            if payload.get("prompt").is_none() {
                return Err(Error::InvalidRequest(
                    "missing required field: prompt".to_string(),
                ));
            }
        }
        _ => {}
    }

    Ok(payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept_event_stream() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers
    }

    #[test]
    fn test_chat_requires_messages() {
        let result = resolve_stream_and_validate("chat/completions", &HeaderMap::new(), b"{}");
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_chat_rejects_empty_messages() {
        let body = br#"{"messages": []}"#;
        let result = resolve_stream_and_validate("chat/completions", &HeaderMap::new(), body);
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_chat_rejects_non_list_messages() {
        let body = br#"{"messages": "hello"}"#;
        let result = resolve_stream_and_validate("chat/completions", &HeaderMap::new(), body);
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_chat_valid_body_reads_stream_flag() {
        let body = br#"{"messages": [{"role": "user", "content": "hi"}], "stream": true}"#;
        let stream =
            resolve_stream_and_validate("chat/completions", &HeaderMap::new(), body).unwrap();
        assert!(stream);
    }

    #[test]
    fn test_completions_requires_prompt() {
        let result = resolve_stream_and_validate("completions", &HeaderMap::new(), b"{}");
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_stream_defaults_to_false() {
        let body = br#"{"prompt": "hi"}"#;
        let stream = resolve_stream_and_validate("completions", &HeaderMap::new(), body).unwrap();
        assert!(!stream);
    }

    #[test]
    fn test_unknown_paths_skip_shape_validation() {
        let stream = resolve_stream_and_validate("embeddings", &HeaderMap::new(), b"{}").unwrap();
        assert!(!stream);
    }

    #[test]
    fn test_unparseable_body_with_event_stream_accept_streams() {
        let stream =
            resolve_stream_and_validate("chat/completions", &accept_event_stream(), b"not json")
                .unwrap();
        assert!(stream);
    }

    #[test]
    fn test_unparseable_body_without_event_stream_accept_fails() {
        let result =
            resolve_stream_and_validate("chat/completions", &HeaderMap::new(), b"not json");
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_wants_event_stream() {
        assert!(wants_event_stream(&accept_event_stream()));
        assert!(!wants_event_stream(&HeaderMap::new()));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_event_stream(&headers));
    }
}
