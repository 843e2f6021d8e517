//! Request forwarding to the worker's loopback address.
//!
//! One request/response pair is relayed per call, either buffered or as a
//! pass-through byte stream for server-sent events.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::TryStreamExt;

use crate::error::{Error, Result};
use crate::state::AppState;

/// Overall deadline for buffered upstream calls.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Inbound headers that must not be forwarded to the worker.
const SKIP_HEADERS: &[&str] = &["host", "connection"];

/// Upstream response headers relayed back to the caller in buffered mode.
/// Everything else is dropped so transport details stay behind the proxy.
const RELAY_RESPONSE_HEADERS: [HeaderName; 2] = [
    header::CONTENT_TYPE,
    HeaderName::from_static("x-request-id"),
];

/// Copy inbound headers, dropping the hop-by-hop ones.
pub fn relay_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if SKIP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Relay one request to the worker and return its response.
///
/// In streaming mode the response status is fixed at 200 once the upstream
/// stream opens; a mid-stream upstream failure surfaces to the caller as
/// truncated output, since headers are already on the wire by then.
pub async fn proxy_request(
    state: &AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
    stream: bool,
) -> Result<Response> {
    let url = format!("{}{}", state.config.upstream_base(), path);
    let headers = relay_headers(headers);

    tracing::debug!("proxying {method} {url} (stream: {stream})");

    if stream {
        let upstream = state
            .http
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        // Chunks are forwarded as they arrive; dropping this body (caller
        // disconnect) drops the reqwest stream and releases the connection.
        let relay = upstream.bytes_stream().map_err(std::io::Error::other);

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(Body::from_stream(relay))
            .map_err(|e| Error::Internal(e.to_string()))
    } else {
        let upstream = state
            .http
            .request(method, &url)
            .headers(headers)
            .body(body)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = upstream.status();
        let mut builder = Response::builder().status(status);
        for name in &RELAY_RESPONSE_HEADERS {
            if let Some(value) = upstream.headers().get(name) {
                builder = builder.header(name.clone(), value.clone());
            }
        }

        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        builder
            .body(Body::from(bytes))
            .map_err(|e| Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_relay_headers_drops_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let relayed = relay_headers(&headers);
        assert!(relayed.get("host").is_none());
        assert!(relayed.get("connection").is_none());
        assert_eq!(
            relayed.get("authorization"),
            Some(&HeaderValue::from_static("Bearer secret"))
        );
        assert_eq!(
            relayed.get("content-type"),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[test]
    fn test_relay_headers_preserves_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("one"));
        headers.append("x-tag", HeaderValue::from_static("two"));

        let relayed = relay_headers(&headers);
        let values: Vec<_> = relayed.get_all("x-tag").iter().collect();
        assert_eq!(values.len(), 2);
    }
}
