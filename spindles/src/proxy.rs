// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// HTTP proxy with activity tap
//
// Responsibilities:
// - Read the full request body, publish its tool results, forward it
// - Pass the upstream response through byte-for-byte
// - Feed streamed (SSE) responses to a ResponseTap as they flow past
// - Health endpoint and session routes

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures_util::StreamExt;
use serde_json::json;
use uuid::Uuid;

use crate::session::{session_router, SessionStore};
use crate::tap::{extract_tool_results, ActivityPublisher, ResponseTap};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data forwarded to the upstream client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response received from upstream.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Errors that can occur during one proxy cycle.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("request body of {0} bytes exceeds the configured limit")]
    BodyTooLarge(usize),

    #[error("failed to read request body: {0}")]
    BodyRead(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ProxyError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
        };
        let body = json!({
            "error": "Proxy error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the HTTP client that forwards requests upstream.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Header handling
// ---------------------------------------------------------------------------

/// Remove request headers that describe the inbound hop, not the request.
pub fn strip_request_headers(headers: &mut HeaderMap) {
    headers.remove(header::HOST);
    headers.remove(header::CONNECTION);
    headers.remove(header::CONTENT_LENGTH);
}

/// Remove response framing headers; the server frames the body itself.
pub fn strip_response_headers(headers: &mut HeaderMap) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);
    headers.remove(header::CONTENT_LENGTH);
}

pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

/// True when the body carries a content coding the tap cannot read.
fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub sessions: Arc<SessionStore>,
    pub publisher: ActivityPublisher,
    pub max_body_bytes: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "wsClients": state.publisher.hub().client_count(),
    }))
}

/// Proxy handler for `/v1/*`.
///
/// Publishes request-side tool results before forwarding, so they always
/// precede the response-side Activities of the same turn.
pub async fn proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let mut headers = parts.headers;

    tracing::info!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "proxy request"
    );

    if let Some(len) = declared_length(&headers) {
        if len > state.max_body_bytes {
            return ProxyError::BodyTooLarge(len).into_response();
        }
    }
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return ProxyError::BodyRead(e.to_string()).into_response(),
    };
    strip_request_headers(&mut headers);

    let session = state.sessions.snapshot();
    let tool_results = extract_tool_results(&body, session.as_ref());
    if !tool_results.is_empty() {
        tracing::debug!(request_id = %request_id, count = tool_results.len(), "tool results in request");
    }
    for activity in &tool_results {
        state.publisher.publish(activity);
    }

    let forwarded = ProxyRequest {
        method: parts.method,
        uri: parts.uri,
        headers,
        body,
    };
    let upstream = match state.upstream.forward(forwarded).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "upstream request failed"
            );
            return e.into_response();
        }
    };

    let ProxyResponse {
        status,
        mut headers,
        body,
    } = upstream;

    let tap = if !is_event_stream(&headers) {
        None
    } else if is_encoded(&headers) {
        tracing::warn!(request_id = %request_id, "encoded event stream, passing through untapped");
        None
    } else {
        Some(ResponseTap::new(session, state.publisher.clone()))
    };
    strip_response_headers(&mut headers);

    tracing::info!(
        request_id = %request_id,
        status = status.as_u16(),
        tapped = tap.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "upstream responded"
    );

    let body = match tap {
        Some(tap) => tapped_body(body, tap, request_id),
        None => body,
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Pass `body` through unchanged while feeding every chunk to `tap`.
///
/// The next upstream chunk is only pulled when the caller side polls, so
/// caller backpressure reaches upstream. An upstream error ends the tap
/// without flushing; a caller disconnect drops it the same way.
fn tapped_body(body: Body, tap: ResponseTap, request_id: String) -> Body {
    let state = (body.into_data_stream(), Some(tap), request_id);
    let stream = futures_util::stream::unfold(state, |(mut input, mut tap, request_id)| async move {
        match input.next().await {
            Some(Ok(chunk)) => {
                if let Some(tap) = tap.as_mut() {
                    tap.feed_bytes(&chunk);
                }
                Some((Ok(chunk), (input, tap, request_id)))
            }
            Some(Err(e)) => {
                tracing::warn!(request_id = %request_id, error = %e, "upstream stream failed");
                Some((Err(e), (input, None, request_id)))
            }
            None => {
                if let Some(mut tap) = tap.take() {
                    tap.flush();
                    tracing::info!(
                        request_id = %request_id,
                        activities = tap.emitted(),
                        "stream complete"
                    );
                }
                None
            }
        }
    });
    Body::from_stream(stream)
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the proxy-port router: health, session routes and `/v1/*`.
///
/// The upstream client is injected through `state`; no hard-coded clients.
pub fn build_router(state: AppState) -> Router {
    let sessions = state.sessions.clone();
    Router::new()
        .route("/health", get(health))
        .route("/v1/*path", any(proxy_handler))
        .with_state(state)
        .merge(session_router(sessions))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
