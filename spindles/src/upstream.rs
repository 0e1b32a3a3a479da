// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Reqwest-backed upstream client

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Method;

use crate::proxy::{ProxyError, ProxyRequest, ProxyResponse, UpstreamClient};

/// Forwards requests to `{base_url}{path_and_query}` and streams the
/// response body back without buffering. `timeout_ms` limits how long the
/// upstream may take to send response headers.
pub struct ReqwestUpstream {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: Option<u64>,
}

impl ReqwestUpstream {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout_ms: Option<u64>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout_ms,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn target_url(&self, request: &ProxyRequest) -> String {
        let path = request
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let url = self.target_url(&request);
        let sends_body = request.method != Method::GET && request.method != Method::HEAD;

        let mut req = self
            .client
            .request(request.method, &url)
            .headers(request.headers);
        if sends_body {
            req = req.body(request.body);
        }
        // Bounds the wait for response headers, never the streamed body.
        let pending = req.send();
        let sent = match self.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), pending)
                .await
                .map_err(|_| {
                    ProxyError::UpstreamTimeout(format!(
                        "no response from upstream within {timeout_ms} ms"
                    ))
                })?,
            None => pending.await,
        };
        let resp = sent.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout(e.to_string())
            } else {
                ProxyError::UpstreamFailure(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        Ok(ProxyResponse {
            status,
            headers,
            body: Body::from_stream(resp.bytes_stream()),
        })
    }
}
