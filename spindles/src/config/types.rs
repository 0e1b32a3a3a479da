// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use super::error::ConfigError;

pub const DEFAULT_HTTP_PORT: u16 = 8082;
pub const DEFAULT_WS_PORT: u16 = 8083;
pub const DEFAULT_WS_PATH: &str = "/spindles";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_LOG_FILE: &str = "spindles.jsonl";
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Parsed and validated runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Port for the proxy, health and session routes.
    pub http_port: u16,
    /// Port for the WebSocket observer endpoint.
    pub ws_port: u16,
    /// Path the WebSocket endpoint is served on.
    pub ws_path: String,
    /// Base URL requests are forwarded to, without trailing slash.
    pub upstream_url: String,
    /// How long the upstream may take to send response headers. A streamed
    /// body is never cut off. `None` waits indefinitely.
    pub upstream_timeout_ms: Option<u64>,
    /// JSONL activity log.
    pub log_file: PathBuf,
    /// Largest request body the proxy will buffer.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            ws_port: DEFAULT_WS_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            upstream_timeout_ms: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_port == 0 || self.ws_port == 0 {
            return Err(ConfigError::Validation(
                "http_port and ws_port must be non-zero".to_string(),
            ));
        }
        if self.http_port == self.ws_port {
            return Err(ConfigError::Validation(format!(
                "http_port and ws_port must differ (both {})",
                self.http_port
            )));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "ws_path must start with \"/\", got \"{}\"",
                self.ws_path
            )));
        }
        if !(self.upstream_url.starts_with("http://") || self.upstream_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "upstream_url must be an http(s) URL, got \"{}\"",
                self.upstream_url
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.upstream_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "upstream_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}
