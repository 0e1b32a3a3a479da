// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Every field is optional; defaults, interpolation and overrides are
// applied by the loader before validation.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub http_port: Option<u16>,
    pub ws_port: Option<u16>,
    pub ws_path: Option<String>,
    pub upstream_url: Option<String>,
    pub upstream_timeout_ms: Option<u64>,
    pub log_file: Option<String>,
    pub max_body_bytes: Option<usize>,
}
