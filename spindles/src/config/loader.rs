// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw::RawConfig;
use super::source::ConfigSource;
use super::types::Config;

/// Environment variables that override file values.
pub const ENV_HTTP_PORT: &str = "HTTP_PORT";
pub const ENV_WS_PORT: &str = "WS_PORT";
pub const ENV_UPSTREAM_URL: &str = "ANTHROPIC_UPSTREAM_URL";
pub const ENV_LOG_FILE: &str = "LOG_FILE";

/// Values given on the command line. They win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub http_port: Option<u16>,
    pub ws_port: Option<u16>,
}

/// Load config from `source` using the process environment.
pub fn load_config(source: &dyn ConfigSource, overrides: &Overrides) -> Result<Config, ConfigError> {
    load_config_with(source, overrides, &|name| std::env::var(name).ok())
}

/// Load and validate config.
///
/// Steps:
/// 1. Read raw YAML from source (empty means all defaults)
/// 2. Parse into raw deserialization types
/// 3. Resolve `${VAR}` interpolation in string fields
/// 4. Apply environment overrides, then command-line overrides
/// 5. Validate
pub fn load_config_with(
    source: &dyn ConfigSource,
    overrides: &Overrides,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: RawConfig = if raw_yaml.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(&raw_yaml)?
    };

    let defaults = Config::default();
    let interpolate = |value: Option<String>| -> Result<Option<String>, ConfigError> {
        value.map(|v| resolve_variables(&v, lookup)).transpose()
    };

    let mut config = Config {
        http_port: raw.http_port.unwrap_or(defaults.http_port),
        ws_port: raw.ws_port.unwrap_or(defaults.ws_port),
        ws_path: interpolate(raw.ws_path)?.unwrap_or(defaults.ws_path),
        upstream_url: interpolate(raw.upstream_url)?.unwrap_or(defaults.upstream_url),
        upstream_timeout_ms: raw.upstream_timeout_ms,
        log_file: interpolate(raw.log_file)?
            .map(PathBuf::from)
            .unwrap_or(defaults.log_file),
        max_body_bytes: raw.max_body_bytes.unwrap_or(defaults.max_body_bytes),
    };

    if let Some(port) = env_port(ENV_HTTP_PORT, lookup)? {
        config.http_port = port;
    }
    if let Some(port) = env_port(ENV_WS_PORT, lookup)? {
        config.ws_port = port;
    }
    if let Some(url) = lookup(ENV_UPSTREAM_URL).filter(|v| !v.is_empty()) {
        config.upstream_url = url;
    }
    if let Some(path) = lookup(ENV_LOG_FILE).filter(|v| !v.is_empty()) {
        config.log_file = PathBuf::from(path);
    }

    if let Some(port) = overrides.http_port {
        config.http_port = port;
    }
    if let Some(port) = overrides.ws_port {
        config.ws_port = port;
    }

    config.upstream_url = config.upstream_url.trim_end_matches('/').to_string();
    config.validate()?;
    Ok(config)
}

fn env_port(
    name: &'static str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<u16>, ConfigError> {
    match lookup(name).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidPort { name, value }),
    }
}
