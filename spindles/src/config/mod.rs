// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads spindles.yaml (optional), resolves `${VAR}` interpolation, applies
// environment and command-line overrides, and validates the result.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{
    load_config, load_config_with, Overrides, ENV_HTTP_PORT, ENV_LOG_FILE, ENV_UPSTREAM_URL,
    ENV_WS_PORT,
};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    const EXAMPLE_YAML: &str = r#"
http_port: 9000
ws_port: 9001
ws_path: /feed
upstream_url: "${UPSTREAM_HOST}/"
upstream_timeout_ms: 600000
log_file: "${LOG_DIR}/activity.jsonl"
max_body_bytes: 1048576
"#;

    fn make_source(yaml: &str) -> StringSource {
        StringSource {
            content: yaml.to_string(),
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn load(yaml: &str, vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        load_config_with(&make_source(yaml), &Overrides::default(), &env(vars))
    }

    // ---------------------------------------------------------------
    // 1. Defaults
    // ---------------------------------------------------------------

    #[test]
    fn empty_source_yields_defaults() {
        let config = load("", &[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.http_port, 8082);
        assert_eq!(config.ws_port, 8083);
        assert_eq!(config.ws_path, "/spindles");
        assert_eq!(config.upstream_url, "https://api.anthropic.com");
        assert_eq!(config.log_file, PathBuf::from("spindles.jsonl"));
        assert_eq!(config.upstream_timeout_ms, None);
        assert_eq!(config.max_body_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = load("ws_port: 7000\n", &[]).unwrap();
        assert_eq!(config.ws_port, 7000);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
    }

    // ---------------------------------------------------------------
    // 2. YAML values and interpolation
    // ---------------------------------------------------------------

    #[test]
    fn full_yaml_with_interpolation() {
        let config = load(
            EXAMPLE_YAML,
            &[("UPSTREAM_HOST", "http://localhost:4000"), ("LOG_DIR", "/var/log")],
        )
        .unwrap();

        assert_eq!(config.http_port, 9000);
        assert_eq!(config.ws_port, 9001);
        assert_eq!(config.ws_path, "/feed");
        assert_eq!(config.upstream_url, "http://localhost:4000");
        assert_eq!(config.upstream_timeout_ms, Some(600_000));
        assert_eq!(config.log_file, PathBuf::from("/var/log/activity.jsonl"));
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let err = load(EXAMPLE_YAML, &[("LOG_DIR", "/tmp")]).unwrap_err();
        assert!(
            matches!(&err, ConfigError::UndefinedVariable { name } if name == "UPSTREAM_HOST"),
            "got {err}"
        );
    }

    #[test]
    fn malformed_interpolation_kept_literally() {
        let lookup = env(&[]);
        assert_eq!(resolve_variables("a${b", &lookup).unwrap(), "a${b");
        assert_eq!(resolve_variables("${}", &lookup).unwrap(), "${}");
        assert_eq!(resolve_variables("$HOME", &lookup).unwrap(), "$HOME");
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let err = load("http_port: [not a port\n", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)), "got {err}");
    }

    // ---------------------------------------------------------------
    // 3. Environment and command-line overrides
    // ---------------------------------------------------------------

    #[test]
    fn environment_overrides_file() {
        let config = load(
            "http_port: 9000\nupstream_url: https://file.example\n",
            &[
                (ENV_HTTP_PORT, "9100"),
                (ENV_WS_PORT, "9101"),
                (ENV_UPSTREAM_URL, "http://env.example"),
                (ENV_LOG_FILE, "env.jsonl"),
            ],
        )
        .unwrap();

        assert_eq!(config.http_port, 9100);
        assert_eq!(config.ws_port, 9101);
        assert_eq!(config.upstream_url, "http://env.example");
        assert_eq!(config.log_file, PathBuf::from("env.jsonl"));
    }

    #[test]
    fn bad_env_port_is_an_error() {
        let err = load("", &[(ENV_WS_PORT, "eighty")]).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidPort { name, .. } if *name == ENV_WS_PORT),
            "got {err}"
        );
    }

    #[test]
    fn command_line_wins_over_environment() {
        let overrides = Overrides {
            http_port: Some(1234),
            ws_port: None,
        };
        let config = load_config_with(
            &make_source("http_port: 9000\n"),
            &overrides,
            &env(&[(ENV_HTTP_PORT, "9100")]),
        )
        .unwrap();
        assert_eq!(config.http_port, 1234);
        assert_eq!(config.ws_port, DEFAULT_WS_PORT);
    }

    // ---------------------------------------------------------------
    // 4. Validation
    // ---------------------------------------------------------------

    #[test]
    fn same_ports_rejected() {
        let err = load("http_port: 9000\nws_port: 9000\n", &[]).unwrap_err();
        assert!(err.to_string().contains("must differ"), "got {err}");
    }

    #[test]
    fn zero_port_rejected() {
        let err = load("http_port: 0\n", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn ws_path_must_be_absolute() {
        let err = load("ws_path: spindles\n", &[]).unwrap_err();
        assert!(err.to_string().contains("ws_path"), "got {err}");
    }

    #[test]
    fn upstream_url_must_be_http() {
        let err = load("upstream_url: ftp://example.com\n", &[]).unwrap_err();
        assert!(err.to_string().contains("upstream_url"), "got {err}");
    }

    #[test]
    fn zero_body_limit_rejected() {
        let err = load("max_body_bytes: 0\n", &[]).unwrap_err();
        assert!(err.to_string().contains("max_body_bytes"), "got {err}");
    }

    #[test]
    fn file_source_missing_file_is_io_error() {
        let source = FileSource {
            path: PathBuf::from("/definitely/not/here/spindles.yaml"),
        };
        let err = load_config_with(&source, &Overrides::default(), &env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
