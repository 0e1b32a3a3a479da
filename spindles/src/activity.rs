// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Activity model
//
// Structured events decoded from proxied traffic. Every Activity carries
// the capture timestamp and the session snapshot current when the
// triggering request arrived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Identifies the external worker that owns the current traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub run_name: String,
    pub instance_number: u32,
    pub total_instances: u32,
    pub project: String,
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// One completed unit of observed model activity.
///
/// Serializes as a flat JSON object:
/// `{"type": ..., <kind fields>, "timestamp": ..., "session": ...|null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(flatten)]
    pub kind: ActivityKind,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub session: Option<Session>,
}

/// Type-specific payload of an [`Activity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    /// A completed reasoning block.
    Thinking { content: String },
    /// A completed text block.
    Text { content: String },
    /// A completed tool invocation. `input` is the decoded JSON arguments,
    /// or the raw accumulated string when it does not parse.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_name: String,
        tool_id: String,
        input: Value,
    },
    /// A tool result sent back to the model in a request body.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_id: String,
        content: Value,
        is_error: bool,
    },
    /// An error event reported inside the response stream.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl Activity {
    /// Stamp `kind` with the current time.
    pub fn now(kind: ActivityKind, session: Option<Session>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            session,
        }
    }

    /// The wire name of this activity's type (e.g. `"tool_call"`).
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ActivityKind::Thinking { .. } => "thinking",
            ActivityKind::Text { .. } => "text",
            ActivityKind::ToolCall { .. } => "tool_call",
            ActivityKind::ToolResult { .. } => "tool_result",
            ActivityKind::Error { .. } => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Connection acknowledgement
// ---------------------------------------------------------------------------

/// Sent once to every newly connected observer. Not an Activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "connection_ack")]
pub struct ConnectionAck {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl ConnectionAck {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

/// RFC 3339 UTC timestamps with millisecond precision (`2026-01-02T03:04:05.678Z`).
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
