// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Request tap
//
// Pulls the tool results a client sends back to the model out of a
// complete Messages API request body.

use chrono::Utc;
use serde_json::Value;

use crate::activity::{Activity, ActivityKind, Session};

/// Extract one ToolResult Activity per `tool_result` content block, in
/// message order then block order.
///
/// Bodies that are not JSON, or that carry no `messages` list, yield
/// nothing. All Activities from one body share one timestamp.
pub fn extract_tool_results(body: &[u8], session: Option<&Session>) -> Vec<Activity> {
    let Ok(body) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return Vec::new();
    };

    let timestamp = Utc::now();
    messages
        .iter()
        .filter_map(|message| message.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
        .map(|block| Activity {
            kind: ActivityKind::ToolResult {
                tool_id: block
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: block.get("content").cloned().unwrap_or(Value::Null),
                is_error: block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            timestamp,
            session: session.cloned(),
        })
        .collect()
}
