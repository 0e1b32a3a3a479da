// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Decoded SSE frames, the Anthropic stream events the assembler consumes,
// and the per-index accumulator for in-flight content blocks.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// SSE frame
// ---------------------------------------------------------------------------

/// The payload that terminates an OpenAI-style stream. Never dispatched.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One fully decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if the frame carried one (last write wins).
    pub event: Option<String>,
    /// All `data:` lines of the frame joined with `\n`.
    pub data: String,
}

// ---------------------------------------------------------------------------
// Anthropic stream events
// ---------------------------------------------------------------------------

/// A stream event decoded from an SSE `data` payload.
///
/// Only the content-block triplet and in-stream errors matter to the
/// assembler; everything else (`message_start`, `ping`, ...) maps to
/// `Other` so that new upstream event kinds stay harmless.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Other,
}

/// The `content_block` of a `content_block_start` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
    #[serde(other)]
    Unsupported,
}

/// The `delta` of a `content_block_delta` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    TextDelta {
        #[serde(default)]
        text: String,
    },
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    #[serde(other)]
    Unsupported,
}

/// The `error` object of an in-stream `error` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamErrorBody {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Pending block
// ---------------------------------------------------------------------------

/// What kind of content a pending block accumulates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Thinking,
    Text,
    ToolUse { tool_id: String, tool_name: String },
}

/// Accumulator for one content block between its start and stop events.
///
/// For tool-use blocks `content` holds raw partial-JSON fragments; they are
/// only decoded once the block stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlock {
    pub index: usize,
    pub kind: BlockKind,
    pub content: String,
}
