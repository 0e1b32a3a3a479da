// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// SSE decoding and content block reassembly
//
// Responsibilities:
// - Decode the SSE wire format incrementally, across arbitrary chunk boundaries
// - Drop keep-alives and the `[DONE]` terminator
// - Reassemble thinking/text/tool_use blocks from start/delta/stop triplets
// - Emit one Activity per completed block or in-stream error

mod assembler;
mod sse;
mod types;

pub use assembler::{BlockAssembler, SessionSource};
pub use sse::SseParser;
pub use types::{
    BlockDelta, BlockKind, ContentBlock, PendingBlock, SseEvent, StreamErrorBody, StreamEvent,
    DONE_SENTINEL,
};
