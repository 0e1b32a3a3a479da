// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Content block assembler
//
// Rebuilds complete content blocks from start/delta/stop events keyed by
// block index, and turns each completed block (or in-stream error) into
// one Activity.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{BlockDelta, BlockKind, ContentBlock, PendingBlock, StreamEvent};
use crate::activity::{Activity, ActivityKind, Session};

// ---------------------------------------------------------------------------
// Trait: SessionSource
// ---------------------------------------------------------------------------

/// Supplies the session stamped onto each Activity at emission time.
pub trait SessionSource {
    fn current_session(&self) -> Option<Session>;
}

/// A fixed snapshot: every Activity gets the same session.
impl SessionSource for Option<Session> {
    fn current_session(&self) -> Option<Session> {
        self.clone()
    }
}

impl<T: SessionSource + ?Sized> SessionSource for Arc<T> {
    fn current_session(&self) -> Option<Session> {
        (**self).current_session()
    }
}

// ---------------------------------------------------------------------------
// BlockAssembler
// ---------------------------------------------------------------------------

/// Stateful reassembler for one streamed response.
#[derive(Debug)]
pub struct BlockAssembler<S = Option<Session>> {
    blocks: HashMap<usize, PendingBlock>,
    sessions: S,
}

impl BlockAssembler<Option<Session>> {
    /// An assembler that stamps every Activity with the same session.
    pub fn snapshot(session: Option<Session>) -> Self {
        Self::new(session)
    }
}

impl<S: SessionSource> BlockAssembler<S> {
    pub fn new(sessions: S) -> Self {
        Self {
            blocks: HashMap::new(),
            sessions,
        }
    }

    /// Consume one stream event. Returns the Activity it completes, if any.
    pub fn process(&mut self, event: StreamEvent) -> Option<Activity> {
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.start_block(index, content_block);
                None
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                self.apply_delta(index, delta);
                None
            }
            StreamEvent::ContentBlockStop { index } => self.stop_block(index),
            StreamEvent::Error { error } => Some(self.stamp(ActivityKind::Error {
                message: error.message,
                code: error.kind,
            })),
            StreamEvent::Other => None,
        }
    }

    /// Drop every pending block.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    /// Number of blocks started but not yet stopped.
    pub fn pending_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn start_block(&mut self, index: usize, block: ContentBlock) {
        let (kind, content) = match block {
            ContentBlock::Thinking { thinking } => (BlockKind::Thinking, thinking),
            ContentBlock::Text { text } => (BlockKind::Text, text),
            ContentBlock::ToolUse { id, name } => (
                BlockKind::ToolUse {
                    tool_id: id,
                    tool_name: name,
                },
                String::new(),
            ),
            ContentBlock::Unsupported => {
                self.blocks.remove(&index);
                return;
            }
        };
        self.blocks.insert(
            index,
            PendingBlock {
                index,
                kind,
                content,
            },
        );
    }

    fn apply_delta(&mut self, index: usize, delta: BlockDelta) {
        let Some(pending) = self.blocks.get_mut(&index) else {
            return;
        };
        match delta {
            BlockDelta::ThinkingDelta { thinking } => pending.content.push_str(&thinking),
            BlockDelta::TextDelta { text } => pending.content.push_str(&text),
            BlockDelta::InputJsonDelta { partial_json } => pending.content.push_str(&partial_json),
            BlockDelta::Unsupported => {}
        }
    }

    fn stop_block(&mut self, index: usize) -> Option<Activity> {
        let pending = self.blocks.remove(&index)?;
        let kind = match pending.kind {
            BlockKind::Thinking => ActivityKind::Thinking {
                content: pending.content,
            },
            BlockKind::Text => ActivityKind::Text {
                content: pending.content,
            },
            BlockKind::ToolUse { tool_id, tool_name } => {
                let input = serde_json::from_str::<serde_json::Value>(&pending.content)
                    .unwrap_or(serde_json::Value::String(pending.content));
                ActivityKind::ToolCall {
                    tool_name,
                    tool_id,
                    input,
                }
            }
        };
        Some(self.stamp(kind))
    }

    fn stamp(&self, kind: ActivityKind) -> Activity {
        Activity::now(kind, self.sessions.current_session())
    }
}
