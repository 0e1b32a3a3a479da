// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Incremental SSE decoder
//
// Accepts arbitrary slices of the wire stream and yields complete events.
// Lines are delimited by `\n` with an optional trailing `\r`; a blank
// line dispatches the event collected so far.

use super::types::{SseEvent, DONE_SENTINEL};

/// Decodes the SSE wire format across arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Text after the last `\n` seen so far.
    buffer: String,
    /// `event:` field of the in-progress event.
    event: Option<String>,
    /// `data:` values of the in-progress event, in order.
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next slice of the stream, returning every event it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut pending = std::mem::take(&mut self.buffer);
        pending.push_str(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = pending[start..].find('\n') {
            let end = start + offset;
            let line = &pending[start..end];
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
            start = end + 1;
        }

        pending.drain(..start);
        self.buffer = pending;
        events
    }

    /// Force out whatever remains at end of stream: an unterminated last
    /// line is treated as complete, then the pending event is dispatched.
    pub fn flush(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let from_line = if rest.is_empty() {
            None
        } else {
            let line = rest.strip_suffix('\r').unwrap_or(&rest);
            self.process_line(line)
        };
        from_line.or_else(|| self.dispatch())
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        if data == DONE_SENTINEL {
            return None;
        }
        Some(SseEvent { event, data })
    }
}
