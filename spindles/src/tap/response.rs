// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Response tap
//
// One per streamed response. Decodes raw body chunks to text, runs them
// through an SseParser and a BlockAssembler, and publishes each completed
// Activity. The session is fixed when the tap is built, so a session change
// mid-stream never re-attributes this response.

use crate::activity::Session;
use crate::stream::{BlockAssembler, SseEvent, SseParser, StreamEvent};

use super::ActivityPublisher;

pub struct ResponseTap {
    parser: SseParser,
    assembler: BlockAssembler,
    publisher: ActivityPublisher,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last chunk.
    carry: Vec<u8>,
    emitted: usize,
}

impl ResponseTap {
    pub fn new(session: Option<Session>, publisher: ActivityPublisher) -> Self {
        Self {
            parser: SseParser::new(),
            assembler: BlockAssembler::snapshot(session),
            publisher,
            carry: Vec::new(),
            emitted: 0,
        }
    }

    /// Feed decoded text.
    pub fn feed(&mut self, chunk: &str) {
        for event in self.parser.feed(chunk) {
            self.handle(event);
        }
    }

    /// Feed a raw body chunk. Multi-byte characters split across chunks
    /// are held back until complete; invalid bytes become U+FFFD.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        let text = self.decode(bytes);
        if !text.is_empty() {
            self.feed(&text);
        }
    }

    /// End of stream: dispatch whatever the parser still holds.
    pub fn flush(&mut self) {
        if !self.carry.is_empty() {
            let tail = String::from_utf8_lossy(&std::mem::take(&mut self.carry)).into_owned();
            self.feed(&tail);
        }
        if let Some(event) = self.parser.flush() {
            self.handle(event);
        }
    }

    /// Forget every pending content block.
    pub fn reset(&mut self) {
        self.assembler.reset();
    }

    /// Activities published so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn handle(&mut self, event: SseEvent) {
        let Ok(event) = serde_json::from_str::<StreamEvent>(&event.data) else {
            return;
        };
        if let Some(activity) = self.assembler.process(event) {
            self.emitted += 1;
            self.publisher.publish(&activity);
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.carry);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}
