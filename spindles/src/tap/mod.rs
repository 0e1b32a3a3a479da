// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Traffic taps
//
// Decode proxied requests and responses into Activities and hand them to
// the publisher. Taps never touch the bytes being forwarded.

pub mod request;
pub mod response;

pub use request::extract_tool_results;
pub use response::ResponseTap;

use std::sync::Arc;

use crate::activity::Activity;
use crate::hub::BroadcastHub;
use crate::journal::ActivitySink;

/// Where every Activity goes: live observers first, then the log.
#[derive(Clone)]
pub struct ActivityPublisher {
    hub: Arc<BroadcastHub>,
    sink: Option<Arc<dyn ActivitySink>>,
}

impl ActivityPublisher {
    pub fn new(hub: Arc<BroadcastHub>, sink: Option<Arc<dyn ActivitySink>>) -> Self {
        Self { hub, sink }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn publish(&self, activity: &Activity) {
        tracing::debug!(activity_type = activity.type_name(), "publishing activity");
        self.hub.broadcast(activity);
        if let Some(sink) = &self.sink {
            sink.write(activity);
        }
    }
}
