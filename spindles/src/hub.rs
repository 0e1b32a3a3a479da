// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Broadcast hub
//
// Fans each Activity out to every connected observer. A message is
// serialized once per broadcast; observers whose outbound queue has grown
// past MAX_BUFFERED_BYTES are closed and dropped instead of being waited on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

use crate::activity::ConnectionAck;

/// Unsent outbound bytes above which an observer is evicted.
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// WebSocket close code sent to evicted slow observers.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const BACKPRESSURE_REASON: &str = "Backpressure limit exceeded";

/// WebSocket close code sent to every observer on shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const SHUTDOWN_REASON: &str = "Server shutting down";

// ---------------------------------------------------------------------------
// Trait: Observer
// ---------------------------------------------------------------------------

/// One connected consumer of the activity feed.
///
/// `send` and `close` must not block: implementations queue the message
/// and report the queued size through `buffered_amount`.
pub trait Observer: Send + Sync {
    fn is_open(&self) -> bool;

    /// Bytes queued for this observer but not yet written out.
    fn buffered_amount(&self) -> usize;

    fn send(&self, message: Arc<str>);

    fn close(&self, code: u16, reason: &'static str);
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct BroadcastHub {
    observers: Mutex<HashMap<u64, Arc<dyn Observer>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `observer` and send it a ConnectionAck.
    ///
    /// Returns a guard that deregisters the observer when dropped, or
    /// `None` if the hub is already closed (the observer is closed too).
    pub fn add(self: &Arc<Self>, observer: Arc<dyn Observer>) -> Option<Subscription> {
        let ack = match serde_json::to_string(&ConnectionAck::now()) {
            Ok(ack) => Some(Arc::<str>::from(ack)),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize connection ack");
                None
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut observers = self.lock();
            if self.closed.load(Ordering::Acquire) {
                drop(observers);
                observer.close(CLOSE_GOING_AWAY, SHUTDOWN_REASON);
                return None;
            }
            // Queued under the lock so no broadcast can overtake the ack.
            if let Some(ack) = ack {
                observer.send(ack);
            }
            observers.insert(id, observer);
            observers.len()
        };
        tracing::info!(observer_id = id, clients = count, "observer connected");

        Some(Subscription {
            id,
            hub: Arc::downgrade(self),
        })
    }

    /// Deregister an observer. Unknown ids are ignored.
    pub fn remove(&self, id: u64) -> bool {
        let (removed, count) = {
            let mut observers = self.lock();
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            tracing::info!(observer_id = id, clients = count, "observer disconnected");
        }
        removed
    }

    /// Serialize `message` once and queue it on every open observer.
    ///
    /// Returns the number of observers the message was queued on.
    pub fn broadcast<T: Serialize + ?Sized>(&self, message: &T) -> usize {
        let payload: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize broadcast message");
                return 0;
            }
        };

        let targets: Vec<(u64, Arc<dyn Observer>)> = self
            .lock()
            .iter()
            .map(|(id, observer)| (*id, observer.clone()))
            .collect();

        let mut delivered = 0;
        for (id, observer) in targets {
            if !observer.is_open() {
                continue;
            }
            let buffered = observer.buffered_amount();
            if buffered > MAX_BUFFERED_BYTES {
                tracing::warn!(
                    observer_id = id,
                    buffered_bytes = buffered,
                    "evicting slow observer"
                );
                observer.close(CLOSE_POLICY_VIOLATION, BACKPRESSURE_REASON);
                self.remove(id);
                continue;
            }
            observer.send(payload.clone());
            delivered += 1;
        }
        delivered
    }

    /// Number of registered observers.
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close and deregister every observer. Later `add` calls are refused.
    pub fn close(&self) {
        let drained: Vec<Arc<dyn Observer>> = {
            let mut observers = self.lock();
            self.closed.store(true, Ordering::Release);
            observers.drain().map(|(_, observer)| observer).collect()
        };
        let count = drained.len();
        for observer in drained {
            observer.close(CLOSE_GOING_AWAY, SHUTDOWN_REASON);
        }
        tracing::info!(closed = count, "broadcast hub closed");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<dyn Observer>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Keeps an observer registered for as long as it is alive.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// In-memory observer that records everything it is sent.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub closed: AtomicBool,
        pub buffered: AtomicUsize,
        pub messages: Mutex<Vec<String>>,
        pub close_frame: Mutex<Option<(u16, &'static str)>>,
    }

    impl RecordingObserver {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }

        /// Received messages as JSON, ConnectionAck excluded.
        pub fn activities(&self) -> Vec<serde_json::Value> {
            self.messages()
                .iter()
                .map(|m| serde_json::from_str::<serde_json::Value>(m).unwrap())
                .filter(|v| v["type"] != "connection_ack")
                .collect()
        }
    }

    impl Observer for RecordingObserver {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn buffered_amount(&self) -> usize {
            self.buffered.load(Ordering::SeqCst)
        }

        fn send(&self, message: Arc<str>) {
            self.messages.lock().unwrap().push(message.to_string());
        }

        fn close(&self, code: u16, reason: &'static str) {
            self.closed.store(true, Ordering::SeqCst);
            *self.close_frame.lock().unwrap() = Some((code, reason));
        }
    }

    #[test]
    fn add_sends_connection_ack() {
        let hub = BroadcastHub::new();
        let observer = RecordingObserver::new();
        let _sub = hub.add(observer.clone()).unwrap();

        let messages = observer.messages();
        assert_eq!(messages.len(), 1);
        let ack: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(ack["type"], "connection_ack");
        assert!(ack["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn dropping_subscription_deregisters() {
        let hub = BroadcastHub::new();
        let sub = hub.add(RecordingObserver::new()).unwrap();
        assert_eq!(hub.client_count(), 1);
        drop(sub);
        assert_eq!(hub.client_count(), 0);
    }

    #[test]
    fn broadcast_reaches_every_open_observer() {
        let hub = BroadcastHub::new();
        let a = RecordingObserver::new();
        let b = RecordingObserver::new();
        let _sa = hub.add(a.clone()).unwrap();
        let _sb = hub.add(b.clone()).unwrap();

        let delivered = hub.broadcast(&serde_json::json!({"type": "text", "content": "hi"}));

        assert_eq!(delivered, 2);
        assert_eq!(a.activities(), vec![serde_json::json!({"type": "text", "content": "hi"})]);
        assert_eq!(b.activities().len(), 1);
    }

    #[test]
    fn closed_observer_is_skipped_but_stays_registered() {
        let hub = BroadcastHub::new();
        let observer = RecordingObserver::new();
        let _sub = hub.add(observer.clone()).unwrap();
        observer.closed.store(true, Ordering::SeqCst);

        assert_eq!(hub.broadcast("x"), 0);
        assert!(observer.activities().is_empty());
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn slow_observer_evicted_others_still_served() {
        let hub = BroadcastHub::new();
        let observers: Vec<_> = (0..10).map(|_| RecordingObserver::new()).collect();
        let _subs: Vec<_> = observers
            .iter()
            .map(|o| hub.add(o.clone()).unwrap())
            .collect();
        observers[3]
            .buffered
            .store(MAX_BUFFERED_BYTES + 1, Ordering::SeqCst);
        assert_eq!(hub.client_count(), 10);

        let delivered = hub.broadcast(&serde_json::json!({"type": "text"}));

        assert_eq!(delivered, 9);
        assert_eq!(hub.client_count(), 9);
        for (i, observer) in observers.iter().enumerate() {
            if i == 3 {
                assert!(observer.activities().is_empty());
                assert_eq!(
                    *observer.close_frame.lock().unwrap(),
                    Some((CLOSE_POLICY_VIOLATION, BACKPRESSURE_REASON))
                );
            } else {
                assert_eq!(observer.activities().len(), 1, "observer {i}");
            }
        }
    }

    #[test]
    fn exactly_at_threshold_is_not_evicted() {
        let hub = BroadcastHub::new();
        let observer = RecordingObserver::new();
        let _sub = hub.add(observer.clone()).unwrap();
        observer.buffered.store(MAX_BUFFERED_BYTES, Ordering::SeqCst);

        assert_eq!(hub.broadcast("x"), 1);
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn close_shuts_down_all_and_refuses_new() {
        let hub = BroadcastHub::new();
        let a = RecordingObserver::new();
        let b = RecordingObserver::new();
        let _sa = hub.add(a.clone()).unwrap();
        let _sb = hub.add(b.clone()).unwrap();

        hub.close();

        assert_eq!(hub.client_count(), 0);
        assert!(hub.is_closed());
        for o in [&a, &b] {
            assert_eq!(
                *o.close_frame.lock().unwrap(),
                Some((CLOSE_GOING_AWAY, SHUTDOWN_REASON))
            );
        }

        let late = RecordingObserver::new();
        assert!(hub.add(late.clone()).is_none());
        assert!(!late.is_open());
        assert!(late.messages().is_empty());
    }

    #[test]
    fn subscription_outliving_hub_is_harmless() {
        let hub = BroadcastHub::new();
        let sub = hub.add(RecordingObserver::new()).unwrap();
        drop(hub);
        drop(sub);
    }
}
