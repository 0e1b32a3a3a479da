// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// WebSocket observer endpoint
//
// Every accepted socket becomes one BroadcastHub observer. The hub only
// ever queues onto an unbounded channel; a per-socket writer task drains
// it and keeps the queued byte count current. Inbound frames other than
// close are ignored.
//
// A close request interrupts a write in progress. If the peer has not
// taken the close frame within CLOSE_GRACE the connection is dropped.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::hub::{BroadcastHub, Observer};

/// How long a closing socket may take to accept its close frame.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

type CloseRequest = Option<(u16, &'static str)>;

// ---------------------------------------------------------------------------
// SocketObserver
// ---------------------------------------------------------------------------

/// Hub-facing half of one WebSocket connection.
pub struct SocketObserver {
    tx: mpsc::UnboundedSender<Arc<str>>,
    close_tx: watch::Sender<CloseRequest>,
    buffered: Arc<AtomicUsize>,
    open: AtomicBool,
}

/// Writer-facing half: what the socket task drains.
struct Outbound {
    rx: mpsc::UnboundedReceiver<Arc<str>>,
    close_rx: watch::Receiver<CloseRequest>,
    buffered: Arc<AtomicUsize>,
}

impl SocketObserver {
    fn pair() -> (Self, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(None);
        let buffered = Arc::new(AtomicUsize::new(0));
        let observer = Self {
            tx,
            close_tx,
            buffered: buffered.clone(),
            open: AtomicBool::new(true),
        };
        let outbound = Outbound {
            rx,
            close_rx,
            buffered,
        };
        (observer, outbound)
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Observer for SocketObserver {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    fn send(&self, message: Arc<str>) {
        if !self.is_open() {
            return;
        }
        let len = message.len();
        self.buffered.fetch_add(len, Ordering::AcqRel);
        if self.tx.send(message).is_err() {
            self.buffered.fetch_sub(len, Ordering::AcqRel);
        }
    }

    fn close(&self, code: u16, reason: &'static str) {
        self.mark_closed();
        self.close_tx.send_replace(Some((code, reason)));
    }
}

// ---------------------------------------------------------------------------
// Socket tasks
// ---------------------------------------------------------------------------

/// Drain queued messages onto the socket. A close request jumps the queue
/// and also cancels a send the peer is not reading.
async fn write_loop<S>(mut sink: S, mut outbound: Outbound, grace: Duration)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let request = loop {
        tokio::select! {
            biased;

            changed = outbound.close_rx.changed() => {
                break changed.ok().and(*outbound.close_rx.borrow());
            }

            message = outbound.rx.recv() => {
                let Some(message) = message else { return };
                let len = message.len();
                let sent = tokio::select! {
                    biased;

                    changed = outbound.close_rx.changed() => {
                        Err(changed.ok().and(*outbound.close_rx.borrow()))
                    }
                    result = sink.send(Message::Text(message.to_string())) => Ok(result),
                };
                outbound.buffered.fetch_sub(len, Ordering::AcqRel);
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "observer write failed");
                        return;
                    }
                    Err(request) => break request,
                }
            }
        }
    };

    let Some((code, reason)) = request else { return };
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    match tokio::time::timeout(grace, sink.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "observer close failed"),
        Err(_) => tracing::debug!(code, "observer not reading, dropping connection"),
    }
}

async fn serve_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (sink, mut inbound) = socket.split();
    let (observer, outbound) = SocketObserver::pair();
    let observer = Arc::new(observer);
    let mut writer = tokio::spawn(write_loop(sink, outbound, CLOSE_GRACE));

    let Some(subscription) = hub.add(observer.clone()) else {
        // Hub already closed; the writer sends the close frame and exits.
        let _ = writer.await;
        return;
    };

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    observer.mark_closed();
    drop(subscription);
    writer.abort();
}

// ---------------------------------------------------------------------------
// Handler / router
// ---------------------------------------------------------------------------

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<BroadcastHub>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

/// Router serving the observer endpoint at `path`.
pub fn ws_router(hub: Arc<BroadcastHub>, path: &str) -> Router {
    Router::new().route(path, get(ws_handler)).with_state(hub)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
