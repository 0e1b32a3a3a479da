// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Append-only JSONL activity log
//
// `write` only serializes and queues; a background task owns the file and
// appends one line per Activity in queue order. Lines queued before the
// file is open are written once it opens. I/O failures are logged and
// never reach the caller.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::activity::Activity;

/// Errors raised inside the journal task.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to append to activity log: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to serialize activity: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Trait: ActivitySink
// ---------------------------------------------------------------------------

/// Durable destination for Activities. `write` must not block.
pub trait ActivitySink: Send + Sync {
    fn write(&self, activity: &Activity);
}

// ---------------------------------------------------------------------------
// JsonlWriter
// ---------------------------------------------------------------------------

pub struct JsonlWriter {
    path: PathBuf,
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JsonlWriter {
    /// Start the writer task for `path`. Must be called inside a Tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(path.clone(), rx));
        Self {
            path,
            tx: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting lines and wait until everything queued is on disk.
    /// Later writes are dropped with a warning.
    pub async fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "activity log task failed");
            }
        }
    }

    fn try_write(&self, activity: &Activity) -> Result<(), JournalError> {
        let line = serde_json::to_string(activity)?;
        let sent = match self.tx.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(tx) => tx.send(line).is_ok(),
            None => false,
        };
        if !sent {
            tracing::warn!(path = %self.path.display(), "activity log closed, dropping line");
        }
        Ok(())
    }
}

impl ActivitySink for JsonlWriter {
    fn write(&self, activity: &Activity) {
        if let Err(e) = self.try_write(activity) {
            tracing::error!(error = %e, activity_type = activity.type_name(), "activity log write failed");
        }
    }
}

async fn run(path: PathBuf, mut rx: mpsc::UnboundedReceiver<String>) {
    let file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(source) => {
            let e = JournalError::Open { path, source };
            tracing::error!(error = %e, "activity log disabled");
            while rx.recv().await.is_some() {}
            return;
        }
    };
    tracing::info!(path = %path.display(), "activity log opened");

    let mut out = BufWriter::new(file);
    while let Some(line) = rx.recv().await {
        if let Err(e) = append_batch(&mut out, line, &mut rx).await {
            tracing::error!(error = %e, path = %path.display(), "activity log write failed");
        }
    }
    if let Err(e) = out.shutdown().await {
        tracing::error!(error = %e, path = %path.display(), "activity log close failed");
    }
}

/// Write `first` plus whatever else is already queued, then flush once.
async fn append_batch(
    out: &mut BufWriter<tokio::fs::File>,
    first: String,
    rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), JournalError> {
    let mut next = Some(first);
    while let Some(line) = next {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        next = rx.try_recv().ok();
    }
    out.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityKind;

    fn text(content: &str) -> Activity {
        Activity::now(
            ActivityKind::Text {
                content: content.to_string(),
            },
            None,
        )
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_one_line_per_activity_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");

        let writer = JsonlWriter::spawn(&path);
        for i in 0..5 {
            writer.write(&text(&format!("line {i}")));
        }
        writer.close().await;

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line["type"], "text");
            assert_eq!(line["content"], format!("line {i}"));
            assert!(line["session"].is_null());
        }
    }

    #[tokio::test]
    async fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        std::fs::write(&path, "{\"type\":\"text\",\"content\":\"old\"}\n").unwrap();

        let writer = JsonlWriter::spawn(&path);
        writer.write(&text("new"));
        writer.close().await;

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["content"], "old");
        assert_eq!(lines[1]["content"], "new");
    }

    #[tokio::test]
    async fn unopenable_path_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("activity.jsonl");

        let writer = JsonlWriter::spawn(&path);
        writer.write(&text("dropped"));
        writer.close().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn writes_after_close_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");

        let writer = JsonlWriter::spawn(&path);
        writer.write(&text("kept"));
        writer.close().await;
        writer.write(&text("late"));
        writer.close().await;

        assert_eq!(read_lines(&path).len(), 1);
    }
}
