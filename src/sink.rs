//! External collaborator seams: persistence, status, and power.
//!
//! The capture core treats storage, user-visible status, and the platform's
//! keep-awake facility as collaborators behind narrow traits.  The impls in
//! this module are the bundled defaults — a JSONL file sink, a log-backed
//! status sink, and a no-op power lease — swappable without touching the
//! session code.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Errors surfaced by a persistence sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("background save task failed: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// PersistenceSink
// ---------------------------------------------------------------------------

/// Stores one finished diary entry.
///
/// The core calls [`save`](Self::save) exactly once per finalized non-empty
/// draft and does not retry on failure — retry, if any, is the sink's own
/// concern.  The outcome is reported to the user through the status sink.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, text: &str) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// StatusSink
// ---------------------------------------------------------------------------

/// Receives human-readable status strings.
///
/// Fire-and-forget and best-effort: implementations must never block the
/// caller meaningfully, and dropped updates do not affect correctness.
pub trait StatusSink: Send + Sync {
    fn update(&self, message: &str);
}

// ---------------------------------------------------------------------------
// PowerLease
// ---------------------------------------------------------------------------

/// Keeps the device awake while the capture service is active.
///
/// Acquired once when the supervisor starts and released on shutdown; both
/// calls are idempotent.
pub trait PowerLease: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

// ---------------------------------------------------------------------------
// JsonlSink
// ---------------------------------------------------------------------------

/// Serialized form of one stored entry.
#[derive(Debug, Serialize)]
struct EntryRecord<'a> {
    text: &'a str,
    recorded_at_ms: u128,
}

/// Default [`PersistenceSink`]: appends entries as JSON lines.
///
/// The schema here is a reference implementation, not a contract — real
/// deployments substitute their own repository behind the trait.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PersistenceSink for JsonlSink {
    async fn save(&self, text: &str) -> Result<(), SinkError> {
        let record = EntryRecord {
            text,
            recorded_at_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
        };
        let line = serde_json::to_string(&record)?;
        let path = self.path.clone();

        // File I/O off the async runtime.
        tokio::task::spawn_blocking(move || -> Result<(), SinkError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{line}")?;
            Ok(())
        })
        .await
        .map_err(|e| SinkError::Join(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// LogStatusSink
// ---------------------------------------------------------------------------

/// Default [`StatusSink`]: forwards status lines to the log.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn update(&self, message: &str) {
        log::info!("status: {message}");
    }
}

// ---------------------------------------------------------------------------
// NoopPowerLease
// ---------------------------------------------------------------------------

/// Default [`PowerLease`] for platforms without a wake-lock equivalent.
///
/// Tracks held/released so redundant calls stay observable in the log
/// without double-acquiring anything.
pub struct NoopPowerLease {
    held: AtomicBool,
}

impl NoopPowerLease {
    pub fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }
}

impl Default for NoopPowerLease {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerLease for NoopPowerLease {
    fn acquire(&self) {
        if !self.held.swap(true, Ordering::Relaxed) {
            log::debug!("power lease acquired");
        }
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::Relaxed) {
            log::debug!("power lease released");
        }
    }
}

// ---------------------------------------------------------------------------
// Test doubles  (shared by session and supervisor tests)
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.jsonl");
        let sink = JsonlSink::new(path.clone());

        sink.save("first entry").await.unwrap();
        sink.save("second entry").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["text"], "first entry");
        assert!(first["recorded_at_ms"].as_u64().is_some());
    }

    #[tokio::test]
    async fn jsonl_sink_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/entries.jsonl");
        let sink = JsonlSink::new(path.clone());

        sink.save("entry").await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn noop_lease_is_idempotent() {
        let lease = NoopPowerLease::new();
        lease.acquire();
        lease.acquire(); // second acquire is a no-op
        lease.release();
        lease.release(); // second release is a no-op
        assert!(!lease.held.load(Ordering::Relaxed));
    }

    #[test]
    fn log_status_sink_does_not_panic() {
        LogStatusSink.update("hello");
    }
}
