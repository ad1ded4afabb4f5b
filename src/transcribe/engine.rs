//! The [`TranscriptionEngine`] trait and its test double.
//!
//! The trait mirrors the platform-recognizer contract the session was
//! designed around: `start` returns `false` (rather than an error) when the
//! capability is momentarily unavailable — the caller treats that as a
//! retryable startup failure, not a session-fatal one.

use tokio::sync::mpsc;

use super::event::TranscriptEvent;

// ---------------------------------------------------------------------------
// TranscriptionEngine
// ---------------------------------------------------------------------------

/// An asynchronous streaming speech recognizer.
///
/// # Contract
///
/// - `start` begins one recognition attempt and delivers its
///   [`TranscriptEvent`]s into `events`.  Returns `false` when the engine is
///   already active or the underlying capability is unavailable right now;
///   the caller retries with a delay.
/// - `stop` halts event delivery and releases the audio device.  Idempotent:
///   calling it twice in a row produces no error and no duplicate events.
/// - After `stop`, `start` may be called again for a fresh attempt; event
///   ordering is only guaranteed within one attempt.
pub trait TranscriptionEngine: Send {
    /// Begin a recognition attempt.
    fn start(&mut self, events: mpsc::Sender<TranscriptEvent>) -> bool;

    /// Stop the current attempt, if any.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// MockEngine  (test-only)
// ---------------------------------------------------------------------------

/// Scripted behaviour for one `start` call of [`MockEngine`].
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum MockAttempt {
    /// `start` returns `false` without delivering anything.
    Refuse,
    /// `start` returns `true` and the events are delivered in order with a
    /// short pause between them; the attempt then goes quiet.
    Events(Vec<TranscriptEvent>),
}

/// A test double that replays scripted attempts.
///
/// Each `start` call consumes the next [`MockAttempt`] from the script;
/// once the script runs dry, further starts succeed but stay silent (useful
/// for driving the session's own timers).  `stop` halts delivery of the
/// current attempt, as the real engine does.
#[cfg(test)]
pub struct MockEngine {
    script: std::collections::VecDeque<MockAttempt>,
    active: Option<std::sync::Arc<std::sync::atomic::AtomicBool>>,
    /// Number of `start` calls that returned `true`.
    pub starts: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    /// Number of `stop` calls observed.
    pub stops: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MockEngine {
    pub fn new(script: Vec<MockAttempt>) -> Self {
        Self {
            script: script.into_iter().collect(),
            active: None,
            starts: Default::default(),
            stops: Default::default(),
        }
    }

    /// Convenience: a single attempt delivering `events`.
    pub fn single(events: Vec<TranscriptEvent>) -> Self {
        Self::new(vec![MockAttempt::Events(events)])
    }
}

#[cfg(test)]
impl TranscriptionEngine for MockEngine {
    fn start(&mut self, events: mpsc::Sender<TranscriptEvent>) -> bool {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        if self.active.is_some() {
            return false;
        }

        let attempt = self
            .script
            .pop_front()
            .unwrap_or(MockAttempt::Events(Vec::new()));

        let scripted = match attempt {
            MockAttempt::Refuse => return false,
            MockAttempt::Events(evts) => evts,
        };

        let halted = Arc::new(AtomicBool::new(false));
        let halted_task = Arc::clone(&halted);

        tokio::spawn(async move {
            for event in scripted {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                if halted_task.load(Ordering::Relaxed) {
                    return;
                }
                if events.send(event).await.is_err() {
                    return;
                }
            }
        });

        self.active = Some(halted);
        self.starts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        true
    }

    fn stop(&mut self) {
        if let Some(halted) = self.active.take() {
            halted.store(true, std::sync::atomic::Ordering::Relaxed);
        }
        self.stops.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::event::EngineErrorKind;

    #[tokio::test]
    async fn mock_delivers_scripted_events_in_order() {
        let mut engine = MockEngine::single(vec![
            TranscriptEvent::Partial {
                text: "hel".into(),
                at_ms: 10,
            },
            TranscriptEvent::Final {
                text: "hello".into(),
                confidence: 0.9,
                at_ms: 50,
            },
            TranscriptEvent::EndOfSpeech,
        ]);

        let (tx, mut rx) = mpsc::channel(8);
        assert!(engine.start(tx));

        assert!(matches!(
            rx.recv().await.unwrap(),
            TranscriptEvent::Partial { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            TranscriptEvent::Final { .. }
        ));
        assert_eq!(rx.recv().await.unwrap(), TranscriptEvent::EndOfSpeech);
        // Script exhausted — channel closes when the task finishes.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn refused_attempt_returns_false() {
        let mut engine = MockEngine::new(vec![
            MockAttempt::Refuse,
            MockAttempt::Events(vec![TranscriptEvent::EndOfSpeech]),
        ]);

        let (tx, mut rx) = mpsc::channel(8);
        assert!(!engine.start(tx));

        // Second attempt succeeds.
        let (tx2, mut rx2) = mpsc::channel(8);
        assert!(engine.start(tx2));
        assert_eq!(rx2.recv().await.unwrap(), TranscriptEvent::EndOfSpeech);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stop_halts_delivery_and_is_idempotent() {
        let mut engine = MockEngine::single(vec![
            TranscriptEvent::Error(EngineErrorKind::Network);
            50
        ]);

        let (tx, mut rx) = mpsc::channel(64);
        assert!(engine.start(tx));

        // Let a couple of events through, then stop twice.
        let _ = rx.recv().await;
        engine.stop();
        engine.stop();

        // Drain whatever was in flight; the stream must end without
        // delivering all 50 scripted events.
        let mut remaining = 0;
        while rx.recv().await.is_some() {
            remaining += 1;
        }
        assert!(remaining < 49, "stop did not halt delivery");
        assert_eq!(engine.stops.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn start_while_active_returns_false() {
        let mut engine = MockEngine::single(vec![TranscriptEvent::EndOfSpeech]);
        let (tx, _rx) = mpsc::channel(8);
        assert!(engine.start(tx));

        let (tx2, _rx2) = mpsc::channel(8);
        assert!(!engine.start(tx2));
    }
}
