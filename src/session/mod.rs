//! Capture session — the state machine at the heart of the pipeline.
//!
//! One [`CaptureSession`] owns a single end-to-end capture: from listening
//! for the trigger phrase, through recording and transcribing the diary
//! entry, to handing the finished text to the persistence sink.  All
//! externally delivered events (trigger, transcript events, timer fires)
//! are serialized onto one control path before touching session state.
//!
//! ```text
//! Idle ──start──▶ ListeningForTrigger ──trigger──▶ Recording
//!                                                     │ end phrase /
//!                                                     │ silence / max length
//!                                                     ▼
//!                      Idle ◀──dwell── Finalizing ──▶ PersistenceSink
//! any state ──unrecoverable──▶ Error (supervisor restarts with backoff)
//! ```

pub mod capture;
pub mod draft;
pub mod retry;

pub use capture::{CaptureSession, SessionEvent, SessionOutcome};
pub use draft::{DiaryDraft, MergeOutcome};
pub use retry::RetryBudget;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// States of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet listening.
    Idle,

    /// The wake-word detector owns the microphone, waiting for the trigger.
    ListeningForTrigger,

    /// The transcription engine owns the microphone; transcript events are
    /// being merged into the draft.
    Recording,

    /// The recording ended; the draft is being persisted.
    Finalizing,

    /// An unrecoverable failure; the supervisor rebuilds the session after
    /// a backoff.
    Error,
}

impl SessionState {
    /// A short human-readable label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::ListeningForTrigger => "Listening",
            SessionState::Recording => "Recording",
            SessionState::Finalizing => "Saving",
            SessionState::Error => "Error",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn labels() {
        assert_eq!(SessionState::Idle.label(), "Idle");
        assert_eq!(SessionState::ListeningForTrigger.label(), "Listening");
        assert_eq!(SessionState::Recording.label(), "Recording");
        assert_eq!(SessionState::Finalizing.label(), "Saving");
        assert_eq!(SessionState::Error.label(), "Error");
    }
}
