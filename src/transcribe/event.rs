//! Transcript events and the recognizer error taxonomy.

use thiserror::Error;

// ---------------------------------------------------------------------------
// TranscriptEvent
// ---------------------------------------------------------------------------

/// One asynchronous result from a recognition attempt.
///
/// `at_ms` timestamps are milliseconds since the attempt started and are
/// non-decreasing within one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    /// Unstable transcript of the utterance currently being spoken; a later
    /// `Partial` or `Final` supersedes it.
    Partial { text: String, at_ms: u64 },

    /// Committed transcript segment that will not be revised.
    Final {
        text: String,
        confidence: f32,
        at_ms: u64,
    },

    /// The recognition attempt completed without further results.
    EndOfSpeech,

    /// The attempt failed; see [`EngineErrorKind::is_transient`] for
    /// whether a retry is worthwhile.
    Error(EngineErrorKind),
}

// ---------------------------------------------------------------------------
// EngineErrorKind
// ---------------------------------------------------------------------------

/// Classified recognizer failures.
///
/// Transient kinds are retried in place (bounded by the session's retry
/// budget) without losing accumulated draft content; fatal kinds end the
/// attempt immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineErrorKind {
    #[error("network error")]
    Network,

    #[error("recognition timed out")]
    Timeout,

    #[error("recognizer busy")]
    Busy,

    #[error("no speech matched")]
    NoMatch,

    #[error("internal recognizer error")]
    Internal,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("speech recognition unavailable on this platform")]
    Unavailable,

    #[error("recognizer misconfigured")]
    Misconfigured,
}

impl EngineErrorKind {
    /// Returns `true` for failures worth retrying in place.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineErrorKind::Network
                | EngineErrorKind::Timeout
                | EngineErrorKind::Busy
                | EngineErrorKind::NoMatch
                | EngineErrorKind::Internal
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(EngineErrorKind::Network.is_transient());
        assert!(EngineErrorKind::Timeout.is_transient());
        assert!(EngineErrorKind::Busy.is_transient());
        assert!(EngineErrorKind::NoMatch.is_transient());
        assert!(EngineErrorKind::Internal.is_transient());
    }

    #[test]
    fn fatal_kinds() {
        assert!(!EngineErrorKind::PermissionDenied.is_transient());
        assert!(!EngineErrorKind::Unavailable.is_transient());
        assert!(!EngineErrorKind::Misconfigured.is_transient());
    }

    #[test]
    fn events_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TranscriptEvent>();
    }
}
