//! Streaming speech-to-text — the recognition seam of the capture pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │             TranscriptionEngine (trait)                │
//! │                                                        │
//! │   start(events) ──▶ Partial / Final / EndOfSpeech /    │
//! │                     Error(kind)  over tokio mpsc       │
//! │   stop()        ──▶ halts delivery, releases device    │
//! └────────────────────────────────────────────────────────┘
//!            ▲
//!            │ production impl
//!   WhisperStreamEngine — utterance chunking over the live
//!   frame stream, whisper-rs decodes on a dedicated thread
//! ```
//!
//! Events for one recognition attempt arrive in non-decreasing timestamp
//! order; nothing is guaranteed across a stop/restart.

pub mod engine;
pub mod event;
pub mod whisper;

pub use engine::TranscriptionEngine;
pub use event::{EngineErrorKind, TranscriptEvent};
pub use whisper::{EngineInitError, WhisperStreamEngine};

// test-only re-export so the session test module can import MockEngine
// without `use voice_diary::transcribe::engine::MockEngine`.
#[cfg(test)]
pub use engine::{MockAttempt, MockEngine};
