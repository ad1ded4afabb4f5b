//! Hands-free voice-diary capture pipeline.
//!
//! The crate listens for a spoken trigger phrase, records and transcribes a
//! diary entry until the speaker says the end phrase (or a silence / maximum
//! duration timeout fires), and hands the finished text to a persistence
//! sink.  A supervisor keeps the cycle running indefinitely.
//!
//! # Data flow
//!
//! ```text
//! MicSource → WakeWordDetector ──trigger──▶ CaptureSession
//!                                              │ starts
//!                                              ▼
//!                                   WhisperStreamEngine
//!                                              │ Partial / Final events
//!                                              ▼
//!                                         DiaryDraft ──finalize──▶ PersistenceSink
//! ```
//!
//! Control flow: [`supervisor::SessionSupervisor`] restarts sessions after
//! completion or error; each [`session::CaptureSession`] drives its own
//! timers and pushes progress strings to a [`sink::StatusSink`].

pub mod audio;
pub mod config;
pub mod session;
pub mod sink;
pub mod supervisor;
pub mod transcribe;
pub mod wake;
