//! Wake-word detection — trigger-phrase spotting on the live audio stream.
//!
//! # Architecture
//!
//! ```text
//! AudioSource ──AudioFrame──▶ DetectionWindow ──model frames──▶ WakeModel
//!                                                                │ keyword idx
//!                                                                ▼
//!                                                        on_trigger (once)
//! ```
//!
//! [`WakeModel`] is the seam for the actual keyword-spotting capability:
//! production deployments plug in a real model; [`EnergyGateModel`] is a
//! model-less fallback that triggers on any sustained speech burst.
//!
//! [`WakeWordDetector`] owns the lifecycle: it acquires the audio device,
//! feeds the model frame-by-frame, fires the trigger callback exactly once,
//! and releases the device on [`WakeWordDetector::stop`].

pub mod detector;
pub mod energy;
pub mod window;

pub use detector::{WakeError, WakeWordDetector};
pub use energy::EnergyGateModel;
pub use window::DetectionWindow;

// ---------------------------------------------------------------------------
// WakeModel
// ---------------------------------------------------------------------------

/// A keyword-spotting model consumed by [`WakeWordDetector`].
///
/// The detector feeds the model frames of exactly [`frame_len`] samples.
/// `process` returns the index of the detected keyword (into the configured
/// trigger-phrase list), or `None` when the frame contains no keyword.
///
/// [`frame_len`]: WakeModel::frame_len
pub trait WakeModel: Send {
    /// Number of samples the model requires per analysis frame.
    fn frame_len(&self) -> usize;

    /// Analyse one frame of exactly [`frame_len`](Self::frame_len) samples.
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, WakeError>;
}
