//! Energy-burst fallback wake model.
//!
//! [`EnergyGateModel`] classifies each analysis frame as voiced or silent by
//! RMS amplitude and reports keyword 0 once enough consecutive voiced
//! frames have been seen.  It lets the pipeline run end-to-end without a
//! trained keyword model: any sustained speech burst acts as the trigger.
//! Deployments that need a real trigger phrase plug their model in behind
//! [`WakeModel`](super::WakeModel) instead.

use crate::audio::frame_level;

use super::detector::WakeError;
use super::WakeModel;

// ---------------------------------------------------------------------------
// EnergyGateModel
// ---------------------------------------------------------------------------

/// Fires keyword 0 after `required_frames` consecutive voiced frames.
///
/// # Example
///
/// ```rust
/// use voice_diary::wake::{EnergyGateModel, WakeModel};
///
/// let mut model = EnergyGateModel::new(512, 0.05, 3);
/// let loud = vec![i16::MAX / 2; 512];
///
/// assert_eq!(model.process(&loud).unwrap(), None);
/// assert_eq!(model.process(&loud).unwrap(), None);
/// assert_eq!(model.process(&loud).unwrap(), Some(0)); // 3rd voiced frame
/// ```
pub struct EnergyGateModel {
    frame_len: usize,
    /// Normalized RMS threshold; frames above it count as voiced.
    threshold: f32,
    /// Consecutive voiced frames needed before the trigger fires.
    required_frames: u32,
    voiced_run: u32,
}

impl EnergyGateModel {
    /// Create a model with explicit parameters.
    ///
    /// # Panics
    ///
    /// Panics if `frame_len == 0` or `required_frames == 0`.
    pub fn new(frame_len: usize, threshold: f32, required_frames: u32) -> Self {
        assert!(frame_len > 0, "frame_len must be > 0");
        assert!(required_frames > 0, "required_frames must be > 0");
        Self {
            frame_len,
            threshold,
            required_frames,
            voiced_run: 0,
        }
    }

    /// Default tuning: ~600 ms of sustained speech in 512-sample frames.
    pub fn with_defaults(frame_len: usize, threshold: f32) -> Self {
        // 600 ms / 32 ms per 512-sample frame ≈ 19 frames
        let frame_ms = frame_len as u64 * 1_000 / crate::audio::SAMPLE_RATE as u64;
        let required = (600 / frame_ms.max(1)).max(1) as u32;
        Self::new(frame_len, threshold, required)
    }
}

impl WakeModel for EnergyGateModel {
    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, WakeError> {
        if frame_level(frame) > self.threshold {
            self.voiced_run += 1;
            if self.voiced_run >= self.required_frames {
                self.voiced_run = 0;
                return Ok(Some(0));
            }
        } else {
            self.voiced_run = 0;
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
