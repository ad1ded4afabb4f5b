//! Fixed-format PCM audio frames.
//!
//! Every component downstream of the capture layer works on 16 kHz mono
//! signed 16-bit samples; the capture layer converts whatever the device
//! delivers into this format before a frame is constructed.

/// Sample rate of every [`AudioFrame`], in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// An ordered block of signed 16-bit mono samples at [`SAMPLE_RATE`].
///
/// Immutable once produced; ownership transfers from the audio source to
/// whichever consumer is currently active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap `samples` in a frame.
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// The PCM samples in capture order.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in the frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when the frame holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by this frame.
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / SAMPLE_RATE as f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_reports_len_and_samples() {
        let frame = AudioFrame::new(vec![1, -2, 3]);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.samples(), &[1, -2, 3]);
        assert!(!frame.is_empty());
    }

    #[test]
    fn empty_frame() {
        let frame = AudioFrame::new(Vec::new());
        assert!(frame.is_empty());
        assert_eq!(frame.len(), 0);
    }

    #[test]
    fn duration_at_16k() {
        // 512 samples at 16 kHz = 32 ms
        let frame = AudioFrame::new(vec![0; 512]);
        assert_eq!(frame.duration(), std::time::Duration::from_millis(32));
    }

    #[test]
    fn frame_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioFrame>();
    }
}
