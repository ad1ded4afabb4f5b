//! Signal-energy level metering for user-visible progress feedback.
//!
//! While a diary entry is being recorded, the session pushes a status line
//! containing a coarse level indicator so the speaker can see that audio is
//! arriving.  [`frame_level`] computes the normalized RMS of one PCM frame;
//! [`level_bars`] renders it as a short bar string.

// ---------------------------------------------------------------------------
// frame_level
// ---------------------------------------------------------------------------

/// RMS amplitude of a 16-bit PCM frame, normalized to `[0.0, 1.0]`.
///
/// An empty frame reports `0.0`.
///
/// # Example
///
/// ```rust
/// use voice_diary::audio::frame_level;
///
/// assert_eq!(frame_level(&[0; 480]), 0.0);
/// let loud = vec![i16::MAX; 480];
/// assert!((frame_level(&loud) - 1.0).abs() < 1e-3);
/// ```
pub fn frame_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum::<f64>()
        / samples.len() as f64;
    (mean_sq.sqrt() / i16::MAX as f64).min(1.0) as f32
}

// ---------------------------------------------------------------------------
// level_bars
// ---------------------------------------------------------------------------

/// Render `level` (in `[0.0, 1.0]`) as 1–5 block bars.
///
/// Levels at or below zero still render one bar so the indicator never
/// disappears entirely mid-recording.
pub fn level_bars(level: f32) -> String {
    let count = ((level * 5.0) as usize).clamp(1, 5);
    "▌".repeat(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_frame_is_zero() {
        assert_eq!(frame_level(&[0; 512]), 0.0);
    }

    #[test]
    fn empty_frame_is_zero() {
        assert_eq!(frame_level(&[]), 0.0);
    }

    #[test]
    fn full_scale_frame_is_one() {
        let loud = vec![i16::MAX; 512];
        assert!((frame_level(&loud) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn level_scales_with_amplitude() {
        let quiet = vec![i16::MAX / 10; 512];
        let loud = vec![i16::MAX / 2; 512];
        assert!(frame_level(&quiet) < frame_level(&loud));
    }

    #[test]
    fn bars_clamped_between_one_and_five() {
        assert_eq!(level_bars(0.0), "▌");
        assert_eq!(level_bars(-1.0), "▌");
        assert_eq!(level_bars(1.0), "▌▌▌▌▌");
        assert_eq!(level_bars(0.5), "▌▌");
    }
}
