//! Audio pipeline — microphone capture → resampling → fixed-length frames.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → mix_to_mono → resample_to_16k
//!           → f32_to_i16 → AudioFrame (mpsc) → WakeWordDetector / engine
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tokio::sync::mpsc;
//! use voice_diary::audio::{AudioFrame, AudioSource, MicSource};
//! use voice_diary::config::AudioConfig;
//!
//! let source = MicSource::new(AudioConfig::default());
//! let (tx, mut rx) = mpsc::channel::<AudioFrame>(64);
//! let _handle = source.start(tx).unwrap(); // drop handle → releases the device
//! ```

pub mod capture;
pub mod frame;
pub mod level;
pub mod resample;

pub use capture::{AudioError, AudioSource, MicSource, SourceHandle};
pub use frame::{AudioFrame, SAMPLE_RATE};
pub use level::{frame_level, level_bars};
pub use resample::{f32_to_i16, mix_to_mono, resample_to_16k};
