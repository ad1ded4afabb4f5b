//! Microphone capture via `cpal`.
//!
//! [`AudioSource`] is the seam between the capture hardware and the rest of
//! the pipeline: each `start` call yields a fresh stream of fixed-length
//! [`AudioFrame`]s plus a [`SourceHandle`] RAII guard.  Dropping the guard
//! releases the device, which is how the mutual-exclusion rule between the
//! wake-word detector and the transcription engine is enforced — whichever
//! component holds the handle owns the device.
//!
//! `cpal::Stream` is not `Send` on every platform, so [`MicSource`] builds
//! and drops the stream on a dedicated OS thread; the handle only carries a
//! stop flag and the thread's join handle, both of which are `Send`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::AudioConfig;

use super::frame::AudioFrame;
use super::resample::{f32_to_i16, mix_to_mono, resample_to_16k};

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring or running the audio device.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device \"{0}\" not found")]
    NamedDeviceNotFound(String),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to enumerate input devices: {0}")]
    Enumerate(#[from] cpal::DevicesError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio capture thread exited before the stream came up")]
    ThreadDied,
}

// ---------------------------------------------------------------------------
// AudioSource
// ---------------------------------------------------------------------------

/// A restartable producer of fixed-length 16 kHz mono PCM frames.
///
/// Each `start` call yields a fresh frame sequence.  The physical device is
/// a singleton resource: callers must drop the previous [`SourceHandle`]
/// before starting a new consumer.
pub trait AudioSource: Send + Sync {
    /// Begin streaming frames into `tx`.
    ///
    /// Returns a [`SourceHandle`] whose drop stops the stream and releases
    /// the device.  When the consumer lags, frames are dropped rather than
    /// blocking the capture callback.
    fn start(&self, tx: mpsc::Sender<AudioFrame>) -> Result<SourceHandle, AudioError>;
}

// ---------------------------------------------------------------------------
// SourceHandle
// ---------------------------------------------------------------------------

/// RAII guard for an active capture stream.
///
/// Dropping the handle signals the capture thread to stop, waits for it to
/// drop the underlying stream, and thereby releases the device.  Safe to
/// drop at any time; dropping twice is impossible by construction.
pub struct SourceHandle {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SourceHandle {
    /// Build a handle from a stop flag and the thread that owns the stream.
    pub(crate) fn new(stop: Arc<AtomicBool>, thread: std::thread::JoinHandle<()>) -> Self {
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("audio capture thread panicked during shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MicSource
// ---------------------------------------------------------------------------

/// Production [`AudioSource`] backed by the system microphone.
///
/// The cpal callback delivers interleaved native-rate `f32` buffers; the
/// callback path downmixes to mono, resamples to 16 kHz, quantizes to i16
/// and slices the result into frames of `config.frame_len` samples, carrying
/// any remainder into the next callback.
pub struct MicSource {
    config: AudioConfig,
}

impl MicSource {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Resolve the configured device, falling back to the host default.
    fn resolve_device(&self) -> Result<cpal::Device, AudioError> {
        let host = cpal::default_host();

        if let Some(wanted) = &self.config.input_device {
            for device in host.input_devices()? {
                if device.name().is_ok_and(|n| &n == wanted) {
                    return Ok(device);
                }
            }
            return Err(AudioError::NamedDeviceNotFound(wanted.clone()));
        }

        host.default_input_device().ok_or(AudioError::NoDevice)
    }
}

impl AudioSource for MicSource {
    fn start(&self, tx: mpsc::Sender<AudioFrame>) -> Result<SourceHandle, AudioError> {
        let device = self.resolve_device()?;
        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let native_rate = supported.sample_rate().0;
        let stream_config: cpal::StreamConfig = supported.into();
        let frame_len = self.config.frame_len.max(1);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);

        // The thread reports the outcome of stream construction back to the
        // caller so `start` can fail synchronously.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), AudioError>>();

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                // Remainder samples carried between cpal callbacks.
                let mut carry: Vec<i16> = Vec::with_capacity(frame_len);

                let build_result = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = mix_to_mono(data, channels);
                        let resampled = resample_to_16k(&mono, native_rate);
                        carry.extend(f32_to_i16(&resampled));

                        while carry.len() >= frame_len {
                            let rest = carry.split_off(frame_len);
                            let frame = AudioFrame::new(std::mem::replace(&mut carry, rest));
                            // try_send: a slow consumer drops frames instead
                            // of blocking the realtime callback.
                            let _ = tx.try_send(frame);
                        }
                    },
                    |err: cpal::StreamError| {
                        log::error!("cpal stream error: {err}");
                    },
                    None, // no timeout
                );

                let stream = match build_result {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // The stream stays alive as long as this thread holds it.
                while !stop_thread.load(Ordering::Relaxed) {
                    std::thread::park_timeout(Duration::from_millis(50));
                }
                drop(stream);
            })
            .expect("failed to spawn mic-capture thread");

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!(
                    "audio capture started ({native_rate} Hz, {channels} ch → 16 kHz mono, \
                     {frame_len}-sample frames)"
                );
                Ok(SourceHandle::new(stop, thread))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::ThreadDied)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedSource  (test-only)
// ---------------------------------------------------------------------------

/// A test double that replays a fixed list of frames from a background
/// thread, then keeps the stream open (silent) until stopped.
#[cfg(test)]
pub struct ScriptedSource {
    frames: Vec<AudioFrame>,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self { frames }
    }

    /// Build a source from raw sample blocks.
    pub fn from_blocks(blocks: Vec<Vec<i16>>) -> Self {
        Self::new(blocks.into_iter().map(AudioFrame::new).collect())
    }
}

#[cfg(test)]
impl AudioSource for ScriptedSource {
    fn start(&self, tx: mpsc::Sender<AudioFrame>) -> Result<SourceHandle, AudioError> {
        let frames = self.frames.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("scripted-source".into())
            .spawn(move || {
                for frame in frames {
                    if stop_thread.load(Ordering::Relaxed) {
                        return;
                    }
                    if tx.blocking_send(frame).is_err() {
                        return;
                    }
                }
                while !stop_thread.load(Ordering::Relaxed) {
                    std::thread::park_timeout(Duration::from_millis(10));
                }
            })
            .expect("failed to spawn scripted-source thread");

        Ok(SourceHandle::new(stop, thread))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
