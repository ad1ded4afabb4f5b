//! Streaming transcription built on `whisper-rs`.
//!
//! Whisper is a batch decoder, so [`WhisperStreamEngine`] turns the live
//! frame stream into decodable chunks itself: frames are classified voiced /
//! silent by RMS energy, voiced runs accumulate into an *utterance*, and a
//! silence gap closes the utterance and emits a `Final` decode.  While an
//! utterance is open, the buffered audio is re-decoded every
//! `partial_interval` to produce `Partial` events.
//!
//! The engine owns the audio device for the lifetime of one attempt (from
//! `start` until `stop`) — the wake-word detector must be stopped first.
//! All decoding happens on a dedicated `transcribe-stream` OS thread so the
//! async runtime never stalls on inference.

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{frame_level, AudioSource, SourceHandle};
use crate::config::{AudioConfig, EngineConfig};

use super::engine::TranscriptionEngine;
use super::event::{EngineErrorKind, TranscriptEvent};

/// Utterances shorter than this are discarded instead of decoded — Whisper
/// hallucinates on sub-half-second clips.
const MIN_DECODE_SAMPLES: usize = 8_000; // 0.5 s at 16 kHz

/// An utterance is force-closed once it reaches this length.
const MAX_UTTERANCE_SAMPLES: usize = 480_000; // 30 s at 16 kHz

// ---------------------------------------------------------------------------
// EngineInitError
// ---------------------------------------------------------------------------

/// Errors constructing the engine (model loading).
#[derive(Debug, Error)]
pub enum EngineInitError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a `WhisperContext`.
    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),
}

// ---------------------------------------------------------------------------
// WhisperStreamEngine
// ---------------------------------------------------------------------------

/// Production [`TranscriptionEngine`] that decodes the microphone stream
/// with a GGML Whisper model.
pub struct WhisperStreamEngine {
    ctx: Arc<WhisperContext>,
    source: Arc<dyn AudioSource>,
    engine_cfg: EngineConfig,
    audio_cfg: AudioConfig,
    level_hook: Option<Arc<dyn Fn(f32) + Send + Sync>>,
    stop: Arc<AtomicBool>,
    handle: Option<SourceHandle>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl std::fmt::Debug for WhisperStreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperStreamEngine")
            .field("engine_cfg", &self.engine_cfg)
            .field("active", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl WhisperStreamEngine {
    /// Load a GGML model from `model_path` and prepare an engine over
    /// `source`.
    ///
    /// # Errors
    ///
    /// - [`EngineInitError::ModelNotFound`] — `model_path` does not exist.
    /// - [`EngineInitError::ContextInit`] — whisper-rs failed to load it.
    pub fn load(
        model_path: impl AsRef<Path>,
        source: Arc<dyn AudioSource>,
        engine_cfg: EngineConfig,
        audio_cfg: AudioConfig,
    ) -> Result<Self, EngineInitError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(EngineInitError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            EngineInitError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx_params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| EngineInitError::ContextInit(e.to_string()))?;

        Ok(Self::from_context(Arc::new(ctx), source, engine_cfg, audio_cfg))
    }

    /// Build an engine over an already-loaded context.
    ///
    /// Model weights are read-only after loading, so one context can be
    /// shared across the supervisor's session rebuilds.
    pub fn from_context(
        ctx: Arc<WhisperContext>,
        source: Arc<dyn AudioSource>,
        engine_cfg: EngineConfig,
        audio_cfg: AudioConfig,
    ) -> Self {
        Self {
            ctx,
            source,
            engine_cfg,
            audio_cfg,
            level_hook: None,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            thread: None,
        }
    }

    /// Install a callback invoked with the normalized RMS level of every
    /// captured frame — the session uses it for its recording indicator.
    pub fn with_level_hook(mut self, hook: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.level_hook = Some(Arc::new(hook));
        self
    }
}

impl TranscriptionEngine for WhisperStreamEngine {
    fn start(&mut self, events: mpsc::Sender<TranscriptEvent>) -> bool {
        if self.handle.is_some() {
            log::warn!("whisper: start called while already active");
            return false;
        }

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let handle = match self.source.start(frame_tx) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("whisper: could not acquire audio device: {e}");
                return false;
            }
        };

        self.stop = Arc::new(AtomicBool::new(false));

        let worker = StreamWorker {
            ctx: Arc::clone(&self.ctx),
            language: self.engine_cfg.language.clone(),
            voice_threshold: self.audio_cfg.voice_threshold,
            utterance_gap: self.engine_cfg.utterance_gap(),
            partial_interval: self.engine_cfg.partial_interval(),
            no_speech_window: self.engine_cfg.no_speech_window(),
            level_hook: self.level_hook.clone(),
            stop: Arc::clone(&self.stop),
        };

        let thread = std::thread::Builder::new()
            .name("transcribe-stream".into())
            .spawn(move || worker.run(frame_rx, events))
            .expect("failed to spawn transcribe-stream thread");

        self.handle = Some(handle);
        self.thread = Some(thread);
        log::info!("whisper: recognition attempt started");
        true
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        // Dropping the handle releases the device; the frame channel closes
        // and the worker thread drains out.
        if self.handle.take().is_some() {
            log::info!("whisper: stopped");
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("whisper: transcribe-stream thread panicked");
            }
        }
    }
}

impl Drop for WhisperStreamEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// StreamWorker
// ---------------------------------------------------------------------------

/// State moved onto the `transcribe-stream` thread.
struct StreamWorker {
    ctx: Arc<WhisperContext>,
    language: String,
    voice_threshold: f32,
    utterance_gap: std::time::Duration,
    partial_interval: std::time::Duration,
    no_speech_window: std::time::Duration,
    level_hook: Option<Arc<dyn Fn(f32) + Send + Sync>>,
    stop: Arc<AtomicBool>,
}

impl StreamWorker {
    fn run(
        self,
        mut frames: mpsc::Receiver<crate::audio::AudioFrame>,
        events: mpsc::Sender<TranscriptEvent>,
    ) {
        let started = Instant::now();
        let mut utterance: Vec<i16> = Vec::new();
        let mut voiced_frames = 0usize;
        let mut total_frames = 0usize;
        let mut last_voice = Instant::now();
        let mut last_partial = Instant::now();
        let mut any_speech = false;

        while let Some(frame) = frames.blocking_recv() {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }

            let level = frame_level(frame.samples());
            if let Some(hook) = &self.level_hook {
                hook(level);
            }

            let voiced = level > self.voice_threshold;
            let at_ms = started.elapsed().as_millis() as u64;

            if voiced {
                if utterance.is_empty() {
                    last_partial = Instant::now();
                }
                any_speech = true;
                last_voice = Instant::now();
                utterance.extend_from_slice(frame.samples());
                voiced_frames += 1;
                total_frames += 1;
            } else if !utterance.is_empty() {
                // Hangover: keep buffering through short pauses so words are
                // not clipped at utterance edges.
                utterance.extend_from_slice(frame.samples());
                total_frames += 1;

                if last_voice.elapsed() >= self.utterance_gap {
                    let confidence = voiced_frames as f32 / total_frames.max(1) as f32;
                    if !self.close_utterance(&mut utterance, confidence, at_ms, &events) {
                        return;
                    }
                    voiced_frames = 0;
                    total_frames = 0;
                    continue;
                }
            } else if !any_speech && started.elapsed() >= self.no_speech_window {
                let _ = events.blocking_send(TranscriptEvent::EndOfSpeech);
                return;
            }

            if utterance.len() >= MAX_UTTERANCE_SAMPLES {
                let confidence = voiced_frames as f32 / total_frames.max(1) as f32;
                if !self.close_utterance(&mut utterance, confidence, at_ms, &events) {
                    return;
                }
                voiced_frames = 0;
                total_frames = 0;
                continue;
            }

            // Periodic partial decode of the open utterance.
            if !utterance.is_empty()
                && utterance.len() >= MIN_DECODE_SAMPLES
                && last_partial.elapsed() >= self.partial_interval
            {
                last_partial = Instant::now();
                match self.decode(&utterance) {
                    Ok(text) if !text.is_empty() => {
                        if events
                            .blocking_send(TranscriptEvent::Partial { text, at_ms })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(kind) => {
                        let _ = events.blocking_send(TranscriptEvent::Error(kind));
                        return;
                    }
                }
            }
        }
    }

    /// Decode the finished utterance and emit a `Final` event.
    ///
    /// Returns `false` when the event channel is gone or decoding failed
    /// terminally and the worker should exit.
    fn close_utterance(
        &self,
        utterance: &mut Vec<i16>,
        confidence: f32,
        at_ms: u64,
        events: &mpsc::Sender<TranscriptEvent>,
    ) -> bool {
        let samples = std::mem::take(utterance);

        if samples.len() < MIN_DECODE_SAMPLES {
            log::debug!("whisper: discarding {}-sample utterance", samples.len());
            return true;
        }

        match self.decode(&samples) {
            Ok(text) if !text.is_empty() => events
                .blocking_send(TranscriptEvent::Final {
                    text,
                    confidence,
                    at_ms,
                })
                .is_ok(),
            Ok(_) => true, // decoded to nothing — not an error
            Err(kind) => {
                let _ = events.blocking_send(TranscriptEvent::Error(kind));
                false
            }
        }
    }

    /// Run one whisper inference pass over `samples`.
    fn decode(&self, samples: &[i16]) -> Result<String, EngineErrorKind> {
        let audio: Vec<f32> = samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect();

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        let lang: Option<&str> = if self.language == "auto" {
            None
        } else {
            Some(self.language.as_str())
        };
        params.set_language(lang);
        params.set_n_threads(decode_threads());
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let mut state = self.ctx.create_state().map_err(|e| {
            log::error!("whisper: create_state failed: {e}");
            EngineErrorKind::Internal
        })?;

        state.full(params, &audio).map_err(|e| {
            log::error!("whisper: inference failed: {e}");
            EngineErrorKind::Internal
        })?;

        let n_segments = state.full_n_segments().map_err(|e| {
            log::error!("whisper: segment count failed: {e}");
            EngineErrorKind::Internal
        })?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state.full_get_segment_text(i).map_err(|e| {
                log::error!("whisper: segment {i} failed: {e}");
                EngineErrorKind::Internal
            })?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}

/// Inference thread count: one per core, capped at 8.
fn decode_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4) as i32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::ScriptedSource;

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let result = WhisperStreamEngine::load(
            "/nonexistent/model.bin",
            source,
            EngineConfig::default(),
            AudioConfig::default(),
        );
        assert!(
            matches!(result, Err(EngineInitError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    #[test]
    fn decode_threads_is_positive_and_at_most_8() {
        let t = decode_threads();
        assert!((1..=8).contains(&t));
    }

    #[test]
    fn engine_init_error_display_contains_path() {
        let e = EngineInitError::ModelNotFound("/some/model.bin".into());
        assert!(e.to_string().contains("/some/model.bin"));
    }
}
