//! Wake-word detector lifecycle: device acquisition, frame consumption,
//! trigger-once delivery.
//!
//! The detector runs its model on a dedicated OS thread fed by the audio
//! source's frame channel.  When the model reports a keyword, the trigger
//! callback fires exactly once and the thread stops consuming — the caller
//! must call [`WakeWordDetector::stop`] and then `start` again for the next
//! cycle; the detector is deliberately not self-restarting so the session
//! state machine stays the single owner of the cycle.
//!
//! While active, the detector holds the audio device's [`SourceHandle`];
//! the transcription engine must not be started until [`stop`] has released
//! it.
//!
//! [`stop`]: WakeWordDetector::stop

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{AudioError, AudioSource, SourceHandle};

use super::window::DetectionWindow;
use super::WakeModel;

// ---------------------------------------------------------------------------
// WakeError
// ---------------------------------------------------------------------------

/// Errors from the wake-word subsystem.
#[derive(Debug, Error)]
pub enum WakeError {
    /// The detection model could not be constructed or is misconfigured.
    #[error("wake model initialisation failed: {0}")]
    ModelInit(String),

    /// The model rejected a frame during processing.
    #[error("wake model processing failed: {0}")]
    Process(String),

    /// The audio device could not be acquired.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// `start` was called while a previous start is still active.
    #[error("wake-word detector is already listening")]
    AlreadyListening,
}

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// Factory producing a fresh model for each listening cycle.
///
/// Models are rebuilt per cycle rather than reused so a crashed or
/// half-consumed model can never leak state into the next session.
pub type ModelFactory = Box<dyn Fn() -> Result<Box<dyn WakeModel>, WakeError> + Send + Sync>;

// ---------------------------------------------------------------------------
// WakeWordDetector
// ---------------------------------------------------------------------------

/// Listens on the audio source until the wake model reports a keyword.
///
/// # Lifecycle
///
/// ```text
/// start(on_trigger) ──▶ consuming frames ──keyword──▶ on_trigger(idx), halt
///        ▲                                                    │
///        └──────────────── stop() + start() ◀─────────────────┘
/// ```
pub struct WakeWordDetector {
    source: Arc<dyn AudioSource>,
    model_factory: ModelFactory,
    stop: Arc<AtomicBool>,
    handle: Option<SourceHandle>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WakeWordDetector {
    /// Create a detector over `source`, building models with `model_factory`.
    pub fn new(source: Arc<dyn AudioSource>, model_factory: ModelFactory) -> Self {
        Self {
            source,
            model_factory,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            thread: None,
        }
    }

    /// Begin consuming audio frames and watching for the trigger phrase.
    ///
    /// `on_trigger` is invoked at most once per `start` call, from the
    /// detector's own thread, with the detected keyword index.  After it
    /// fires the detector halts internal consumption but keeps the device
    /// until [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// - [`WakeError::AlreadyListening`] — a previous start is still active.
    /// - [`WakeError::ModelInit`] — the model factory failed or produced a
    ///   model with a zero frame length.
    /// - [`WakeError::Audio`] — the audio device could not be acquired.
    pub fn start(
        &mut self,
        on_trigger: impl Fn(usize) + Send + 'static,
    ) -> Result<(), WakeError> {
        if self.handle.is_some() {
            log::warn!("wake: start called while already listening");
            return Err(WakeError::AlreadyListening);
        }

        let mut model = (self.model_factory)()?;
        let frame_len = model.frame_len();
        if frame_len == 0 {
            return Err(WakeError::ModelInit("model reports frame length 0".into()));
        }

        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let handle = self.source.start(frame_tx)?;

        self.stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&self.stop);

        let thread = std::thread::Builder::new()
            .name("wake-detector".into())
            .spawn(move || {
                let mut window = DetectionWindow::new(frame_len);

                while let Some(frame) = frame_rx.blocking_recv() {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }

                    window.push(frame.samples());

                    while let Some(model_frame) = window.pop_frame() {
                        match model.process(&model_frame) {
                            Ok(Some(keyword)) => {
                                log::info!("wake: keyword {keyword} detected");
                                on_trigger(keyword);
                                // Exactly-once delivery: halt consumption.
                                return;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                log::error!("wake: model processing error: {e}");
                                return;
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn wake-detector thread");

        log::info!("wake: listening (model frame length {frame_len})");
        self.handle = Some(handle);
        self.thread = Some(thread);
        Ok(())
    }

    /// Halt frame consumption, release the audio device and discard any
    /// buffered samples.  Idempotent — safe to call any number of times.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        // Dropping the handle stops the source; its channel closes and the
        // detector thread drains out.
        if self.handle.take().is_some() {
            log::info!("wake: stopped");
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("wake: detector thread panicked");
            }
        }
    }

    /// Returns `true` while the detector holds the audio device.
    pub fn is_listening(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for WakeWordDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::ScriptedSource;
    use crate::audio::AudioFrame;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Model that fires keyword `keyword` on the nth processed frame.
    struct FireAtFrame {
        frame_len: usize,
        fire_at: usize,
        keyword: usize,
        seen: usize,
    }

    impl WakeModel for FireAtFrame {
        fn frame_len(&self) -> usize {
            self.frame_len
        }

        fn process(&mut self, _frame: &[i16]) -> Result<Option<usize>, WakeError> {
            self.seen += 1;
            if self.seen == self.fire_at {
                Ok(Some(self.keyword))
            } else {
                Ok(None)
            }
        }
    }

    fn factory(frame_len: usize, fire_at: usize, keyword: usize) -> ModelFactory {
        Box::new(move || {
            Ok(Box::new(FireAtFrame {
                frame_len,
                fire_at,
                keyword,
                seen: 0,
            }))
        })
    }

    fn blocks(n: usize, len: usize) -> Vec<AudioFrame> {
        (0..n).map(|_| AudioFrame::new(vec![100; len])).collect()
    }

    #[test]
    fn trigger_fires_exactly_once() {
        // 10 source frames of 8 samples = 20 model frames of 4; model fires
        // at frame 3 — remaining audio must NOT produce further triggers.
        let source = Arc::new(ScriptedSource::new(blocks(10, 8)));
        let mut detector = WakeWordDetector::new(source, factory(4, 3, 7));

        let (tx, rx) = std_mpsc::channel();
        detector
            .start(move |keyword| {
                tx.send(keyword).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        // No second trigger even though more frames were scripted.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        detector.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let source = Arc::new(ScriptedSource::new(blocks(4, 8)));
        let mut detector = WakeWordDetector::new(source, factory(4, 1000, 0));

        detector.start(|_| {}).unwrap();
        assert!(detector.is_listening());

        detector.stop();
        detector.stop(); // second stop must be a no-op
        assert!(!detector.is_listening());
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let mut detector = WakeWordDetector::new(source, factory(4, 1, 0));
        detector.stop();
        assert!(!detector.is_listening());
    }

    #[test]
    fn double_start_is_rejected() {
        let source = Arc::new(ScriptedSource::new(blocks(2, 8)));
        let mut detector = WakeWordDetector::new(source, factory(4, 1000, 0));

        detector.start(|_| {}).unwrap();
        let err = detector.start(|_| {}).unwrap_err();
        assert!(matches!(err, WakeError::AlreadyListening));

        detector.stop();
    }

    #[test]
    fn restart_after_stop_uses_a_fresh_model() {
        // Model fires at its 2nd frame; each start must get a fresh counter,
        // so a restart fires again rather than carrying over state.
        let make_source = || Arc::new(ScriptedSource::new(blocks(4, 4)));

        let mut detector = WakeWordDetector::new(make_source(), factory(4, 2, 1));
        let (tx, rx) = std_mpsc::channel();
        let tx2 = tx.clone();
        detector.start(move |k| tx.send(k).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        detector.stop();

        // Second cycle on a new detector over the same factory.
        let mut detector = WakeWordDetector::new(make_source(), factory(4, 2, 1));
        detector.start(move |k| tx2.send(k).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        detector.stop();
    }

    #[test]
    fn failing_factory_propagates_model_init_error() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let factory: ModelFactory =
            Box::new(|| Err(WakeError::ModelInit("no model file".into())));
        let mut detector = WakeWordDetector::new(source, factory);

        let err = detector.start(|_| {}).unwrap_err();
        assert!(matches!(err, WakeError::ModelInit(_)));
        assert!(!detector.is_listening());
    }
}
