//! The capture session state machine.
//!
//! # Event model
//!
//! Everything that can influence a session — the wake-word trigger,
//! transcript events, timer fires, level updates — is converted into a
//! [`SessionEvent`] and sent over one mpsc channel.  [`CaptureSession::run`]
//! drains that channel; state and draft are touched nowhere else, so no
//! mutation ever races another.
//!
//! # Timers
//!
//! Three timers exist only while `Recording`: the maximum-recording
//! deadline, a silence ticker polling the last-activity timestamp, and the
//! short preparatory delay before the recognizer starts.  Each spawned
//! timer task carries the `epoch` current at spawn time; a fire whose epoch
//! no longer matches (or that arrives outside `Recording`) is discarded at
//! fire time, which closes the race between cancellation and an in-flight
//! fire.
//!
//! # Retries
//!
//! Transient recognizer failures restart the attempt after a short delay
//! without touching the draft, bounded by [`RetryBudget`].  A completed
//! attempt with zero accumulated content is retried once before the session
//! gives up and resets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::audio::level_bars;
use crate::config::CaptureConfig;
use crate::sink::{PersistenceSink, StatusSink};
use crate::transcribe::{TranscriptEvent, TranscriptionEngine};
use crate::wake::WakeWordDetector;

use super::draft::{DiaryDraft, MergeOutcome};
use super::retry::RetryBudget;
use super::SessionState;

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// An event delivered onto the session's serialized control path.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The wake-word detector recognized trigger phrase `keyword`.
    Trigger(usize),
    /// A transcript event from the active recognition attempt.
    Transcript(TranscriptEvent),
    /// Normalized audio level from the engine's capture path.
    Level(f32),
    /// The preparatory start delay elapsed.
    PrepElapsed { epoch: u64 },
    /// Periodic silence-check tick.
    SilenceTick { epoch: u64 },
    /// The maximum-recording deadline elapsed.
    MaxDurationElapsed { epoch: u64 },
    /// The inter-retry delay elapsed; start the next recognition attempt.
    RetryDelayElapsed { epoch: u64 },
}

// ---------------------------------------------------------------------------
// SessionOutcome
// ---------------------------------------------------------------------------

/// How a session ended, reported to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// An entry was persisted.
    Saved,
    /// The cycle completed without content; nothing was persisted.
    Empty,
    /// An unrecoverable failure; the supervisor applies its error backoff.
    Failed,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// One end-to-end capture: trigger → record → transcribe → persist.
///
/// Construct with [`CaptureSession::new`] and drive with
/// [`run`](CaptureSession::run); the future resolves with a
/// [`SessionOutcome`] once the cycle ends.  Dropping the session at any
/// point stops the detector and the engine and releases the audio device.
pub struct CaptureSession {
    config: CaptureConfig,
    detector: WakeWordDetector,
    engine: Box<dyn TranscriptionEngine>,
    persistence: Arc<dyn PersistenceSink>,
    status: Arc<dyn StatusSink>,

    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,

    state: SessionState,
    draft: DiaryDraft,
    retry: RetryBudget,
    /// Bumped on every transition into or out of `Recording`; timer events
    /// from earlier epochs are discarded at fire time.
    epoch: u64,
    last_activity: Instant,
    no_speech_retried: bool,
    last_level_update: Option<Instant>,

    timers: Vec<tokio::task::JoinHandle<()>>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(
        config: CaptureConfig,
        detector: WakeWordDetector,
        engine: Box<dyn TranscriptionEngine>,
        persistence: Arc<dyn PersistenceSink>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let (events_tx, events_rx) = Self::channel();
        Self::with_channel(
            config,
            detector,
            engine,
            persistence,
            status,
            events_tx,
            events_rx,
        )
    }

    /// Create the session's event channel up front.
    ///
    /// Useful when a collaborator built *before* the session needs a handle
    /// onto the control path — e.g. wiring the engine's level hook.
    pub fn channel() -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
        mpsc::channel(64)
    }

    /// Like [`new`](Self::new), but over a channel pair from
    /// [`channel`](Self::channel).
    pub fn with_channel(
        config: CaptureConfig,
        detector: WakeWordDetector,
        engine: Box<dyn TranscriptionEngine>,
        persistence: Arc<dyn PersistenceSink>,
        status: Arc<dyn StatusSink>,
        events_tx: mpsc::Sender<SessionEvent>,
        events_rx: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            config,
            detector,
            engine,
            persistence,
            status,
            events_tx,
            events_rx,
            state: SessionState::Idle,
            draft: DiaryDraft::new(),
            retry: RetryBudget::new(0),
            epoch: 0,
            last_activity: Instant::now(),
            no_speech_retried: false,
            last_level_update: None,
            timers: Vec::new(),
            forwarder: None,
        }
    }

    /// A handle for injecting [`SessionEvent`]s from outside the session
    /// (engine level hooks, tests).
    pub fn sender(&self) -> mpsc::Sender<SessionEvent> {
        self.events_tx.clone()
    }

    /// Current state (exposed for the supervisor's logging).
    pub fn state(&self) -> SessionState {
        self.state
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Drive the session to completion.
    ///
    /// Starts wake-word detection, then serializes every delivered event
    /// through the state machine until a terminal outcome is reached.
    pub async fn run(mut self) -> SessionOutcome {
        if let Err(e) = self.enter_listening() {
            log::error!("session: failed to start wake-word detection: {e}");
            return self.fail();
        }

        loop {
            let Some(event) = self.events_rx.recv().await else {
                // The session holds its own sender, so this cannot happen
                // outside teardown.
                return SessionOutcome::Failed;
            };
            if let Some(outcome) = self.handle_event(event).await {
                return outcome;
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Option<SessionOutcome> {
        match event {
            SessionEvent::Trigger(keyword) => {
                self.on_trigger(keyword);
                None
            }
            SessionEvent::Transcript(te) => self.on_transcript(te).await,
            SessionEvent::Level(level) => {
                self.on_level(level);
                None
            }
            SessionEvent::PrepElapsed { epoch } => {
                if self.timer_is_stale(epoch) {
                    return None;
                }
                self.start_attempt().await
            }
            SessionEvent::SilenceTick { epoch } => {
                if self.timer_is_stale(epoch) {
                    return None;
                }
                if self.last_activity.elapsed() >= self.config.silence_timeout() {
                    log::info!("session: silence timeout reached");
                    return Some(self.finalize("silence timeout").await);
                }
                None
            }
            SessionEvent::MaxDurationElapsed { epoch } => {
                if self.timer_is_stale(epoch) {
                    return None;
                }
                log::info!("session: maximum recording length reached");
                Some(self.finalize("maximum recording length").await)
            }
            SessionEvent::RetryDelayElapsed { epoch } => {
                if self.timer_is_stale(epoch) {
                    return None;
                }
                self.start_attempt().await
            }
        }
    }

    /// A timer fire is stale when the session has left `Recording` or the
    /// timer belongs to an earlier recording epoch.
    fn timer_is_stale(&self, epoch: u64) -> bool {
        self.state != SessionState::Recording || epoch != self.epoch
    }

    // -----------------------------------------------------------------------
    // ListeningForTrigger
    // -----------------------------------------------------------------------

    fn enter_listening(&mut self) -> Result<(), crate::wake::WakeError> {
        self.state = SessionState::ListeningForTrigger;
        self.push_status("Listening for the trigger phrase…");

        let tx = self.events_tx.clone();
        self.detector.start(move |keyword| {
            // Runs on the detector's own thread — blocking_send is the
            // correct bridge onto the control path.
            let _ = tx.blocking_send(SessionEvent::Trigger(keyword));
        })
    }

    fn on_trigger(&mut self, keyword: usize) {
        if self.state != SessionState::ListeningForTrigger {
            log::debug!("session: ignoring trigger in state {:?}", self.state);
            return;
        }

        let phrase = self
            .config
            .trigger_phrases
            .get(keyword)
            .map(String::as_str)
            .unwrap_or("unknown");
        log::info!("session: trigger phrase detected ({phrase})");

        // The detector must fully release the device before the engine may
        // acquire it.
        self.detector.stop();

        self.draft.clear();
        self.retry = RetryBudget::new(self.config.max_retries);
        self.no_speech_retried = false;
        self.state = SessionState::Recording;
        self.epoch += 1;
        self.last_activity = Instant::now();

        self.push_status(&format!(
            "Recording — say \"{}\" when you're done",
            self.config.end_phrase
        ));

        self.spawn_recording_timers();
    }

    fn spawn_recording_timers(&mut self) {
        let epoch = self.epoch;

        // Maximum-recording deadline.
        let tx = self.events_tx.clone();
        let max = self.config.max_recording();
        self.timers.push(tokio::spawn(async move {
            sleep(max).await;
            let _ = tx.send(SessionEvent::MaxDurationElapsed { epoch }).await;
        }));

        // Silence ticker: polls last activity rather than re-arming a
        // one-shot on every transcript event.
        let tx = self.events_tx.clone();
        let tick = (self.config.silence_timeout() / 4)
            .clamp(Duration::from_millis(10), Duration::from_secs(1));
        self.timers.push(tokio::spawn(async move {
            loop {
                sleep(tick).await;
                if tx.send(SessionEvent::SilenceTick { epoch }).await.is_err() {
                    break;
                }
            }
        }));

        // Preparatory delay before the recognizer starts, so the speaker
        // has a moment to begin.
        let tx = self.events_tx.clone();
        let prep = self.config.prep_delay();
        self.timers.push(tokio::spawn(async move {
            sleep(prep).await;
            let _ = tx.send(SessionEvent::PrepElapsed { epoch }).await;
        }));
    }

    // -----------------------------------------------------------------------
    // Recording — recognition attempts
    // -----------------------------------------------------------------------

    /// Start (or restart) a recognition attempt on the engine.
    async fn start_attempt(&mut self) -> Option<SessionOutcome> {
        let (transcript_tx, mut transcript_rx) = mpsc::channel(32);

        if self.engine.start(transcript_tx) {
            // Forward engine events onto the control path.  The previous
            // forwarder (if any) died with its attempt's sender.
            if let Some(old) = self.forwarder.take() {
                old.abort();
            }
            let tx = self.events_tx.clone();
            self.forwarder = Some(tokio::spawn(async move {
                while let Some(te) = transcript_rx.recv().await {
                    if tx.send(SessionEvent::Transcript(te)).await.is_err() {
                        break;
                    }
                }
            }));
            None
        } else {
            // Startup refusal is retryable, not session-fatal — unless the
            // budget is gone, in which case the session cannot initialize.
            log::warn!("session: recognizer unavailable at attempt start");
            if !self.retry.record_failure() {
                self.schedule_retry();
                None
            } else {
                log::error!("session: recognizer failed to start after retries");
                Some(self.fail())
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.push_status("Having trouble hearing — retrying…");
        let tx = self.events_tx.clone();
        let epoch = self.epoch;
        let delay = self.config.retry_delay();
        self.timers.push(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(SessionEvent::RetryDelayElapsed { epoch }).await;
        }));
    }

    // -----------------------------------------------------------------------
    // Recording — transcript events
    // -----------------------------------------------------------------------

    async fn on_transcript(&mut self, event: TranscriptEvent) -> Option<SessionOutcome> {
        if self.state != SessionState::Recording {
            log::debug!("session: ignoring transcript event in state {:?}", self.state);
            return None;
        }

        match event {
            TranscriptEvent::Partial { text, .. } => self.on_text(&text, true).await,
            TranscriptEvent::Final { text, .. } => self.on_text(&text, false).await,
            TranscriptEvent::EndOfSpeech => self.on_attempt_complete().await,
            TranscriptEvent::Error(kind) => self.on_engine_error(kind).await,
        }
    }

    async fn on_text(&mut self, text: &str, is_partial: bool) -> Option<SessionOutcome> {
        if text.trim().is_empty() {
            return None;
        }

        log::debug!(
            "session: {} result: {text:?}",
            if is_partial { "partial" } else { "final" }
        );

        self.last_activity = Instant::now();
        // Speech reached us — this attempt is healthy, so consecutive
        // failures start counting from zero again.
        self.retry.reset();

        let end_phrase = self.config.end_phrase.clone();
        let min_len = self.config.min_text_len;
        let merged = if is_partial {
            self.draft.apply_partial(text, &end_phrase, min_len)
        } else {
            self.draft.apply_final(text, &end_phrase, min_len)
        };

        match merged {
            MergeOutcome::EndPhrase => {
                log::info!("session: end phrase detected");
                Some(self.finalize("end phrase").await)
            }
            MergeOutcome::Updated => {
                if is_partial {
                    self.push_status(&format!(
                        "\"{}…\" — say \"{}\" to finish",
                        text.trim(),
                        end_phrase
                    ));
                } else {
                    self.push_status(&format!(
                        "Noted: \"{}\" — keep going or say \"{}\"",
                        text.trim(),
                        end_phrase
                    ));
                }
                None
            }
            MergeOutcome::Ignored => None,
        }
    }

    /// The recognition attempt completed on its own (`EndOfSpeech`).
    async fn on_attempt_complete(&mut self) -> Option<SessionOutcome> {
        if !self.draft.is_empty() {
            return Some(self.finalize("recording complete").await);
        }

        if !self.no_speech_retried {
            // One fresh attempt before giving up on an empty recording.
            self.no_speech_retried = true;
            log::info!("session: no speech captured, retrying recognition once");
            self.engine.stop();
            self.push_status("No speech detected — listening again, speak now");
            self.schedule_retry();
            return None;
        }

        log::info!("session: still no speech after retry, resetting");
        Some(self.reset_empty().await)
    }

    async fn on_engine_error(
        &mut self,
        kind: crate::transcribe::EngineErrorKind,
    ) -> Option<SessionOutcome> {
        if kind.is_transient() {
            log::warn!("session: transient recognizer error: {kind}");
            self.engine.stop();
            if !self.retry.record_failure() {
                self.schedule_retry();
                return None;
            }

            log::warn!("session: retry budget exhausted");
            if !self.draft.is_empty() {
                return Some(self.finalize("recognition kept failing").await);
            }
            return Some(self.reset_empty().await);
        }

        log::error!("session: fatal recognizer error: {kind}");
        if !self.draft.is_empty() {
            Some(self.finalize("recognizer failed").await)
        } else {
            Some(self.fail())
        }
    }

    fn on_level(&mut self, level: f32) {
        if self.state != SessionState::Recording || level <= 0.1 {
            return;
        }
        // Throttle so the status sink is not spammed at frame rate.
        if self
            .last_level_update
            .is_some_and(|at| at.elapsed() < Duration::from_millis(500))
        {
            return;
        }
        self.last_level_update = Some(Instant::now());
        self.push_status(&format!(
            "Recording {} — say \"{}\" when you're done",
            level_bars(level),
            self.config.end_phrase
        ));
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    /// `Recording → Finalizing → Idle`: persist the draft (if any) and
    /// dwell so the user sees the outcome before the next cycle.
    async fn finalize(&mut self, reason: &str) -> SessionOutcome {
        log::info!("session: finalizing ({reason})");
        self.state = SessionState::Finalizing;
        self.cancel_timers();
        self.engine.stop();

        let text = self.draft.take().trim().to_string();

        let outcome = if text.is_empty() {
            self.push_status("Nothing was captured");
            sleep(self.config.empty_dwell()).await;
            SessionOutcome::Empty
        } else {
            self.push_status("Saving your entry…");
            match self.persistence.save(&text).await {
                Ok(()) => {
                    log::info!("session: entry saved ({} chars)", text.len());
                    self.push_status(&format!("Entry saved: \"{}\"", preview(&text)));
                    sleep(self.config.save_dwell()).await;
                    SessionOutcome::Saved
                }
                Err(e) => {
                    log::error!("session: failed to persist entry: {e}");
                    self.push_status("Could not save the entry");
                    sleep(self.config.empty_dwell()).await;
                    SessionOutcome::Failed
                }
            }
        };

        self.state = SessionState::Idle;
        outcome
    }

    /// Reset after a cycle that produced nothing worth saving.
    async fn reset_empty(&mut self) -> SessionOutcome {
        self.cancel_timers();
        self.engine.stop();
        self.draft.clear();
        self.push_status("Nothing was captured");
        sleep(self.config.empty_dwell()).await;
        self.state = SessionState::Idle;
        SessionOutcome::Empty
    }

    /// Unrecoverable failure: release everything and let the supervisor
    /// rebuild after its backoff.  The user sees a generic message, never
    /// an internal error code.
    fn fail(&mut self) -> SessionOutcome {
        self.state = SessionState::Error;
        self.cancel_timers();
        self.engine.stop();
        self.detector.stop();
        self.push_status("Something went wrong — restarting shortly");
        SessionOutcome::Failed
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Abort all pending timers and invalidate their epoch so an already
    /// in-flight fire is discarded at delivery.
    fn cancel_timers(&mut self) {
        self.epoch += 1;
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    fn push_status(&self, message: &str) {
        self.status.update(message);
    }
}

impl Drop for CaptureSession {
    /// Idempotent teardown: cancel timers, stop the engine, stop the
    /// detector (releasing the audio device), in that order.
    fn drop(&mut self) {
        self.cancel_timers();
        self.engine.stop();
        self.detector.stop();
    }
}

/// First 50 characters of an entry for the save-confirmation status.
fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push('…');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
