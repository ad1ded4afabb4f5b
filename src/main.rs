//! Application entry point — voice-diary capture service.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Load the Whisper model once; sessions share the context.
//! 5. Build the collaborators: JSONL persistence sink, log status sink,
//!    no-op power lease.
//! 6. Hand the supervisor a session factory that assembles a fresh
//!    detector + engine + session per cycle.
//! 7. Run until Ctrl-C, then shut the supervisor down cleanly.

use std::sync::Arc;

use anyhow::Context;

use voice_diary::{
    audio::{AudioSource, MicSource},
    config::{AppConfig, AppPaths},
    session::{CaptureSession, SessionEvent},
    sink::{JsonlSink, LogStatusSink, NoopPowerLease, PersistenceSink, PowerLease, StatusSink},
    supervisor::SessionSupervisor,
    transcribe::WhisperStreamEngine,
    wake::{detector::ModelFactory, EnergyGateModel, WakeModel, WakeWordDetector},
};

use whisper_rs::{WhisperContext, WhisperContextParameters};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-diary starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 workers — timers/persistence are light; inference
    //    runs on its own dedicated thread)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Whisper model — loaded once, shared across session rebuilds
    let paths = AppPaths::new();
    let model_path = paths.models_dir.join(format!("{}.bin", config.engine.model));
    let ctx = WhisperContext::new_with_params(
        model_path
            .to_str()
            .context("model path contains non-UTF-8 characters")?,
        WhisperContextParameters::default(),
    )
    .map(Arc::new)
    .with_context(|| {
        format!(
            "could not load Whisper model at {} — download a GGML model there first",
            model_path.display()
        )
    })?;
    log::info!("Whisper model loaded: {}", model_path.display());

    // 5. Collaborators
    let persistence: Arc<dyn PersistenceSink> = Arc::new(JsonlSink::new(paths.entries_file));
    let status: Arc<dyn StatusSink> = Arc::new(LogStatusSink);
    let power: Arc<dyn PowerLease> = Arc::new(NoopPowerLease::new());
    let source: Arc<dyn AudioSource> = Arc::new(MicSource::new(config.audio.clone()));

    // 6. Session factory — everything per-cycle is rebuilt from scratch
    let factory = {
        let config = config.clone();
        let persistence = Arc::clone(&persistence);
        let status = Arc::clone(&status);
        Box::new(move || {
            let model_factory: ModelFactory = {
                let audio = config.audio.clone();
                Box::new(move || {
                    Ok(Box::new(EnergyGateModel::with_defaults(
                        audio.frame_len,
                        audio.voice_threshold,
                    )) as Box<dyn WakeModel>)
                })
            };
            let detector = WakeWordDetector::new(Arc::clone(&source), model_factory);

            // The channel is created before the engine so the engine's
            // level feedback can be wired onto the session's control path.
            let (events_tx, events_rx) = CaptureSession::channel();

            let level_tx = events_tx.clone();
            let engine = WhisperStreamEngine::from_context(
                Arc::clone(&ctx),
                Arc::clone(&source),
                config.engine.clone(),
                config.audio.clone(),
            )
            .with_level_hook(move |level| {
                // Best-effort: drop level updates under backpressure.
                let _ = level_tx.try_send(SessionEvent::Level(level));
            });

            CaptureSession::with_channel(
                config.capture.clone(),
                detector,
                Box::new(engine),
                Arc::clone(&persistence),
                Arc::clone(&status),
                events_tx,
                events_rx,
            )
        })
    };

    let (supervisor, handle) = SessionSupervisor::new(factory, config.supervisor.clone(), power);

    // 7. Run until Ctrl-C
    rt.block_on(async move {
        let supervisor_task = tokio::spawn(supervisor.run());

        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Ctrl-C received, shutting down"),
            Err(e) => log::error!("failed to listen for shutdown signal: {e}"),
        }

        handle.shutdown();
        let _ = supervisor_task.await;
    });

    log::info!("voice-diary stopped");
    Ok(())
}
