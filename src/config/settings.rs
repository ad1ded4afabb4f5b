//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//!
//! Durations are stored as millisecond integers so tests can shrink them to
//! single-digit values without floating-point comparisons.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for the capture session state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Trigger phrases the wake-word model listens for.  The detected
    /// keyword index maps into this list.
    pub trigger_phrases: Vec<String>,
    /// Spoken phrase that ends a diary entry.
    pub end_phrase: String,
    /// Hard ceiling on a single recording; the session finalizes when it
    /// elapses.
    pub max_recording_ms: u64,
    /// Recording finalizes after this much continuous silence.
    pub silence_timeout_ms: u64,
    /// Delay between the trigger and starting the recognizer, giving the
    /// speaker a moment to begin.
    pub prep_delay_ms: u64,
    /// Transient recognizer failures tolerated before escalating.
    pub max_retries: u32,
    /// Delay before restarting the recognizer after a transient failure.
    pub retry_delay_ms: u64,
    /// Transcript texts at or below this trimmed length are ignored.
    pub min_text_len: usize,
    /// How long the "entry saved" status lingers before the next cycle.
    pub save_dwell_ms: u64,
    /// How long the "nothing recorded" status lingers before the next cycle.
    pub empty_dwell_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            trigger_phrases: vec!["dear diary".into()],
            end_phrase: "that's it".into(),
            max_recording_ms: 300_000, // 5 minutes
            silence_timeout_ms: 10_000,
            prep_delay_ms: 3_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            min_text_len: 3,
            save_dwell_ms: 3_000,
            empty_dwell_ms: 2_000,
        }
    }
}

impl CaptureConfig {
    pub fn max_recording(&self) -> Duration {
        Duration::from_millis(self.max_recording_ms)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    pub fn prep_delay(&self) -> Duration {
        Duration::from_millis(self.prep_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn save_dwell(&self) -> Duration {
        Duration::from_millis(self.save_dwell_ms)
    }

    pub fn empty_dwell(&self) -> Duration {
        Duration::from_millis(self.empty_dwell_ms)
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture and energy-based voice detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate in Hz fed to the recognizer (must be 16 000).
    pub sample_rate: u32,
    /// Samples per [`crate::audio::AudioFrame`] delivered by the source.
    pub frame_len: usize,
    /// RMS threshold in `[0.0, 1.0]`; frames above it count as voiced.
    pub voice_threshold: f32,
    /// Audio input device name — `None` means the system default.
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_len: 512, // 32 ms at 16 kHz
            voice_threshold: 0.015,
            input_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Settings for the streaming Whisper transcription engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// GGML model name / file stem (e.g. `"ggml-base.en"`).
    pub model: String,
    /// Primary speech language as an ISO-639-1 code, or `"auto"` for
    /// Whisper's built-in language detection.
    pub language: String,
    /// Silence gap that closes the current utterance and produces a
    /// `Final` event.
    pub utterance_gap_ms: u64,
    /// Interval between `Partial` decodes of the open utterance.
    pub partial_interval_ms: u64,
    /// `EndOfSpeech` is emitted when no voiced frame is seen for this long
    /// after the recognizer starts.
    pub no_speech_window_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "ggml-base.en".into(),
            language: "en".into(),
            utterance_gap_ms: 800,
            partial_interval_ms: 2_000,
            no_speech_window_ms: 15_000,
        }
    }
}

impl EngineConfig {
    pub fn utterance_gap(&self) -> Duration {
        Duration::from_millis(self.utterance_gap_ms)
    }

    pub fn partial_interval(&self) -> Duration {
        Duration::from_millis(self.partial_interval_ms)
    }

    pub fn no_speech_window(&self) -> Duration {
        Duration::from_millis(self.no_speech_window_ms)
    }
}

// ---------------------------------------------------------------------------
// SupervisorConfig
// ---------------------------------------------------------------------------

/// Settings for the session supervisor's restart policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Delay before a fresh session is constructed after a normal cycle.
    pub restart_delay_ms: u64,
    /// Delay before a fresh session is constructed after a session error.
    /// Must be nonzero so a permanently broken device never busy-loops.
    pub error_backoff_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: 1_000,
            error_backoff_ms: 5_000,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_diary::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capture session state-machine settings.
    pub capture: CaptureConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Streaming transcription engine settings.
    pub engine: EngineConfig,
    /// Supervisor restart policy.
    pub supervisor: SupervisorConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Verify that a default `AppConfig` can be serialised to TOML and
    /// deserialised back without any data loss.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        // CaptureConfig
        assert_eq!(original.capture.trigger_phrases, loaded.capture.trigger_phrases);
        assert_eq!(original.capture.end_phrase, loaded.capture.end_phrase);
        assert_eq!(original.capture.max_recording_ms, loaded.capture.max_recording_ms);
        assert_eq!(original.capture.silence_timeout_ms, loaded.capture.silence_timeout_ms);
        assert_eq!(original.capture.max_retries, loaded.capture.max_retries);

        // AudioConfig
        assert_eq!(original.audio.sample_rate, loaded.audio.sample_rate);
        assert_eq!(original.audio.frame_len, loaded.audio.frame_len);
        assert_eq!(original.audio.input_device, loaded.audio.input_device);

        // EngineConfig
        assert_eq!(original.engine.model, loaded.engine.model);
        assert_eq!(original.engine.language, loaded.engine.language);
        assert_eq!(original.engine.utterance_gap_ms, loaded.engine.utterance_gap_ms);

        // SupervisorConfig
        assert_eq!(original.supervisor.restart_delay_ms, loaded.supervisor.restart_delay_ms);
        assert_eq!(original.supervisor.error_backoff_ms, loaded.supervisor.error_backoff_ms);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        let default = AppConfig::default();

        assert_eq!(config.capture.end_phrase, default.capture.end_phrase);
        assert_eq!(config.audio.sample_rate, default.audio.sample_rate);
        assert_eq!(config.engine.model, default.engine.model);
    }

    /// Verify default values match the reference capture policy.
    #[test]
    fn default_values_match_reference_policy() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.capture.trigger_phrases, vec!["dear diary".to_string()]);
        assert_eq!(cfg.capture.end_phrase, "that's it");
        assert_eq!(cfg.capture.max_recording_ms, 300_000);
        assert_eq!(cfg.capture.silence_timeout_ms, 10_000);
        assert_eq!(cfg.capture.prep_delay_ms, 3_000);
        assert_eq!(cfg.capture.max_retries, 3);
        assert_eq!(cfg.capture.retry_delay_ms, 1_000);
        assert_eq!(cfg.capture.min_text_len, 3);
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert_eq!(cfg.supervisor.error_backoff_ms, 5_000);
        assert!(cfg.supervisor.error_backoff_ms > 0);
    }

    /// Verify that modified non-default values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.capture.trigger_phrases = vec!["computer".into(), "journal".into()];
        cfg.capture.end_phrase = "the end".into();
        cfg.capture.silence_timeout_ms = 5_000;
        cfg.engine.language = "de".into();
        cfg.audio.input_device = Some("USB Microphone".into());

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(
            loaded.capture.trigger_phrases,
            vec!["computer".to_string(), "journal".to_string()]
        );
        assert_eq!(loaded.capture.end_phrase, "the end");
        assert_eq!(loaded.capture.silence_timeout_ms, 5_000);
        assert_eq!(loaded.engine.language, "de");
        assert_eq!(loaded.audio.input_device, Some("USB Microphone".into()));
    }

    /// Millisecond accessors convert to `Duration` correctly.
    #[test]
    fn duration_accessors() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.max_recording(), Duration::from_secs(300));
        assert_eq!(cfg.silence_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.prep_delay(), Duration::from_secs(3));
        assert_eq!(cfg.retry_delay(), Duration::from_secs(1));
    }
}
