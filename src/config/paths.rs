//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-diary\
//!   macOS:   ~/Library/Application Support/voice-diary/
//!   Linux:   ~/.config/voice-diary/
//!
//! Data dir (models + saved entries):
//!   Windows: %LOCALAPPDATA%\voice-diary\
//!   macOS:   ~/Library/Application Support/voice-diary/
//!   Linux:   ~/.local/share/voice-diary/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for downloaded GGML model files.
    pub models_dir: PathBuf,
    /// Full path to `entries.jsonl` (the default persistence sink file).
    pub entries_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-diary";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let models_dir = data_dir.join("models");
        let entries_file = data_dir.join("entries.jsonl");

        Self {
            config_dir,
            settings_file,
            models_dir,
            entries_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .entries_file
            .file_name()
            .is_some_and(|n| n == "entries.jsonl"));
    }
}
