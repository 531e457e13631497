//! Bridge settings.
//!
//! Loaded from `settings.toml` under the storage root. Every field has a
//! default, so a missing settings file behaves like an empty one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Release tag the bridge downloads when no local server binary is found.
pub const COMPATIBLE_SERVER_RELEASE: &str = "2022-06-02";

/// Base URL the release assets are published under.
pub const RELEASE_BASE_URL: &str =
    "https://github.com/artempyanykh/marksman/releases/download";

/// User-facing bridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master kill switch, checked once at activation.
    pub enable: bool,

    /// Custom server command. Split on whitespace into a command and its
    /// arguments; quoted arguments with embedded spaces are not supported.
    pub custom_command: Option<String>,

    /// Working directory for the custom command.
    pub custom_command_dir: Option<PathBuf>,

    /// Log level for the bridge log file (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable: true,
            custom_command: None,
            custom_command_dir: None,
            log_level: crate::logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `settings.toml` under `storage_root`.
    ///
    /// A missing or unreadable file yields the defaults; a file that fails
    /// to parse is an error so typos are not silently ignored.
    pub fn load(storage_root: &Path) -> Result<Self, toml::de::Error> {
        let path = storage_root.join("settings.toml");
        match fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Default storage root for the binary cache, settings and logs.
#[must_use]
pub fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marksman-bridge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.enable);
        assert!(settings.custom_command.is_none());
        assert!(settings.custom_command_dir.is_none());
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_parse() {
        let settings: Settings = toml::from_str(
            r#"
            enable = false
            custom_command = "marksman server --verbose 3"
            custom_command_dir = "/tmp/notes"
            "#,
        )
        .unwrap();

        assert!(!settings.enable);
        assert_eq!(
            settings.custom_command.as_deref(),
            Some("marksman server --verbose 3")
        );
        assert_eq!(
            settings.custom_command_dir,
            Some(PathBuf::from("/tmp/notes"))
        );
        // Unspecified fields keep their defaults.
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert!(settings.enable);
    }
}
