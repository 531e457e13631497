//! Platform tables for the Marksman server binary.
//!
//! Maps the current operating system to the name the server binary carries
//! locally (on PATH or in the cache) and to the name of the prebuilt asset
//! published for it.

use thiserror::Error;

/// No Marksman release exists for the current platform, so no fallback is
/// possible. This is a configuration-time impossibility and is raised, not
/// swallowed.
#[derive(Debug, Error)]
#[error("unsupported platform: {0}")]
pub struct UnsupportedPlatform(pub &'static str);

/// Operating systems with published Marksman release assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detects the platform the bridge is running on.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        if cfg!(target_os = "windows") {
            Ok(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Ok(Self::MacOs)
        } else if cfg!(target_os = "linux") {
            Ok(Self::Linux)
        } else {
            Err(UnsupportedPlatform(std::env::consts::OS))
        }
    }

    /// Name of the server binary as it appears locally.
    #[must_use]
    pub const fn server_bin_name(self) -> &'static str {
        match self {
            Self::Windows => "marksman.exe",
            Self::MacOs | Self::Linux => "marksman",
        }
    }

    /// Name of the release asset published for this platform.
    #[must_use]
    pub const fn release_asset_name(self) -> &'static str {
        match self {
            Self::Windows => "marksman-windows.exe",
            Self::MacOs => "marksman-macos",
            Self::Linux => "marksman-linux",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_names() {
        assert_eq!(Platform::Windows.release_asset_name(), "marksman-windows.exe");
        assert_eq!(Platform::MacOs.release_asset_name(), "marksman-macos");
        assert_eq!(Platform::Linux.release_asset_name(), "marksman-linux");
    }

    #[test]
    fn test_bin_names() {
        assert_eq!(Platform::Windows.server_bin_name(), "marksman.exe");
        assert_eq!(Platform::MacOs.server_bin_name(), "marksman");
        assert_eq!(Platform::Linux.server_bin_name(), "marksman");
    }

    #[test]
    fn test_current_platform_is_supported() {
        // The crate only builds on the three supported targets.
        assert!(Platform::current().is_ok());
    }
}
