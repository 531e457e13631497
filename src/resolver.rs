//! Server binary resolution.
//!
//! Decides which executable to run, trying sources in a fixed priority
//! order: explicit configuration, PATH lookup, managed download. The first
//! source that yields a command wins and later sources are never consulted.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info};

use crate::config::Settings;
use crate::fetcher::Fetcher;
use crate::host::ProgressView;
use crate::platform::{Platform, UnsupportedPlatform};

/// How to spawn the server process. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Executable path or bare command name.
    pub command: PathBuf,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Working directory for the spawned process.
    pub cwd: Option<PathBuf>,
}

impl ServerSpec {
    /// Spec that runs `command` with no arguments from the current directory.
    #[must_use]
    pub fn bare(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
        }
    }
}

/// Errors that abort resolution outright instead of falling through.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    UnsupportedPlatform(#[from] UnsupportedPlatform),
}

/// Picks the server executable for the current platform.
pub struct Resolver {
    settings: Settings,
    platform: Platform,
    search_path: Option<OsString>,
}

impl Resolver {
    /// Creates a resolver for the current platform.
    pub fn new(settings: Settings) -> Result<Self, ResolveError> {
        Ok(Self {
            settings,
            platform: Platform::current()?,
            search_path: None,
        })
    }

    /// Resolver that searches `search_path` instead of the process PATH.
    pub fn with_search_path(
        settings: Settings,
        search_path: impl Into<OsString>,
    ) -> Result<Self, ResolveError> {
        let mut resolver = Self::new(settings)?;
        resolver.search_path = Some(search_path.into());
        Ok(resolver)
    }

    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Resolves the server spec; returns `None` when no source produced a
    /// usable binary. Deterministic given fixed configuration, PATH and
    /// cache state.
    pub async fn resolve(
        &self,
        fetcher: &Fetcher,
        progress: &dyn ProgressView,
    ) -> Option<ServerSpec> {
        if let Some(spec) = self.from_settings() {
            info!("using configured server command {}", spec.command.display());
            return Some(spec);
        }

        if let Some(path) = self.find_in_path() {
            info!(
                "found {} on PATH at {}",
                self.platform.server_bin_name(),
                path.display()
            );
            return Some(ServerSpec::bare(path));
        }

        match fetcher.ensure_server(self.platform, progress).await {
            Ok(Some(path)) => Some(ServerSpec::bare(path)),
            Ok(None) => None,
            Err(e) => {
                error!("managed download failed: {}", e);
                None
            }
        }
    }

    /// Spec from the configured custom command, split on whitespace.
    fn from_settings(&self) -> Option<ServerSpec> {
        let raw = self.settings.custom_command.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        let mut parts = raw.split_whitespace();
        let command = PathBuf::from(parts.next()?);
        let args = parts.map(str::to_string).collect();
        Some(ServerSpec {
            command,
            args,
            cwd: self.settings.custom_command_dir.clone(),
        })
    }

    /// Locates the server binary on PATH.
    ///
    /// "Not found" and "lookup failed" both collapse into absence; callers
    /// cannot tell them apart and fall through to the next source.
    fn find_in_path(&self) -> Option<PathBuf> {
        let bin = self.platform.server_bin_name();
        match &self.search_path {
            Some(paths) => {
                which::which_in(bin, Some(paths), std::env::current_dir().ok()?).ok()
            }
            None => which::which(bin).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(settings: Settings) -> Resolver {
        Resolver::new(settings).unwrap()
    }

    #[test]
    fn test_custom_command_splits_on_whitespace() {
        let resolver = resolver_with(Settings {
            custom_command: Some("foo --bar baz".to_string()),
            ..Settings::default()
        });

        let spec = resolver.from_settings().unwrap();
        assert_eq!(spec.command, PathBuf::from("foo"));
        assert_eq!(spec.args, vec!["--bar".to_string(), "baz".to_string()]);
        assert_eq!(spec.cwd, None);
    }

    #[test]
    fn test_custom_command_dir_attaches() {
        let resolver = resolver_with(Settings {
            custom_command: Some("marksman server".to_string()),
            custom_command_dir: Some(PathBuf::from("/srv/notes")),
            ..Settings::default()
        });

        let spec = resolver.from_settings().unwrap();
        assert_eq!(spec.cwd, Some(PathBuf::from("/srv/notes")));
    }

    #[test]
    fn test_unset_custom_command_yields_nothing() {
        let resolver = resolver_with(Settings::default());
        assert!(resolver.from_settings().is_none());

        let resolver = resolver_with(Settings {
            custom_command: Some("   ".to_string()),
            ..Settings::default()
        });
        assert!(resolver.from_settings().is_none());
    }

    #[test]
    fn test_empty_search_path_finds_nothing() {
        let resolver =
            Resolver::with_search_path(Settings::default(), OsString::new()).unwrap();
        assert!(resolver.find_in_path().is_none());
    }
}
