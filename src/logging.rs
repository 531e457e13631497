//! File-based logging for the bridge.
//!
//! All diagnostic detail (download URLs, byte counts, error bodies) goes to
//! a log file under the storage root, never to the status indicator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Returns the log directory under the storage root.
#[must_use]
pub fn log_directory(storage_root: &Path) -> PathBuf {
    storage_root.join("logs")
}

/// Returns the current log file path, one file per day.
#[must_use]
pub fn current_log_path(storage_root: &Path) -> PathBuf {
    let now = chrono::Local::now();
    log_directory(storage_root).join(format!("bridge-{}.log", now.format("%Y-%m-%d")))
}

/// Path of the active session's server output log (the "output channel").
#[must_use]
pub fn server_output_path(storage_root: &Path) -> PathBuf {
    log_directory(storage_root).join("marksman-server.log")
}

/// Initializes the tracing subscriber writing to the bridge log file.
///
/// `RUST_LOG` overrides the configured level. Returns the path of the
/// active log file.
pub fn init(storage_root: &Path, level: &str) -> std::io::Result<PathBuf> {
    let dir = log_directory(storage_root);
    fs::create_dir_all(&dir)?;

    let path = current_log_path(storage_root);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_paths_live_under_storage_root() {
        let root = Path::new("/tmp/bridge-test");
        assert!(current_log_path(root).starts_with(root.join("logs")));
        assert!(server_output_path(root).starts_with(root.join("logs")));
    }
}
