//! Managed server downloads.
//!
//! Keeps a versioned cache of prebuilt Marksman binaries under the storage
//! root and streams down the compatible release when the cache is empty.
//! Presence of the cached file is the sole cache-hit signal; no checksum or
//! manifest is kept.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{COMPATIBLE_SERVER_RELEASE, RELEASE_BASE_URL};
use crate::host::{ProgressHandle, ProgressView};
use crate::platform::Platform;

/// Cache filesystem failures that abort a download attempt. Network-level
/// failures are not errors here; they are logged and surface as "no file".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cache I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Tracks integer download percentage, reporting only on increases.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    received: u64,
    reported: u32,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            received: 0,
            reported: 0,
        }
    }

    /// Records `bytes` more received bytes.
    ///
    /// Returns `(percent, increment)` when the integer percentage grew,
    /// `None` otherwise. Increments over a complete download sum to 100;
    /// a body running past the advertised length stays clamped at 100.
    pub fn advance(&mut self, bytes: u64) -> Option<(u32, u32)> {
        self.received += bytes;
        if self.total == 0 {
            return None;
        }

        let percent = ((self.received.saturating_mul(100) / self.total) as u32).min(100);
        if percent > self.reported {
            let increment = percent - self.reported;
            self.reported = percent;
            Some((percent, increment))
        } else {
            None
        }
    }
}

/// Downloads and caches the compatible server release.
pub struct Fetcher {
    storage_root: PathBuf,
    base_url: String,
    release: String,
    client: reqwest::Client,
}

impl Fetcher {
    /// Creates a fetcher for the compatible release under `storage_root`.
    #[must_use]
    pub fn new(storage_root: PathBuf) -> Self {
        Self::with_release(storage_root, RELEASE_BASE_URL, COMPATIBLE_SERVER_RELEASE)
    }

    /// Creates a fetcher pointed at a custom release location.
    #[must_use]
    pub fn with_release(storage_root: PathBuf, base_url: &str, release: &str) -> Self {
        Self {
            storage_root,
            base_url: base_url.trim_end_matches('/').to_string(),
            release: release.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Directory holding the cached binary for this release.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.storage_root.join(&self.release)
    }

    fn download_url(&self, platform: Platform) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.release,
            platform.release_asset_name()
        )
    }

    /// Ensures an executable copy of the compatible release exists locally.
    ///
    /// Returns the path of the cached binary, or `None` when the download
    /// could not produce one. An already cached binary skips network access
    /// entirely. Filesystem failures surface as [`FetchError`]; everything
    /// else is logged and mapped to `None`.
    pub async fn ensure_server(
        &self,
        platform: Platform,
        progress: &dyn ProgressView,
    ) -> Result<Option<PathBuf>, FetchError> {
        let target_dir = self.cache_dir();
        fs::create_dir_all(&target_dir).await?;

        let target_file = target_dir.join(platform.server_bin_name());
        if fs::try_exists(&target_file).await? {
            info!("server binary already cached at {}", target_file.display());
            return Ok(Some(target_file));
        }

        let mut handle =
            progress.begin(&format!("Downloading marksman {}", self.release));
        self.download_release(platform, &target_dir, &target_file, handle.as_mut())
            .await?;

        if fs::try_exists(&target_file).await? {
            Ok(Some(target_file))
        } else {
            error!("failed to download the marksman server binary");
            Ok(None)
        }
    }

    /// Streams the release asset into `target_file` via a randomized
    /// temporary name in the same directory, so a partial download never
    /// occupies the final path.
    async fn download_release(
        &self,
        platform: Platform,
        target_dir: &Path,
        target_file: &Path,
        progress: &mut dyn ProgressHandle,
    ) -> Result<(), FetchError> {
        let url = self.download_url(platform);
        let temp_file = target_dir.join(Uuid::new_v4().simple().to_string());

        info!("downloading {} to {}", url, temp_file.display());
        let mut resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!("request to {} failed: {}", url, e);
                return Ok(());
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("download failed with {}: {}", status, body);
            return Ok(());
        }

        let total = match resp.content_length() {
            Some(len) if len > 0 => len,
            other => {
                error!("unexpected content-length: {:?}", other);
                return Ok(());
            }
        };
        info!("the size of the binary is {} bytes", total);

        let mut dest = fs::File::create(&temp_file).await?;
        let mut tracker = ProgressTracker::new(total);
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    dest.write_all(&chunk).await?;
                    if let Some((percent, increment)) = tracker.advance(chunk.len() as u64) {
                        progress.report(percent, increment);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // The leftover temp file never occupies the target path.
                    error!("download stream interrupted: {}", e);
                    return Ok(());
                }
            }
        }
        dest.flush().await?;
        drop(dest);

        fs::rename(&temp_file, target_file).await?;
        set_executable(target_file).await?;
        info!("downloaded the server binary to {}", target_file.display());
        Ok(())
    }
}

/// Marks the binary executable (mode 0755) on Unix; no-op elsewhere.
async fn set_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
