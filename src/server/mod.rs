//! Session ownership and lifecycle.
//!
//! The controller owns the single live server session, drives the
//! connect / restart / stop transitions and keeps the status indicator in
//! sync with what the server reports. At most one server process is ever
//! associated with the bridge; restart fully stops the old session before a
//! new one is created.

pub mod client;
pub mod status;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub use client::{LspClient, SessionError, SessionEvent, StdioLauncher};
pub use status::{RunState, STATUS_NOTIFICATION, StatusPayload, project_status};

use crate::fetcher::Fetcher;
use crate::host::{ProgressView, StatusIndicator};
use crate::resolver::{Resolver, ServerSpec};

/// Scheme of the documents the host routes to the server.
pub const DOCUMENT_SCHEME: &str = "file";

/// Language id of the documents the host routes to the server.
pub const DOCUMENT_LANGUAGE: &str = "markdown";

/// Boxed future in the style used throughout the trait seams here.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by [`SessionLauncher::launch`].
pub type LaunchFuture = BoxFuture<'static, Result<Session, SessionError>>;

/// Launcher seam: production uses [`StdioLauncher`], tests substitute
/// scripted fakes.
pub trait SessionLauncher: Send + Sync {
    fn launch(&self, spec: &ServerSpec) -> LaunchFuture;
}

impl<T: SessionLauncher + ?Sized> SessionLauncher for Arc<T> {
    fn launch(&self, spec: &ServerSpec) -> LaunchFuture {
        (**self).launch(spec)
    }
}

/// Control half of a live session.
pub trait SessionHandle: Send {
    /// Stops the session, waiting for the process to be fully gone.
    fn stop(&mut self) -> BoxFuture<'_, ()>;

    /// Path of the session's diagnostic output log.
    fn output_path(&self) -> &Path;
}

/// A live client + process pair. Replaced, never mutated, on restart.
pub struct Session {
    pub handle: Box<dyn SessionHandle>,
    pub events: mpsc::Receiver<SessionEvent>,
}

struct ActiveSession {
    handle: Box<dyn SessionHandle>,
    watcher: JoinHandle<()>,
}

/// Owns the single active session and its observable lifecycle.
pub struct SessionController {
    resolver: Resolver,
    fetcher: Fetcher,
    launcher: Box<dyn SessionLauncher>,
    indicator: Arc<dyn StatusIndicator>,
    progress: Arc<dyn ProgressView>,
    current: Option<ActiveSession>,
}

impl SessionController {
    /// Creates a controller; no session exists until [`Self::connect`].
    #[must_use]
    pub fn new(
        resolver: Resolver,
        fetcher: Fetcher,
        launcher: Box<dyn SessionLauncher>,
        indicator: Arc<dyn StatusIndicator>,
        progress: Arc<dyn ProgressView>,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            launcher,
            indicator,
            progress,
            current: None,
        }
    }

    /// Resolves the server and starts a new session.
    ///
    /// Returns whether a session is now live. Resolution or start failure
    /// leaves the bridge loaded but inert: the indicator shows dead and no
    /// session is created.
    pub async fn connect(&mut self) -> bool {
        let spec = self
            .resolver
            .resolve(&self.fetcher, self.progress.as_ref())
            .await;
        let Some(spec) = spec else {
            error!(
                "couldn't find a {} server binary",
                self.resolver.platform().server_bin_name()
            );
            self.set_status(&StatusPayload::dead());
            return false;
        };

        match self.launcher.launch(&spec).await {
            Ok(session) => {
                let watcher = self.spawn_watcher(session.events);
                self.current = Some(ActiveSession {
                    handle: session.handle,
                    watcher,
                });
                true
            }
            Err(e) => {
                error!("failed to start the server: {}", e);
                self.set_status(&StatusPayload::dead());
                false
            }
        }
    }

    /// Stops the current session and connects a fresh one.
    ///
    /// The old session is fully stopped, and its watcher drained, before the
    /// new one is created; there are never two live sessions or two
    /// competing status subscriptions.
    pub async fn restart(&mut self) {
        self.stop_current().await;
        self.set_status(&StatusPayload::initial());
        self.connect().await;
    }

    /// Stops the current session if any. Safe to call repeatedly.
    pub async fn stop_current(&mut self) {
        if let Some(mut active) = self.current.take() {
            active.handle.stop().await;
            let _ = active.watcher.await;
        }
    }

    /// Whether a session is currently live.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.current.is_some()
    }

    /// Path of the active session's output log, if a session exists.
    #[must_use]
    pub fn output_path(&self) -> Option<PathBuf> {
        self.current
            .as_ref()
            .map(|active| active.handle.output_path().to_path_buf())
    }

    fn set_status(&self, payload: &StatusPayload) {
        self.indicator.set_text(&project_status(payload));
    }

    /// Watches one session's event stream, projecting status updates.
    ///
    /// A stopped process always wins over a stale "ok": once `Stopped` is
    /// seen the loop ends and later payloads are never applied.
    fn spawn_watcher(&self, mut events: mpsc::Receiver<SessionEvent>) -> JoinHandle<()> {
        let indicator = Arc::clone(&self.indicator);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Status(payload) => {
                        debug!("status update: {:?}", payload);
                        indicator.set_text(&project_status(&payload));
                    }
                    SessionEvent::Stopped => {
                        indicator.set_text(&project_status(&StatusPayload::dead()));
                        break;
                    }
                }
            }
        })
    }
}
