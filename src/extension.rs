//! Activation surface.
//!
//! Wires settings, resolver, fetcher and controller together behind the
//! host capability interfaces, and routes the two commands the bridge
//! exposes back into the controller.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::fetcher::Fetcher;
use crate::host::{CommandRegistry, ProgressView, StatusIndicator};
use crate::logging;
use crate::resolver::{ResolveError, Resolver};
use crate::server::{SessionController, StatusPayload, StdioLauncher, project_status};

/// Command id for tearing down and rebuilding the session.
pub const CMD_RESTART_SERVER: &str = "marksman.restartServer";

/// Command id for revealing the active session's output log.
pub const CMD_SHOW_OUTPUT: &str = "marksman.showOutputChannel";

/// The activated bridge. Owns the controller for its whole lifetime.
pub struct Extension {
    controller: SessionController,
    indicator: Arc<dyn StatusIndicator>,
}

/// Activates the bridge.
///
/// Checks the `enable` kill switch once, shows the indicator, resolves and
/// starts the server, and registers the command ids with the host.
/// Returns `None` when the bridge is disabled by configuration. A failed
/// resolution still activates: the bridge stays loaded but inert with the
/// indicator showing dead. Only an unsupported platform is fatal.
pub async fn activate(
    settings: Settings,
    storage_root: PathBuf,
    indicator: Arc<dyn StatusIndicator>,
    progress: Arc<dyn ProgressView>,
    registry: &mut dyn CommandRegistry,
) -> Result<Option<Extension>, ResolveError> {
    if !settings.enable {
        info!("marksman bridge disabled by configuration");
        return Ok(None);
    }

    indicator.set_text(&project_status(&StatusPayload::initial()));
    indicator.show();

    let resolver = Resolver::new(settings)?;
    let fetcher = Fetcher::new(storage_root.clone());

    let output_path = logging::server_output_path(&storage_root);
    if let Some(parent) = output_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("couldn't create log directory: {}", e);
        }
    }
    let launcher = Box::new(StdioLauncher::new(output_path));

    let mut controller = SessionController::new(
        resolver,
        fetcher,
        launcher,
        Arc::clone(&indicator),
        progress,
    );
    controller.connect().await;

    registry.register(CMD_RESTART_SERVER);
    registry.register(CMD_SHOW_OUTPUT);

    Ok(Some(Extension {
        controller,
        indicator,
    }))
}

impl Extension {
    /// Routes a host-dispatched command id. Unknown ids are logged and
    /// ignored.
    pub async fn dispatch(&mut self, command_id: &str) {
        match command_id {
            CMD_RESTART_SERVER => self.restart_server().await,
            CMD_SHOW_OUTPUT => self.show_output_channel(),
            other => warn!("unknown command: {}", other),
        }
    }

    /// Tears down the current session and builds a new one from scratch.
    pub async fn restart_server(&mut self) {
        self.controller.restart().await;
    }

    /// Reveals the active session's diagnostic log. No-op without a session.
    pub fn show_output_channel(&self) {
        match self.controller.output_path() {
            Some(path) => info!("server output log: {}", path.display()),
            None => debug!("no active session"),
        }
    }

    /// Stops the session and hides the indicator. Idempotent.
    pub async fn deactivate(&mut self) {
        self.controller.stop_current().await;
        self.indicator.hide();
    }

    /// Access to the controller, mainly for embedding hosts.
    #[must_use]
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }
}
