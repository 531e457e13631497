//! Host capability interfaces.
//!
//! The bridge core never depends on a concrete editor type; the host injects
//! these narrow traits at activation. The log-backed implementations below
//! serve headless use and tests substitute recording fakes.

use tracing::info;

/// Passive status indicator owned by the host UI.
///
/// Only the session controller's projection call site writes the text, and
/// always from the single cooperative task, so writes are strictly ordered.
pub trait StatusIndicator: Send + Sync {
    fn set_text(&self, text: &str);
    fn show(&self);
    fn hide(&self);
}

/// Records the command ids the bridge responds to, so the host can route
/// user invocations back through [`crate::Extension::dispatch`].
pub trait CommandRegistry {
    fn register(&mut self, command_id: &str);
}

/// Transient progress UI for downloads.
///
/// The indication is non-cancellable by design: a partially downloaded
/// server binary would be useless.
pub trait ProgressView: Send + Sync {
    fn begin(&self, title: &str) -> Box<dyn ProgressHandle>;
}

/// One open progress indication.
pub trait ProgressHandle: Send {
    /// Reports the cumulative percent and the delta since the last report.
    fn report(&mut self, percent: u32, increment: u32);
}

/// Indicator that writes status transitions to the bridge log.
#[derive(Debug, Default)]
pub struct LogStatusIndicator;

impl StatusIndicator for LogStatusIndicator {
    fn set_text(&self, text: &str) {
        info!("status: {}", text);
    }

    fn show(&self) {}

    fn hide(&self) {}
}

/// Progress view that logs percentage milestones.
#[derive(Debug, Default)]
pub struct LogProgressView;

impl ProgressView for LogProgressView {
    fn begin(&self, title: &str) -> Box<dyn ProgressHandle> {
        info!("{}", title);
        Box::new(LogProgressHandle)
    }
}

struct LogProgressHandle;

impl ProgressHandle for LogProgressHandle {
    fn report(&mut self, percent: u32, _increment: u32) {
        if percent % 10 == 0 || percent >= 100 {
            info!("downloaded {}%", percent);
        }
    }
}
