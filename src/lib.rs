//! Marksman bridge
//!
//! An editor-integration shim for the [Marksman] markdown language server:
//! finds or provisions a compatible server binary, owns the live session,
//! and projects server status into a short indicator string a host UI can
//! display.
//!
//! [Marksman]: https://github.com/artempyanykh/marksman
//!
//! # Architecture
//!
//! - **Resolver**: picks the executable (configured command, PATH lookup,
//!   or managed download; first hit wins)
//! - **Fetcher**: versioned binary cache with a streaming, progress-reporting
//!   download
//! - **Session controller**: connect / restart / stop, one live session at
//!   a time
//! - **Status projector**: maps server status payloads to the indicator text
//!
//! The core depends only on the narrow host interfaces in [`host`], never
//! on a concrete editor type.

pub mod config;
pub mod extension;
pub mod fetcher;
pub mod host;
pub mod logging;
pub mod platform;
pub mod resolver;
pub mod server;

// Re-export main types
pub use config::Settings;
pub use extension::{CMD_RESTART_SERVER, CMD_SHOW_OUTPUT, Extension, activate};
pub use fetcher::Fetcher;
pub use host::{CommandRegistry, ProgressHandle, ProgressView, StatusIndicator};
pub use platform::Platform;
pub use resolver::{Resolver, ServerSpec};
pub use server::{RunState, SessionController, StatusPayload, project_status};
