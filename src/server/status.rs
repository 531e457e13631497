//! Server status types and the indicator projection.
//!
//! The server periodically pushes a small `{state, docCount}` payload over
//! the `marksman/status` notification channel; this module maps it to the
//! short string a host UI can display.

use serde::{Deserialize, Serialize};

/// Notification method carrying [`StatusPayload`].
pub const STATUS_NOTIFICATION: &str = "marksman/status";

/// Reported run state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No status has been received yet.
    Init,
    /// The server reports healthy operation.
    Ok,
    /// The server failed to start or its process terminated. Unrecognized
    /// states decode here as the fail-safe default.
    #[serde(other)]
    Dead,
}

/// Status payload pushed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub state: RunState,
    /// Number of open documents; meaningful only while `state` is `ok`.
    #[serde(default, rename = "docCount")]
    pub doc_count: u32,
}

impl StatusPayload {
    /// Status before anything is known about the server.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            state: RunState::Init,
            doc_count: 0,
        }
    }

    /// Status for a server that failed or stopped.
    #[must_use]
    pub const fn dead() -> Self {
        Self {
            state: RunState::Dead,
            doc_count: 0,
        }
    }
}

/// Renders a status payload as the short indicator string.
#[must_use]
pub fn project_status(status: &StatusPayload) -> String {
    match status.state {
        RunState::Init => "? MN".to_string(),
        RunState::Ok => format!("✓ MN ({})", status.doc_count),
        RunState::Dead => "☠ MN".to_string(),
    }
}
