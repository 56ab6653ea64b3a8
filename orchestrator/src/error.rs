//! Typed failures that callers branch on.
//!
//! Everything else travels as `anyhow::Error` with context. These enums are
//! recovered from an error chain by downcasting in
//! [`crate::core::classifier::classify`].

use std::time::Duration;

use thiserror::Error;

/// The session could not be brought to a usable state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("session {session} exited during startup (command: {command})")]
    ExitedDuringStartup { session: String, command: String },

    #[error("session {session} exited shortly after startup")]
    ExitedAfterStartup { session: String },

    #[error(
        "startup process exited with status {status} (current command: {current_command}, command: {command})\n{pane}"
    )]
    ProcessExited {
        status: i32,
        current_command: String,
        command: String,
        pane: String,
    },

    #[error(
        "session {session} not ready after {timeout:?}{}\n{last_pane}",
        last_error_suffix(.last_error)
    )]
    NotReady {
        session: String,
        timeout: Duration,
        last_pane: String,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}

/// The pane did not settle within the response timeout.
#[derive(Debug, Error)]
pub enum SettleError {
    #[error("agent process exited without responding (waited {timeout:?})")]
    ProcessDead { timeout: Duration, last_pane: String },

    #[error("agent still working, output unchanged after {timeout:?}")]
    StillWorking { timeout: Duration, last_pane: String },

    #[error("output did not stabilize within {timeout:?}")]
    Unstable { timeout: Duration, last_pane: String },
}

impl SettleError {
    /// Last pane text observed before giving up.
    pub fn last_pane(&self) -> &str {
        match self {
            Self::ProcessDead { last_pane, .. }
            | Self::StillWorking { last_pane, .. }
            | Self::Unstable { last_pane, .. } => last_pane,
        }
    }
}

/// First [`SettleError`] anywhere in the chain of `err`.
pub fn find_settle_error(err: &anyhow::Error) -> Option<&SettleError> {
    err.chain().find_map(|cause| cause.downcast_ref::<SettleError>())
}
