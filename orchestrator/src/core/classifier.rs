//! Classification of session and delivery failures.
//!
//! tmux reports most conditions only through its error text, so the text
//! patterns live here and nowhere else.

use crate::error::{SettleError, StartupError};

/// Closed set of failure kinds the recovery logic branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Session or multiplexer server is gone.
    NotFound,
    /// The inner process exited during or shortly after startup.
    StartupExit,
    /// The inner process is dead.
    DeadProcess,
    /// Output has not changed yet but the process is alive.
    StillWorking,
    Timeout,
    Other,
}

impl FailureKind {
    /// Whether a session restart can plausibly fix this failure.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::NotFound | Self::StartupExit | Self::DeadProcess)
    }
}

const NOT_FOUND_PATTERNS: [&str; 4] = [
    "can't find session",
    "no server running",
    "no current target",
    "error connecting to",
];

const STARTUP_EXIT_PATTERNS: [&str; 2] = ["exited during startup", "exited shortly after startup"];

const DEAD_PROCESS_PATTERN: &str = "startup process exited";

/// Classify an error by its typed sources first, then by message text.
pub fn classify(err: &anyhow::Error) -> FailureKind {
    for cause in err.chain() {
        if let Some(settle) = cause.downcast_ref::<SettleError>() {
            return match settle {
                SettleError::ProcessDead { .. } => FailureKind::DeadProcess,
                SettleError::StillWorking { .. } => FailureKind::StillWorking,
                SettleError::Unstable { .. } => FailureKind::Timeout,
            };
        }
        if let Some(startup) = cause.downcast_ref::<StartupError>() {
            return match startup {
                StartupError::ExitedDuringStartup { .. }
                | StartupError::ExitedAfterStartup { .. } => FailureKind::StartupExit,
                StartupError::ProcessExited { .. } => FailureKind::DeadProcess,
                StartupError::NotReady { .. } => FailureKind::Timeout,
            };
        }
    }
    classify_message(&format!("{err:#}"))
}

/// Classify raw error text, as produced by tmux.
pub fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::NotFound
    } else if STARTUP_EXIT_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::StartupExit
    } else if lower.contains(DEAD_PROCESS_PATTERN) {
        FailureKind::DeadProcess
    } else {
        FailureKind::Other
    }
}

/// True when `err` means the session or server does not exist.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    classify(err) == FailureKind::NotFound
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{Context, anyhow};

    use super::*;

    #[test]
    fn tmux_missing_session_texts_are_not_found() {
        for text in [
            "tmux has-session -t x failed: can't find session: x",
            "no server running on /tmp/tmux-0/sock",
            "no current target",
            "error connecting to /tmp/tmux-0/sock (No such file or directory)",
        ] {
            assert_eq!(classify(&anyhow!(text.to_string())), FailureKind::NotFound, "{text}");
        }
    }

    #[test]
    fn typed_errors_win_over_text() {
        let err = anyhow::Error::new(SettleError::StillWorking {
            timeout: Duration::from_secs(1),
            last_pane: "can't find session".to_string(),
        });
        assert_eq!(classify(&err), FailureKind::StillWorking);
    }

    #[test]
    fn typed_errors_found_through_context() {
        let err = Err::<(), _>(SettleError::ProcessDead {
            timeout: Duration::from_secs(1),
            last_pane: String::new(),
        })
        .context("wait for response")
        .context("attempt 1")
        .expect_err("error");
        assert_eq!(classify(&err), FailureKind::DeadProcess);
        assert!(classify(&err).is_recoverable());
    }

    #[test]
    fn startup_variants_map_to_kinds() {
        let during = anyhow::Error::new(StartupError::ExitedDuringStartup {
            session: "s".to_string(),
            command: "claude".to_string(),
        });
        let exited = anyhow::Error::new(StartupError::ProcessExited {
            status: 1,
            current_command: "bash".to_string(),
            command: "claude".to_string(),
            pane: String::new(),
        });
        let not_ready = anyhow::Error::new(StartupError::NotReady {
            session: "s".to_string(),
            timeout: Duration::from_secs(10),
            last_pane: String::new(),
            last_error: None,
        });
        assert_eq!(classify(&during), FailureKind::StartupExit);
        assert_eq!(classify(&exited), FailureKind::DeadProcess);
        assert_eq!(classify(&not_ready), FailureKind::Timeout);
        assert!(!classify(&not_ready).is_recoverable());
    }

    #[test]
    fn unstable_output_is_a_plain_timeout() {
        let err = anyhow::Error::new(SettleError::Unstable {
            timeout: Duration::from_secs(1),
            last_pane: String::new(),
        });
        assert_eq!(classify(&err), FailureKind::Timeout);
    }

    #[test]
    fn startup_texts_are_recognized() {
        assert_eq!(
            classify_message("session x exited shortly after startup"),
            FailureKind::StartupExit
        );
        assert_eq!(
            classify_message("startup process exited with status 2"),
            FailureKind::DeadProcess
        );
    }

    #[test]
    fn unrelated_errors_are_other() {
        let err = anyhow!("connection refused").context("chat completion");
        assert_eq!(classify(&err), FailureKind::Other);
        assert!(!FailureKind::Other.is_recoverable());
        assert!(!FailureKind::StillWorking.is_recoverable());
    }
}
