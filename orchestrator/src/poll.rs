//! Output stabilization: decide when the agent has finished responding.
//!
//! The agent gives no completion signal, so the pane is polled until its text
//! has changed from the pre-send baseline and then stayed the same for a full
//! stability window.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::error::SettleError;

/// Pane text and the instant that text was first observed.
#[derive(Debug, Clone)]
pub struct PaneSnapshot {
    pub text: String,
    pub captured_at: Instant,
}

impl PaneSnapshot {
    pub fn new(text: String) -> Self {
        Self {
            text,
            captured_at: Instant::now(),
        }
    }

    /// How long the text has gone unchanged.
    pub fn unchanged_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleTiming {
    pub poll_interval: Duration,
    pub stable_window: Duration,
}

impl Default for SettleTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stable_window: Duration::from_secs(2),
        }
    }
}

/// Poll `capture` until the text differs from `previous` and then holds still
/// for `timing.stable_window`.
///
/// On timeout, `check_alive` distinguishes a dead agent from one that is
/// still thinking when nothing changed at all.
pub fn wait_for_settled_output<C, A>(
    previous: &str,
    timeout: Duration,
    timing: &SettleTiming,
    mut capture: C,
    mut check_alive: A,
) -> Result<String>
where
    C: FnMut() -> Result<String>,
    A: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;
    let mut latest = PaneSnapshot::new(previous.to_string());

    while Instant::now() < deadline {
        let text = capture()?;
        let now = Instant::now();
        if text != latest.text {
            trace!(len = text.len(), "pane changed");
            latest = PaneSnapshot {
                text,
                captured_at: now,
            };
        } else if latest.text != previous && latest.unchanged_for(now) >= timing.stable_window {
            debug!(len = latest.text.len(), "pane settled");
            return Ok(latest.text);
        }

        thread::sleep(timing.poll_interval);
    }

    if latest.text == previous {
        let alive = check_alive().context("liveness check failed")?;
        let last_pane = latest.text;
        if alive {
            return Err(SettleError::StillWorking { timeout, last_pane }.into());
        }
        return Err(SettleError::ProcessDead { timeout, last_pane }.into());
    }

    Err(SettleError::Unstable {
        timeout,
        last_pane: latest.text,
    }
    .into())
}
