//! Send one input and return the settled response, repairing the session once.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{instrument, warn};

use crate::core::classifier::classify;
use crate::io::tmux::Multiplexer;
use crate::session::SessionManager;

/// One initial attempt plus one after a restart.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 2;

/// Deliver `input` and wait for the pane to settle relative to `previous`.
///
/// A failure that a restart can fix (session or server gone, agent exited or
/// died) triggers one restart and one retry. Anything else is returned as is.
#[instrument(skip_all, fields(session = %manager.session().name, input_len = input.len()))]
pub fn deliver<M: Multiplexer>(
    manager: &SessionManager<'_, M>,
    input: &str,
    previous: &str,
    response_timeout: Duration,
) -> Result<String> {
    let mut restart_failure: Option<String> = None;
    let mut attempt = 1;

    loop {
        let err = match deliver_once(manager, input, previous, response_timeout) {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        let kind = classify(&err);
        if attempt >= MAX_DELIVERY_ATTEMPTS || !kind.is_recoverable() {
            return Err(match restart_failure {
                Some(restart) => err.context(format!("after failed restart ({restart})")),
                None => err,
            });
        }

        warn!(attempt, ?kind, err = %format!("{err:#}"), "delivery failed, restarting session");
        if let Err(restart_err) = manager.restart() {
            warn!(err = %format!("{restart_err:#}"), "restart failed, retrying anyway");
            restart_failure = Some(format!("{restart_err:#}"));
        }
        attempt += 1;
    }
}

fn deliver_once<M: Multiplexer>(
    manager: &SessionManager<'_, M>,
    input: &str,
    previous: &str,
    response_timeout: Duration,
) -> Result<String> {
    manager.ensure_ready().context("ensure session")?;
    manager.send_message(input).context("send message")?;
    manager
        .wait_for_settled_output(previous, response_timeout)
        .context("capture pane")
}
