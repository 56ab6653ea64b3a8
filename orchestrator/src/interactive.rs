//! Interactive mode: the operator types messages for the agent directly.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{instrument, warn};

use crate::deliver::deliver;
use crate::io::tmux::Multiplexer;
use crate::session::SessionManager;

pub const QUIT_COMMAND: &str = "/quit";
pub const PROMPT: &str = "you> ";

/// Why the chat loop ended, plus message counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSummary {
    pub delivered: u32,
    pub failed: u32,
    /// `true` when input ran out instead of `/quit`.
    pub input_closed: bool,
}

/// Read lines from `input` and deliver each one, printing the settled pane.
///
/// Blank lines are skipped. A failed delivery is reported and the loop keeps
/// going; only I/O errors on `input`/`out` end it early.
#[instrument(skip_all, fields(session = %manager.session().name))]
pub fn chat_loop<M, R, W>(
    manager: &SessionManager<'_, M>,
    mut input: R,
    out: &mut W,
    response_timeout: Duration,
) -> Result<ChatSummary>
where
    M: Multiplexer,
    R: BufRead,
    W: Write,
{
    let mut summary = ChatSummary {
        delivered: 0,
        failed: 0,
        input_closed: false,
    };
    let mut last_pane = String::new();
    let mut line = String::new();

    loop {
        write!(out, "{PROMPT}").context("write prompt")?;
        out.flush().context("flush prompt")?;

        line.clear();
        if input.read_line(&mut line).context("read input")? == 0 {
            writeln!(out, "\ninput closed").context("write output")?;
            summary.input_closed = true;
            return Ok(summary);
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == QUIT_COMMAND {
            return Ok(summary);
        }

        match deliver(manager, message, &last_pane, response_timeout) {
            Ok(pane) => {
                summary.delivered += 1;
                writeln!(out, "\n----- full pane output -----").context("write output")?;
                writeln!(out, "{pane}").context("write output")?;
                writeln!(out, "----- end output -----").context("write output")?;
                last_pane = pane;
            }
            Err(err) => {
                summary.failed += 1;
                warn!(err = %format!("{err:#}"), "message failed");
                writeln!(out, "message failed: {err:#}").context("write output")?;
            }
        }
    }
}
