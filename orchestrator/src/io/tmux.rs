//! tmux adapter on a private socket.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, instrument, warn};

use crate::core::classifier::is_not_found;
use crate::core::pane::{PaneState, parse_pane_state_line};
use crate::io::process::{CommandOutput, run_command_with_timeout};

const PANE_STATE_FORMAT: &str = "#{pane_dead}\t#{pane_dead_status}\t#{pane_current_command}";

/// Primitive operations on a terminal multiplexer.
///
/// Implemented by [`Tmux`] for real sessions and by in-memory fakes in tests.
pub trait Multiplexer {
    fn has_session(&self, name: &str) -> Result<bool>;
    fn create_session(&self, name: &str, dir: &Path, command: &str) -> Result<()>;
    fn kill_session(&self, name: &str) -> Result<()>;
    /// Full scrollback of the session's pane.
    fn capture_pane(&self, name: &str) -> Result<String>;
    fn pane_state(&self, name: &str) -> Result<PaneState>;
    /// Type `text` without interpreting key names.
    fn send_literal(&self, name: &str, text: &str) -> Result<()>;
    fn send_enter(&self, name: &str) -> Result<()>;
}

/// The `tmux` binary, isolated on `-L <socket>` when a socket is set.
#[derive(Debug, Clone)]
pub struct Tmux {
    socket: String,
    command_timeout: Duration,
}

impl Tmux {
    pub fn new(socket: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            command_timeout,
        }
    }

    /// Arguments for one invocation, socket flag first.
    pub fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if !self.socket.trim().is_empty() {
            full.push("-L");
            full.push(self.socket.as_str());
        }
        full.extend_from_slice(args);
        full
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("tmux");
        cmd.args(self.args(args));
        let output = run_command_with_timeout(cmd, self.command_timeout)?;
        if output.timed_out {
            bail!(
                "tmux {} timed out after {:?}",
                args.join(" "),
                self.command_timeout
            );
        }
        if !output.success() {
            bail!("tmux {} failed: {}", args.join(" "), output.combined_text());
        }
        Ok(output)
    }
}

/// Exact-match target for `name`; a bare name lets tmux fall back to prefix
/// matching against other sessions on the socket.
fn exact_session(name: &str) -> String {
    format!("={name}")
}

/// Exact-match target for the session's current pane.
fn exact_pane(name: &str) -> String {
    format!("={name}:")
}

/// `send-keys` arguments typing `text` verbatim. `--` ends option parsing so
/// text starting with `-` is not read as a flag.
fn literal_keys_args<'a>(target: &'a str, text: &'a str) -> [&'a str; 6] {
    ["send-keys", "-t", target, "-l", "--", text]
}

impl Multiplexer for Tmux {
    #[instrument(skip_all, fields(session = name))]
    fn has_session(&self, name: &str) -> Result<bool> {
        match self.run(&["has-session", "-t", &exact_session(name)]) {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(session = name, dir = %dir.display()))]
    fn create_session(&self, name: &str, dir: &Path, command: &str) -> Result<()> {
        let dir = dir.to_string_lossy().into_owned();
        self.run(&["new-session", "-d", "-s", name, "-c", dir.as_str(), command])?;
        // new-session starts the server, so server options can only be set now.
        self.run(&["set-option", "-g", "exit-empty", "off"])?;
        // Keep dead panes so their exit status and output can be inspected.
        let window = exact_pane(name);
        self.run(&["set-window-option", "-t", &window, "remain-on-exit", "on"])?;
        debug!("session created");
        Ok(())
    }

    #[instrument(skip_all, fields(session = name))]
    fn kill_session(&self, name: &str) -> Result<()> {
        self.run(&["kill-session", "-t", &exact_session(name)])?;
        Ok(())
    }

    fn capture_pane(&self, name: &str) -> Result<String> {
        let output = self.run(&["capture-pane", "-p", "-t", &exact_pane(name), "-S", "-"])?;
        if output.truncated > 0 {
            warn!(session = name, dropped = output.truncated, "pane capture truncated");
        }
        Ok(output.stdout_text())
    }

    fn pane_state(&self, name: &str) -> Result<PaneState> {
        let target = exact_pane(name);
        let output = self.run(&["list-panes", "-t", &target, "-F", PANE_STATE_FORMAT])?;
        parse_pane_state_line(&output.stdout_text())
    }

    fn send_literal(&self, name: &str, text: &str) -> Result<()> {
        self.run(&literal_keys_args(&exact_pane(name), text))?;
        Ok(())
    }

    fn send_enter(&self, name: &str) -> Result<()> {
        self.run(&["send-keys", "-t", &exact_pane(name), "C-m"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_flag_is_prepended() {
        let tmux = Tmux::new("gt-claude-loop", Duration::from_secs(1));
        assert_eq!(
            tmux.args(&["has-session", "-t", "s"]),
            vec!["-L", "gt-claude-loop", "has-session", "-t", "s"]
        );
    }

    #[test]
    fn blank_socket_uses_default_server() {
        let tmux = Tmux::new("  ", Duration::from_secs(1));
        assert_eq!(tmux.args(&["kill-session"]), vec!["kill-session"]);
    }

    #[test]
    fn literal_text_starting_with_dash_follows_end_of_options() {
        let target = exact_pane("agent");
        let tmux = Tmux::new("sock", Duration::from_secs(1));
        assert_eq!(
            tmux.args(&literal_keys_args(&target, "- run the tests")),
            vec![
                "-L",
                "sock",
                "send-keys",
                "-t",
                "=agent:",
                "-l",
                "--",
                "- run the tests"
            ]
        );
        assert_eq!(literal_keys_args(&target, "--help")[5], "--help");
    }

    #[test]
    fn targets_match_the_session_name_exactly() {
        assert_eq!(exact_session("gt-claude-loop"), "=gt-claude-loop");
        assert_eq!(exact_pane("gt-claude-loop"), "=gt-claude-loop:");
    }
}
