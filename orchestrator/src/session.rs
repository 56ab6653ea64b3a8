//! Lifecycle of the one managed agent session.
//!
//! The manager never trusts an earlier observation: every operation re-checks
//! the multiplexer before acting.

use std::cell::Cell;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::is_not_found;
use crate::error::StartupError;
use crate::io::tmux::Multiplexer;
use crate::poll::{SettleTiming, wait_for_settled_output};

/// A named session and what runs inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub workdir: PathBuf,
    /// Startup command with its executable already resolved.
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Absent,
    Starting,
    Ready,
    Dead,
    Restarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Deadline for the readiness gate.
    pub ready_timeout: Duration,
    /// How long a new session must stay alive before it counts as ready.
    pub settle_window: Duration,
    pub ready_poll_interval: Duration,
    pub alive_check_interval: Duration,
    /// Pause between typing a message and pressing Enter.
    pub keystroke_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            settle_window: Duration::from_millis(1500),
            ready_poll_interval: Duration::from_millis(250),
            alive_check_interval: Duration::from_millis(200),
            keystroke_delay: Duration::from_millis(500),
        }
    }
}

pub struct SessionManager<'m, M: Multiplexer> {
    mux: &'m M,
    session: Session,
    timing: SessionTiming,
    settle: SettleTiming,
    phase: Cell<SessionPhase>,
}

impl<'m, M: Multiplexer> SessionManager<'m, M> {
    pub fn new(mux: &'m M, session: Session, timing: SessionTiming, settle: SettleTiming) -> Self {
        Self {
            mux,
            session,
            timing,
            settle,
            phase: Cell::new(SessionPhase::Absent),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Last observed lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    fn set_phase(&self, phase: SessionPhase) {
        if self.phase.replace(phase) != phase {
            debug!(session = %self.session.name, ?phase, "session phase");
        }
    }

    fn name(&self) -> &str {
        &self.session.name
    }

    /// Create the session if missing, replace it if its process died, then
    /// block until it is ready.
    #[instrument(skip_all, fields(session = %self.session.name))]
    pub fn ensure_ready(&self) -> Result<()> {
        let exists = self.mux.has_session(self.name())?;
        if !exists {
            info!("creating session");
            self.set_phase(SessionPhase::Starting);
            self.mux
                .create_session(self.name(), &self.session.workdir, &self.session.command)
                .context("create session")?;
        } else {
            let state = self.mux.pane_state(self.name()).context("query pane state")?;
            if state.dead {
                self.set_phase(SessionPhase::Dead);
                warn!(
                    status = state.exit_status,
                    current_command = %state.current_command,
                    "pane is dead, recreating session"
                );
                self.recreate().with_context(|| {
                    format!(
                        "recover dead pane (status {}, command {:?})",
                        state.exit_status, state.current_command
                    )
                })?;
            }
        }

        self.wait_until_ready()
    }

    /// Kill and recreate the session, then wait for readiness.
    #[instrument(skip_all, fields(session = %self.session.name))]
    pub fn restart(&self) -> Result<()> {
        info!("restarting session");
        self.recreate()?;
        self.wait_until_ready()
    }

    fn recreate(&self) -> Result<()> {
        self.set_phase(SessionPhase::Restarting);
        if let Err(err) = self.mux.kill_session(self.name()) {
            if !is_not_found(&err) {
                return Err(err.context("kill session"));
            }
            debug!("session already gone");
        }
        self.mux
            .create_session(self.name(), &self.session.workdir, &self.session.command)
            .context("create session")
    }

    /// Readiness gate: the session exists, its pane is alive and capturable,
    /// and it stays alive for the settle window.
    pub fn wait_until_ready(&self) -> Result<()> {
        let deadline = Instant::now() + self.timing.ready_timeout;
        let mut last_error: Option<anyhow::Error> = None;
        let mut last_pane = String::new();

        while Instant::now() < deadline {
            if !self.mux.has_session(self.name())? {
                self.set_phase(SessionPhase::Absent);
                return Err(StartupError::ExitedDuringStartup {
                    session: self.session.name.clone(),
                    command: self.session.command.clone(),
                }
                .into());
            }

            let state = self.mux.pane_state(self.name())?;
            if state.dead {
                self.set_phase(SessionPhase::Dead);
                let pane = self.mux.capture_pane(self.name()).unwrap_or_default();
                return Err(StartupError::ProcessExited {
                    status: state.exit_status,
                    current_command: state.current_command,
                    command: self.session.command.clone(),
                    pane,
                }
                .into());
            }

            match self.mux.capture_pane(self.name()) {
                Ok(text) => {
                    last_pane = text;
                    match self.require_alive_for(self.timing.settle_window) {
                        Ok(()) => {
                            self.set_phase(SessionPhase::Ready);
                            return Ok(());
                        }
                        Err(err) => {
                            debug!(err = %err, "session not settled yet");
                            last_error = Some(err);
                        }
                    }
                }
                Err(err) => last_error = Some(err),
            }

            thread::sleep(self.timing.ready_poll_interval);
        }

        Err(StartupError::NotReady {
            session: self.session.name.clone(),
            timeout: self.timing.ready_timeout,
            last_pane,
            last_error: last_error.map(|err| format!("{err:#}")),
        }
        .into())
    }

    /// Guard against agents that crash right after launching.
    fn require_alive_for(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            let alive = self.mux.has_session(self.name())?
                && !self.mux.pane_state(self.name())?.dead;
            if !alive {
                return Err(StartupError::ExitedAfterStartup {
                    session: self.session.name.clone(),
                }
                .into());
            }
            thread::sleep(self.timing.alive_check_interval);
        }
        Ok(())
    }

    /// Type `text` into the pane and press Enter.
    pub fn send_message(&self, text: &str) -> Result<()> {
        self.mux
            .send_literal(self.name(), text)
            .context("type message")?;
        thread::sleep(self.timing.keystroke_delay);
        self.mux.send_enter(self.name()).context("press enter")
    }

    /// Wait for this session's pane to settle after a send.
    pub fn wait_for_settled_output(&self, previous: &str, timeout: Duration) -> Result<String> {
        wait_for_settled_output(
            previous,
            timeout,
            &self.settle,
            || self.mux.capture_pane(self.name()),
            || Ok(!self.mux.pane_state(self.name())?.dead),
        )
    }

    /// Current pane text, for interactive display.
    pub fn capture(&self) -> Result<String> {
        self.mux.capture_pane(self.name())
    }

    /// Kill the session, ignoring failures.
    pub fn cleanup(&self) {
        if let Err(err) = self.mux.kill_session(self.name()) {
            debug!(err = %err, "cleanup kill failed");
        }
        self.set_phase(SessionPhase::Absent);
    }
}
