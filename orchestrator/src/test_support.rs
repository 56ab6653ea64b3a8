//! Test doubles for the multiplexer and the chat API.
//!
//! `FakeMux` keeps sessions in memory and reacts to Enter with a scripted
//! [`FakeResponse`]. `ScriptedChat` hands out queued replies and records what
//! it was asked.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use dashboard::TokenCounts;

use crate::core::conversation::ChatMessage;
use crate::core::pane::PaneState;
use crate::io::chat::{ChatClient, ChatReply};
use crate::io::tmux::Multiplexer;
use crate::poll::SettleTiming;
use crate::session::SessionTiming;

/// Text a freshly created fake session shows.
pub const STARTUP_BANNER: &str = "agent ready\n";

/// What the fake agent does when Enter is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeResponse {
    /// Append `> <input>` to the pane.
    Echo,
    /// Append this text.
    Reply(String),
    /// Leave the pane untouched.
    Silent,
    /// Keep the pane unchanged while the agent reports alive; show the text
    /// once liveness has been checked `checks` times.
    Busy { text: String, checks: u32 },
    /// The agent process exits with this status; the pane stays unchanged.
    Crash(i32),
    /// The whole session disappears.
    Vanish,
}

#[derive(Debug, Default)]
struct FakeSession {
    pane: String,
    dead: bool,
    exit_status: i32,
    typed: String,
    pending: Option<(String, u32)>,
    flapping: bool,
    liveness_checks: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    sessions: HashMap<String, FakeSession>,
    responses: VecDeque<FakeResponse>,
    fail_starts: u32,
    flap_starts: bool,
    created: u32,
    killed: u32,
    sent: Vec<String>,
}

/// In-memory [`Multiplexer`].
#[derive(Debug, Default)]
pub struct FakeMux {
    state: RefCell<FakeState>,
}

fn not_found(name: &str) -> anyhow::Error {
    anyhow!("tmux has-session failed: can't find session: {name}")
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for the next Enter presses; afterwards the agent echoes.
    pub fn with_responses(responses: impl IntoIterator<Item = FakeResponse>) -> Self {
        let mux = Self::new();
        mux.state.borrow_mut().responses.extend(responses);
        mux
    }

    /// The next `count` created sessions start with an agent that exits at once.
    pub fn fail_next_starts(&self, count: u32) {
        self.state.borrow_mut().fail_starts = count;
    }

    /// Sessions created from now on report their pane dead on every second
    /// liveness query, so they never pass the readiness gate.
    pub fn flap_new_sessions(&self) {
        self.state.borrow_mut().flap_starts = true;
    }

    /// Register an already running session.
    pub fn add_session(&self, name: &str, pane: &str) {
        self.state.borrow_mut().sessions.insert(
            name.to_string(),
            FakeSession {
                pane: pane.to_string(),
                ..FakeSession::default()
            },
        );
    }

    /// Mark the agent in `name` as exited, keeping the pane around.
    pub fn kill_process(&self, name: &str, status: i32) {
        if let Some(session) = self.state.borrow_mut().sessions.get_mut(name) {
            session.dead = true;
            session.exit_status = status;
        }
    }

    pub fn remove_session(&self, name: &str) {
        self.state.borrow_mut().sessions.remove(name);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state.borrow().sessions.contains_key(name)
    }

    pub fn is_dead(&self, name: &str) -> bool {
        self.state
            .borrow()
            .sessions
            .get(name)
            .is_some_and(|session| session.dead)
    }

    pub fn pane(&self, name: &str) -> Option<String> {
        self.state
            .borrow()
            .sessions
            .get(name)
            .map(|session| session.pane.clone())
    }

    /// Sessions created so far.
    pub fn created(&self) -> u32 {
        self.state.borrow().created
    }

    /// Successful kills so far.
    pub fn killed(&self) -> u32 {
        self.state.borrow().killed
    }

    /// Inputs submitted with Enter, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state.borrow().sent.clone()
    }
}

impl Multiplexer for FakeMux {
    fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.exists(name))
    }

    fn create_session(&self, name: &str, _dir: &Path, command: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.sessions.contains_key(name) {
            bail!("tmux new-session failed: duplicate session: {name}");
        }
        state.created += 1;
        let mut session = FakeSession {
            pane: STARTUP_BANNER.to_string(),
            flapping: state.flap_starts,
            ..FakeSession::default()
        };
        if state.fail_starts > 0 {
            state.fail_starts -= 1;
            session.dead = true;
            session.exit_status = 1;
            session.pane = format!("{command}: failed to start\n");
        }
        state.sessions.insert(name.to_string(), session);
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.sessions.remove(name).is_none() {
            return Err(not_found(name));
        }
        state.killed += 1;
        Ok(())
    }

    fn capture_pane(&self, name: &str) -> Result<String> {
        let state = self.state.borrow();
        let session = state.sessions.get(name).ok_or_else(|| not_found(name))?;
        Ok(session.pane.clone())
    }

    fn pane_state(&self, name: &str) -> Result<PaneState> {
        let mut state = self.state.borrow_mut();
        let session = state.sessions.get_mut(name).ok_or_else(|| not_found(name))?;
        if let Some((text, remaining)) = session.pending.take() {
            if remaining <= 1 {
                session.pane.push_str(&text);
            } else {
                session.pending = Some((text, remaining - 1));
            }
        }
        session.liveness_checks += 1;
        let dead = session.dead || (session.flapping && session.liveness_checks % 2 == 0);
        Ok(PaneState {
            dead,
            exit_status: session.exit_status,
            current_command: if dead { "bash" } else { "agent" }.to_string(),
        })
    }

    fn send_literal(&self, name: &str, text: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let session = state.sessions.get_mut(name).ok_or_else(|| not_found(name))?;
        session.typed.push_str(text);
        Ok(())
    }

    fn send_enter(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let response = state.responses.pop_front().unwrap_or(FakeResponse::Echo);
        let session = state.sessions.get_mut(name).ok_or_else(|| not_found(name))?;
        let input = std::mem::take(&mut session.typed);

        match response {
            FakeResponse::Echo => session.pane.push_str(&format!("> {input}\n")),
            FakeResponse::Reply(text) => session.pane.push_str(&text),
            FakeResponse::Silent => {}
            FakeResponse::Busy { text, checks } => session.pending = Some((text, checks)),
            FakeResponse::Crash(status) => {
                session.dead = true;
                session.exit_status = status;
            }
            FakeResponse::Vanish => {
                state.sessions.remove(name);
            }
        }
        state.sent.push(input);
        Ok(())
    }
}

/// Readiness timings scaled down for tests.
pub fn fast_session_timing() -> SessionTiming {
    SessionTiming {
        ready_timeout: Duration::from_millis(500),
        settle_window: Duration::from_millis(20),
        ready_poll_interval: Duration::from_millis(5),
        alive_check_interval: Duration::from_millis(5),
        keystroke_delay: Duration::ZERO,
    }
}

/// Stabilization timings scaled down for tests.
pub fn fast_settle_timing() -> SettleTiming {
    SettleTiming {
        poll_interval: Duration::from_millis(5),
        stable_window: Duration::from_millis(20),
    }
}

/// Usage attached to every scripted reply.
pub const SCRIPTED_USAGE: TokenCounts = TokenCounts {
    prompt: 10,
    completion: 5,
    total: 15,
};

/// [`ChatClient`] that replays queued replies.
///
/// `Err` entries become API errors. When the queue runs dry the fallback is
/// used, if any.
#[derive(Debug)]
pub struct ScriptedChat {
    model: String,
    replies: RefCell<VecDeque<Result<String, String>>>,
    fallback: Option<Result<String, String>>,
    requests: RefCell<Vec<Vec<ChatMessage>>>,
    temperatures: RefCell<Vec<f32>>,
}

impl ScriptedChat {
    pub fn new(replies: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            model: "scripted/model".to_string(),
            replies: RefCell::new(replies.into_iter().collect()),
            fallback: None,
            requests: RefCell::new(Vec::new()),
            temperatures: RefCell::new(Vec::new()),
        }
    }

    /// Successful replies only.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self::new(Vec::new()).with_fallback(Err(message.to_string()))
    }

    pub fn with_fallback(mut self, fallback: Result<String, String>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Conversations sent, one per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.borrow().clone()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.temperatures.borrow().clone()
    }
}

impl ChatClient for ScriptedChat {
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<ChatReply> {
        self.requests.borrow_mut().push(messages.to_vec());
        self.temperatures.borrow_mut().push(temperature);

        let next = self
            .replies
            .borrow_mut()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("scripted chat has no reply left"))?;
        match next {
            Ok(content) => Ok(ChatReply {
                content,
                usage: SCRIPTED_USAGE,
            }),
            Err(message) => Err(anyhow!("API error 500: {message}")),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
