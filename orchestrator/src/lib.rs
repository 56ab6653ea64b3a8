//! Drive an interactive coding agent running inside a tmux session.
//!
//! The crate keeps one agent session alive, types instructions into it, waits
//! for its output to settle, and lets an orchestrator model decide what to
//! send next until that model declares the task complete.
//!
//! - **[`core`]**: Pure logic (pane parsing, failure classification, facts,
//!   conversation). No I/O.
//! - **[`io`]**: Side-effecting adapters (tmux, chat API, files, prompts).
//!   Traits at the seams so tests can swap in fakes.
//!
//! [`session`], [`poll`] and [`deliver`] manage and talk to the session;
//! [`looping`] and [`interactive`] are the two ways of driving it.

pub mod core;
pub mod deliver;
pub mod error;
pub mod exit_codes;
pub mod interactive;
pub mod io;
pub mod logging;
pub mod looping;
pub mod poll;
pub mod report;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
