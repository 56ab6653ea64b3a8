//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules are free of I/O side effects. They operate on in-memory data
//! and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod command;
pub mod conversation;
pub mod facts;
pub mod pane;
