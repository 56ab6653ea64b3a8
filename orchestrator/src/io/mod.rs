//! Side-effecting operations: processes, tmux, HTTP, and files.

pub mod chat;
pub mod command;
pub mod config;
pub mod memory;
pub mod process;
pub mod prompt;
pub mod tmux;
