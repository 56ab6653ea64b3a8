//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded; in autonomous mode the task was reported complete.
pub const OK: i32 = 0;
/// Invalid configuration or input, or any other error.
pub const INVALID: i32 = 1;
/// Autonomous run hit the iteration cap without completing.
pub const INCOMPLETE: i32 = 2;
/// Autonomous run gave up after repeated chat API failures.
pub const ABORTED: i32 = 3;
