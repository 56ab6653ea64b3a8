//! Startup command resolution against `PATH`.

use anyhow::{Result, anyhow};

use crate::core::command::split_startup_command;

/// Replace the executable token of `command` with its absolute path.
///
/// Leading `KEY=VALUE` assignments are left in place.
pub fn resolve_startup_command(command: &str) -> Result<String> {
    let (mut fields, index) = split_startup_command(command)?;
    let resolved = which::which(&fields[index])
        .map_err(|_| anyhow!("binary {:?} not found in PATH", fields[index]))?;
    fields[index] = resolved.to_string_lossy().into_owned();
    Ok(fields.join(" "))
}
