//! Pane text and pane status parsing.

use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

/// CSI sequences plus OSC sequences terminated by ST or BEL.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]|\x1b\][^\x1b]*\x1b\\|\x1b\][^\x07]*\x07")
        .expect("valid ansi regex")
});

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\n\s*){3,}").expect("valid blank-run regex"));

/// Liveness of the single pane in a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaneState {
    pub dead: bool,
    pub exit_status: i32,
    pub current_command: String,
}

/// Parse `#{pane_dead}\t#{pane_dead_status}\t#{pane_current_command}` output.
///
/// Only the first line is used.
pub fn parse_pane_state_line(line: &str) -> Result<PaneState> {
    let Some(line) = line.trim().lines().next() else {
        bail!("empty pane state");
    };

    let fields: Vec<&str> = line.splitn(3, '\t').collect();
    if fields.len() < 3 {
        bail!("unexpected pane state format: {line:?}");
    }

    let status = fields[1].trim();
    let exit_status = if status.is_empty() {
        0
    } else {
        status
            .parse::<i32>()
            .map_err(|err| anyhow::anyhow!("parse pane exit status {status:?}: {err}"))?
    };

    Ok(PaneState {
        dead: fields[0].trim() == "1",
        exit_status,
        current_command: fields[2].trim().to_string(),
    })
}

/// Strip escape sequences, trailing whitespace per line, and collapse runs of
/// blank lines to a single blank line.
pub fn clean_pane_output(raw: &str) -> String {
    let stripped = ANSI_RE.replace_all(raw, "");
    let trimmed_lines: Vec<&str> = stripped.lines().map(str::trim_end).collect();
    let joined = trimmed_lines.join("\n");
    BLANK_RUN_RE.replace_all(&joined, "\n\n").trim().to_string()
}

/// Shorten `text` to at most `max` characters for log lines, ellipsis
/// included.
pub fn truncate_for_log(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let head: String = text.chars().take(max - 3).collect();
    format!("{head}...")
}
