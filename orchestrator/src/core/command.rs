//! Static checks on names and startup commands.

use anyhow::{Result, bail};

pub const CLAUDE_COMMAND: &str = "claude --dangerously-skip-permissions --setting-sources user";
pub const CODEX_COMMAND: &str = "codex --approval-mode full-auto";

/// Which coding agent runs inside the session, and how to refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub command: String,
    pub display_name: String,
}

impl AgentProfile {
    /// `gpt*` models (any case) drive Codex; everything else drives Claude Code.
    pub fn for_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("gpt") {
            Self {
                command: CODEX_COMMAND.to_string(),
                display_name: "Codex".to_string(),
            }
        } else {
            Self {
                command: CLAUDE_COMMAND.to_string(),
                display_name: "Claude Code".to_string(),
            }
        }
    }
}

/// Session and socket names are limited to `[A-Za-z0-9_-]`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("{kind} name is empty");
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        bail!(
            "invalid character {bad:?} in {kind} name {name:?}; only alphanumeric, hyphens, and underscores are allowed"
        );
    }
    Ok(())
}

/// `KEY=VALUE` tokens that precede the executable in a startup command.
pub fn is_shell_env_assignment(token: &str) -> bool {
    match token.find('=') {
        Some(eq) if eq > 0 => token[..eq]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Whitespace-split `command` and locate the executable token.
///
/// Quoted arguments are not supported; wrap such commands in a script.
pub fn split_startup_command(command: &str) -> Result<(Vec<String>, usize)> {
    let fields: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if fields.is_empty() {
        bail!("startup command is empty");
    }
    let Some(index) = fields.iter().position(|f| !is_shell_env_assignment(f)) else {
        bail!("startup command {command:?} is missing an executable");
    };
    Ok((fields, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt_models_select_codex() {
        let profile = AgentProfile::for_model("GPT-5");
        assert_eq!(profile.command, CODEX_COMMAND);
        assert_eq!(profile.display_name, "Codex");

        let profile = AgentProfile::for_model("anthropic/claude-opus-4.6");
        assert_eq!(profile.command, CLAUDE_COMMAND);
        assert_eq!(profile.display_name, "Claude Code");
    }

    #[test]
    fn names_allow_alnum_dash_underscore() {
        validate_name("session", "claude-loop_2").expect("valid");
        assert!(validate_name("session", "").is_err());
        let err = validate_name("socket", "a b").expect_err("space");
        assert!(err.to_string().contains("socket name"));
        assert!(validate_name("session", "x;rm").is_err());
        assert!(validate_name("session", "näme").is_err());
    }

    #[test]
    fn env_assignments_are_recognized() {
        assert!(is_shell_env_assignment("FOO=bar"));
        assert!(is_shell_env_assignment("A_1="));
        assert!(!is_shell_env_assignment("=bar"));
        assert!(!is_shell_env_assignment("--flag=x"));
        assert!(!is_shell_env_assignment("claude"));
    }

    #[test]
    fn split_skips_leading_assignments() {
        let (fields, index) = split_startup_command("  FOO=1 BAR=2 claude --x  ").expect("split");
        assert_eq!(fields, vec!["FOO=1", "BAR=2", "claude", "--x"]);
        assert_eq!(index, 2);
    }

    #[test]
    fn split_rejects_empty_or_assignment_only() {
        assert!(split_startup_command("   ").is_err());
        assert!(split_startup_command("FOO=1").is_err());
    }
}
