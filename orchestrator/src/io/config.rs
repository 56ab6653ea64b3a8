//! Orchestrator configuration stored in `<workdir>/.orchestrator.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::command::{AgentProfile, validate_name};
use crate::io::chat::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::poll::SettleTiming;
use crate::session::SessionTiming;

pub const CONFIG_FILE_NAME: &str = ".orchestrator.toml";
pub const DEFAULT_SESSION: &str = "gt-claude-loop";
pub const DEFAULT_SOCKET: &str = "gt-claude-loop";

/// Orchestrator configuration (TOML).
///
/// Every field has a default, so a missing file or a partial file is fine.
/// Command-line flags and environment variables override file values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub tmux: TmuxConfig,
    pub session: SessionConfig,
    pub output: OutputConfig,
    pub agent_loop: AgentLoopConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TmuxConfig {
    pub socket: String,
    pub session: String,
    /// Startup command; empty means "pick from `agent_model`".
    pub command: String,
    /// Model name that selects the coding agent (`gpt*` selects Codex).
    pub agent_model: String,
    pub command_timeout_secs: u64,
    /// Kill the session when the orchestrator exits or is interrupted.
    pub terminate_on_quit: bool,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            socket: DEFAULT_SOCKET.to_string(),
            session: DEFAULT_SESSION.to_string(),
            command: String::new(),
            agent_model: String::new(),
            command_timeout_secs: 10,
            terminate_on_quit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub ready_timeout_ms: u64,
    pub settle_window_ms: u64,
    pub ready_poll_interval_ms: u64,
    pub alive_check_interval_ms: u64,
    pub keystroke_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 10_000,
            settle_window_ms: 1_500,
            ready_poll_interval_ms: 250,
            alive_check_interval_ms: 200,
            keystroke_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub poll_interval_ms: u64,
    pub stable_window_ms: u64,
    pub response_timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            stable_window_ms: 2_000,
            response_timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentLoopConfig {
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub compaction_temperature: f32,
    pub request_timeout_secs: u64,
    /// 0 means no cap.
    pub max_iterations: u32,
    /// Compact remembered facts once there are more than this many.
    pub max_facts: usize,
    pub api_backoff_ms: u64,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: 0.3,
            compaction_temperature: 0.2,
            request_timeout_secs: 120,
            max_iterations: 0,
            max_facts: 50,
            api_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind: String,
    /// 0 picks an ephemeral port.
    pub port: u16,
    pub open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 0,
            open: true,
            ui_dir: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        validate_name("session", &self.tmux.session)?;
        validate_name("socket", &self.tmux.socket)?;
        if self.tmux.command_timeout_secs == 0 {
            bail!("tmux.command_timeout_secs must be > 0");
        }
        if self.session.ready_timeout_ms == 0 {
            bail!("session.ready_timeout_ms must be > 0");
        }
        if self.session.ready_poll_interval_ms == 0 || self.session.alive_check_interval_ms == 0 {
            bail!("session poll intervals must be > 0");
        }
        if self.output.poll_interval_ms == 0 {
            bail!("output.poll_interval_ms must be > 0");
        }
        if self.output.response_timeout_secs == 0 {
            bail!("output.response_timeout_secs must be > 0");
        }
        if self.agent_loop.model.trim().is_empty() {
            bail!("agent_loop.model must not be empty");
        }
        if self.agent_loop.endpoint.trim().is_empty() {
            bail!("agent_loop.endpoint must not be empty");
        }
        for (name, value) in [
            ("temperature", self.agent_loop.temperature),
            ("compaction_temperature", self.agent_loop.compaction_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                bail!("agent_loop.{name} must be between 0 and 2");
            }
        }
        if self.agent_loop.request_timeout_secs == 0 {
            bail!("agent_loop.request_timeout_secs must be > 0");
        }
        if self.agent_loop.max_facts == 0 {
            bail!("agent_loop.max_facts must be > 0");
        }
        Ok(())
    }

    /// Agent command and display name, honoring an explicit command.
    pub fn agent_profile(&self) -> AgentProfile {
        let mut profile = AgentProfile::for_model(&self.tmux.agent_model);
        if !self.tmux.command.trim().is_empty() {
            profile.command = self.tmux.command.trim().to_string();
        }
        profile
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.tmux.command_timeout_secs)
    }

    pub fn session_timing(&self) -> SessionTiming {
        SessionTiming {
            ready_timeout: Duration::from_millis(self.session.ready_timeout_ms),
            settle_window: Duration::from_millis(self.session.settle_window_ms),
            ready_poll_interval: Duration::from_millis(self.session.ready_poll_interval_ms),
            alive_check_interval: Duration::from_millis(self.session.alive_check_interval_ms),
            keystroke_delay: Duration::from_millis(self.session.keystroke_delay_ms),
        }
    }

    pub fn settle_timing(&self) -> SettleTiming {
        SettleTiming {
            poll_interval: Duration::from_millis(self.output.poll_interval_ms),
            stable_window: Duration::from_millis(self.output.stable_window_ms),
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.output.response_timeout_secs)
    }
}

/// Config file location for a working directory.
pub fn config_path(workdir: &Path) -> PathBuf {
    workdir.join(CONFIG_FILE_NAME)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename over it.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::{CLAUDE_COMMAND, CODEX_COMMAND};

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
        assert_eq!(cfg.response_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.settle_timing(), SettleTiming::default());
        assert_eq!(cfg.session_timing(), SessionTiming::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = config_path(temp.path());
        let mut cfg = OrchestratorConfig::default();
        cfg.agent_loop.max_iterations = 7;
        cfg.dashboard.ui_dir = Some(PathBuf::from("ui/dist"));
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
        assert!(!temp.path().join(".orchestrator.toml.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = config_path(temp.path());
        fs::write(&path, "[agent_loop]\nmax_iterations = 3\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent_loop.max_iterations, 3);
        assert_eq!(cfg.agent_loop.max_facts, 50);
        assert_eq!(cfg.tmux.socket, DEFAULT_SOCKET);
    }

    #[test]
    fn invalid_session_name_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = config_path(temp.path());
        fs::write(&path, "[tmux]\nsession = \"bad name\"\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("session name"));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let mut cfg = OrchestratorConfig::default();
        cfg.agent_loop.temperature = 3.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_command_overrides_profile_command() {
        let mut cfg = OrchestratorConfig::default();
        assert_eq!(cfg.agent_profile().command, CLAUDE_COMMAND);

        cfg.tmux.agent_model = "gpt-5".to_string();
        assert_eq!(cfg.agent_profile().command, CODEX_COMMAND);

        cfg.tmux.command = " my-agent --fast ".to_string();
        let profile = cfg.agent_profile();
        assert_eq!(profile.command, "my-agent --fast");
        assert_eq!(profile.display_name, "Codex");
    }
}
