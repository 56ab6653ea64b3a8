//! Orchestrator CLI.
//!
//! Keeps a coding agent running in a tmux session and either lets an
//! orchestrator model drive it (`run`) or relays the operator's messages
//! (`chat`).

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use dashboard::{Dashboard, DashboardOptions, EventBroker};
use tracing::{info, warn};

use orchestrator::exit_codes;
use orchestrator::interactive::{QUIT_COMMAND, chat_loop};
use orchestrator::io::chat::OpenRouterClient;
use orchestrator::io::command::resolve_startup_command;
use orchestrator::io::config::{OrchestratorConfig, config_path, load_config, write_config};
use orchestrator::io::memory::{FactStore, MEMORY_FILE_NAME};
use orchestrator::io::tmux::{Multiplexer, Tmux};
use orchestrator::logging;
use orchestrator::looping::{LoopConfig, LoopContext, run_autonomous};
use orchestrator::report::render_event;
use orchestrator::session::{Session, SessionManager};

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Drive a coding agent in tmux with an orchestrator model"
)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Command,
}

/// Values that override the config file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Config file (default: `<workdir>/.orchestrator.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, env = "CLAUDE_TMUX_SESSION")]
    session: Option<String>,
    #[arg(long, global = true, env = "CLAUDE_TMUX_SOCKET")]
    socket: Option<String>,
    /// Agent startup command.
    #[arg(long = "agent-command", global = true, env = "CLAUDE_CMD")]
    agent_command: Option<String>,
    /// Agent model; names starting with `gpt` select Codex.
    #[arg(long = "agent-model", global = true, env = "DEFAULT_MODEL")]
    agent_model: Option<String>,
    /// Orchestrator model.
    #[arg(long, global = true, env = "OPENROUTER_MODEL")]
    model: Option<String>,
    /// 0 means no cap.
    #[arg(long, global = true, env = "MAX_ITERATIONS")]
    max_iterations: Option<u32>,
    #[arg(long, global = true, env = "MEMORY_MAX_FACTS")]
    max_facts: Option<usize>,
    #[arg(long, global = true, env = "DASHBOARD_ENABLED", value_parser = BoolishValueParser::new())]
    dashboard: Option<bool>,
    #[arg(long, global = true, env = "DASHBOARD_PORT")]
    dashboard_port: Option<u16>,
    #[arg(long, global = true, env = "DASHBOARD_OPEN", value_parser = BoolishValueParser::new())]
    open_dashboard: Option<bool>,
    /// Kill the session on exit or interrupt.
    #[arg(
        long,
        global = true,
        env = "TERMINATE_WHEN_QUIT",
        value_parser = BoolishValueParser::new()
    )]
    terminate_on_quit: Option<bool>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `.orchestrator.toml` into the working directory.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        workdir: Option<PathBuf>,
    },
    /// Let the orchestrator model drive the agent until the task is done.
    Run {
        workdir: Option<PathBuf>,
        /// Task description; read from stdin when omitted.
        #[arg(long)]
        task: Option<String>,
        #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Type messages to the agent yourself.
    Chat { workdir: Option<PathBuf> },
    /// Kill the managed session.
    Stop { workdir: Option<PathBuf> },
}

fn main() {
    let dotenv = dotenvy::dotenv();
    logging::init();
    if let Err(err) = dotenv
        && !err.not_found()
    {
        warn!(err = %err, "failed to load .env");
    }

    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, workdir } => cmd_init(&cli.overrides, workdir, force),
        Command::Run {
            workdir,
            task,
            api_key,
        } => cmd_run(&cli.overrides, workdir, task, api_key),
        Command::Chat { workdir } => cmd_chat(&cli.overrides, workdir),
        Command::Stop { workdir } => cmd_stop(&cli.overrides, workdir),
    }
}

fn cmd_init(overrides: &Overrides, workdir: Option<PathBuf>, force: bool) -> Result<i32> {
    let workdir = resolve_workdir(workdir)?;
    let path = overrides
        .config
        .clone()
        .unwrap_or_else(|| config_path(&workdir));
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &OrchestratorConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    overrides: &Overrides,
    workdir: Option<PathBuf>,
    task: Option<String>,
    api_key: Option<String>,
) -> Result<i32> {
    let workdir = resolve_workdir(workdir)?;
    let cfg = load_settings(overrides, &workdir)?;
    let api_key = api_key
        .filter(|key| !key.trim().is_empty())
        .context("OPENROUTER_API_KEY is required in autonomous mode")?;

    let tmux = Tmux::new(cfg.tmux.socket.clone(), cfg.command_timeout());
    let manager = prepare_session(&tmux, &cfg, &workdir)?;

    let task = match task {
        Some(task) => task.trim().to_string(),
        None => read_task(io::stdin().lock())?,
    };
    if task.is_empty() {
        bail!("empty task");
    }

    let store = FactStore::in_workdir(&workdir);
    let facts = match store.load() {
        Ok(facts) => {
            if !facts.is_empty() {
                println!("Loaded {} memory facts from {MEMORY_FILE_NAME}", facts.len());
            }
            facts
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "failed to load memory, starting empty");
            Vec::new()
        }
    };

    let broker = EventBroker::new();
    let dashboard = if cfg.dashboard.enabled {
        start_dashboard(&cfg, &broker)
    } else {
        None
    };

    let chat = OpenRouterClient::new(
        cfg.agent_loop.endpoint.clone(),
        api_key,
        cfg.agent_loop.model.clone(),
        Duration::from_secs(cfg.agent_loop.request_timeout_secs),
    )?;
    let loop_config = LoopConfig::from_config(&cfg);
    let ctx = LoopContext {
        manager: &manager,
        chat: &chat,
        broker: dashboard.as_ref().map(|_| &broker),
        store: Some(&store),
    };

    install_interrupt_cleanup(&cfg)?;
    let agent = loop_config.agent_name.clone();
    let result = run_autonomous(&ctx, &task, facts, &loop_config, |event| {
        println!("{}", render_event(event, &agent));
    });
    if cfg.tmux.terminate_on_quit {
        manager.cleanup();
    }

    let outcome = result?;
    if !outcome.facts.is_empty() {
        println!(
            "Saved {} memory facts to {}",
            outcome.facts.len(),
            store.path().display()
        );
    }
    Ok(outcome.stop.exit_code())
}

fn cmd_chat(overrides: &Overrides, workdir: Option<PathBuf>) -> Result<i32> {
    let workdir = resolve_workdir(workdir)?;
    let cfg = load_settings(overrides, &workdir)?;
    let tmux = Tmux::new(cfg.tmux.socket.clone(), cfg.command_timeout());
    let manager = prepare_session(&tmux, &cfg, &workdir)?;

    println!(
        "Session {:?} is ready. Type messages and press Enter. Use {QUIT_COMMAND} to exit.",
        cfg.tmux.session
    );
    install_interrupt_cleanup(&cfg)?;
    let result = chat_loop(
        &manager,
        io::stdin().lock(),
        &mut io::stdout().lock(),
        cfg.response_timeout(),
    );
    if cfg.tmux.terminate_on_quit {
        manager.cleanup();
    }
    let summary = result?;
    info!(
        delivered = summary.delivered,
        failed = summary.failed,
        "chat ended"
    );
    Ok(exit_codes::OK)
}

fn cmd_stop(overrides: &Overrides, workdir: Option<PathBuf>) -> Result<i32> {
    let workdir = resolve_workdir(workdir)?;
    let cfg = load_settings(overrides, &workdir)?;
    let tmux = Tmux::new(cfg.tmux.socket.clone(), cfg.command_timeout());
    if !tmux.has_session(&cfg.tmux.session)? {
        println!("session {:?} is not running", cfg.tmux.session);
        return Ok(exit_codes::OK);
    }
    tmux.kill_session(&cfg.tmux.session)
        .with_context(|| format!("kill session {}", cfg.tmux.session))?;
    println!("stopped session {:?}", cfg.tmux.session);
    Ok(exit_codes::OK)
}

/// Working directory from the argument or the current directory.
fn resolve_workdir(arg: Option<PathBuf>) -> Result<PathBuf> {
    let raw = match arg {
        Some(path) => path,
        None => std::env::current_dir().context("resolve working directory")?,
    };
    let path = raw
        .canonicalize()
        .with_context(|| format!("working directory does not exist: {}", raw.display()))?;
    if !path.is_dir() {
        bail!("working directory is not a directory: {}", path.display());
    }
    Ok(path)
}

fn load_settings(overrides: &Overrides, workdir: &Path) -> Result<OrchestratorConfig> {
    let path = overrides
        .config
        .clone()
        .unwrap_or_else(|| config_path(workdir));
    let mut cfg = load_config(&path)?;
    apply_overrides(&mut cfg, overrides);
    cfg.validate().context("invalid settings")?;
    Ok(cfg)
}

fn apply_overrides(cfg: &mut OrchestratorConfig, overrides: &Overrides) {
    if let Some(session) = &overrides.session {
        cfg.tmux.session.clone_from(session);
    }
    if let Some(socket) = &overrides.socket {
        cfg.tmux.socket.clone_from(socket);
    }
    if let Some(command) = &overrides.agent_command {
        cfg.tmux.command.clone_from(command);
    }
    if let Some(model) = &overrides.agent_model {
        cfg.tmux.agent_model.clone_from(model);
    }
    if let Some(model) = &overrides.model {
        cfg.agent_loop.model.clone_from(model);
    }
    if let Some(max_iterations) = overrides.max_iterations {
        cfg.agent_loop.max_iterations = max_iterations;
    }
    if let Some(max_facts) = overrides.max_facts.filter(|n| *n > 0) {
        cfg.agent_loop.max_facts = max_facts;
    }
    if let Some(enabled) = overrides.dashboard {
        cfg.dashboard.enabled = enabled;
    }
    if let Some(port) = overrides.dashboard_port {
        cfg.dashboard.port = port;
    }
    if let Some(open) = overrides.open_dashboard {
        cfg.dashboard.open = open;
    }
    if let Some(terminate) = overrides.terminate_on_quit {
        cfg.tmux.terminate_on_quit = terminate;
    }
}

/// Resolve the agent command and bring the session up before any mode starts.
fn prepare_session<'m>(
    tmux: &'m Tmux,
    cfg: &OrchestratorConfig,
    workdir: &Path,
) -> Result<SessionManager<'m, Tmux>> {
    let profile = cfg.agent_profile();
    let command = resolve_startup_command(&profile.command).context("invalid startup command")?;
    let session = Session {
        name: cfg.tmux.session.clone(),
        workdir: workdir.to_path_buf(),
        command,
    };
    let manager = SessionManager::new(tmux, session, cfg.session_timing(), cfg.settle_timing());
    manager.ensure_ready().context("failed to prepare session")?;
    info!(agent = %profile.display_name, session = %cfg.tmux.session, "session ready");
    Ok(manager)
}

fn read_task<R: BufRead>(mut input: R) -> Result<String> {
    print!("Enter task description: ");
    io::stdout().flush().context("flush prompt")?;
    let mut line = String::new();
    if input.read_line(&mut line).context("read task")? == 0 {
        bail!("no task provided");
    }
    Ok(line.trim().to_string())
}

fn start_dashboard(cfg: &OrchestratorConfig, broker: &EventBroker) -> Option<Dashboard> {
    let options = DashboardOptions {
        bind: cfg.dashboard.bind.clone(),
        port: cfg.dashboard.port,
        ui_dir: cfg.dashboard.ui_dir.clone(),
    };
    match Dashboard::start(broker.clone(), options) {
        Ok(dashboard) => {
            let url = dashboard.url();
            println!("Dashboard: {url}");
            if cfg.dashboard.open
                && let Err(err) = open::that(&url)
            {
                warn!(err = %err, "failed to open browser");
            }
            Some(dashboard)
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "failed to start dashboard");
            None
        }
    }
}

/// On SIGINT/SIGTERM, kill the session and exit when configured to.
fn install_interrupt_cleanup(cfg: &OrchestratorConfig) -> Result<()> {
    if !cfg.tmux.terminate_on_quit {
        return Ok(());
    }
    let socket = cfg.tmux.socket.clone();
    let session = cfg.tmux.session.clone();
    let timeout = cfg.command_timeout();
    ctrlc::set_handler(move || {
        eprintln!("\nsignal received, cleaning up tmux session...");
        if let Err(err) = Tmux::new(socket.clone(), timeout).kill_session(&session) {
            warn!(err = %format!("{err:#}"), "cleanup kill failed");
        }
        std::process::exit(exit_codes::OK);
    })
    .context("install signal handler")
}
