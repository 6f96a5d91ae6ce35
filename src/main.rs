use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use agentflow::agent::AgentRunner;
use agentflow::config::{merge_configs, CliConfig, FileConfig};
use agentflow::core::TaskManager;
use agentflow::scheduler::Scheduler;
use agentflow::source::MarkdownTaskSource;
use agentflow::workflow::TaskHandler;
use agentflow::{aflog, aflog_error, aflog_warn, Error, Result};

/// Agentflow - task list driven agent orchestrator over git worktrees
#[derive(Parser, Debug)]
#[command(name = "agentflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    AGENTFLOW_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Path to the tasks markdown file (must exist and have .md extension)
    #[arg(long)]
    pub tasks_file: PathBuf,

    /// Root directory of the project for which workflows are started
    #[arg(long)]
    pub project_dir: PathBuf,

    /// Path to the config file (default: discover .agentflow.toml upward)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interval in seconds between task processing runs
    #[arg(long, default_value_t = 30)]
    pub sync_interval: u64,

    /// Run in read-only mode without executing operations
    #[arg(long)]
    pub dry_run: bool,

    /// Run once and exit instead of continuous scheduling
    #[arg(long)]
    pub single_run: bool,

    /// Initialize worktrees and install command files, then exit
    #[arg(long)]
    pub install_only: bool,

    /// Testing mode: skip all phases except a no-op empty commit
    #[arg(long)]
    pub testing: bool,

    /// Agent override (default from config: claude-code)
    #[arg(long)]
    pub agent: Option<String>,

    /// Model class override: thinking, standard, or light
    #[arg(long)]
    pub model_class: Option<String>,

    /// Branch prefix override (default: git user name)
    #[arg(long)]
    pub branch_prefix: Option<String>,

    /// Namespace override for agent slash commands
    #[arg(long)]
    pub namespace: Option<String>,

    /// Enable debug logging (writes to ~/.agentflow/agentflow.log)
    #[arg(short = 'd', long)]
    pub debug: bool,
}

/// Validate the required paths, resolving them to absolute form.
fn validate_cli(cli: &Cli) -> Result<(PathBuf, PathBuf)> {
    if !cli.tasks_file.exists() {
        return Err(Error::Validation(format!(
            "Tasks file does not exist: {}",
            cli.tasks_file.display()
        )));
    }
    if cli.tasks_file.extension().and_then(|e| e.to_str()) != Some("md") {
        return Err(Error::Validation(format!(
            "Tasks file must be a .md file: {}",
            cli.tasks_file.display()
        )));
    }
    if !cli.project_dir.is_dir() {
        return Err(Error::Validation(format!(
            "Project directory does not exist: {}",
            cli.project_dir.display()
        )));
    }
    Ok((
        cli.tasks_file.canonicalize()?,
        cli.project_dir.canonicalize()?,
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let (tasks_file, project_dir) = validate_cli(&cli)?;

    // Load the file config: explicit path, discovery, or defaults.
    let config_path = cli.config.clone().or_else(|| FileConfig::discover(&project_dir));
    let file_config = match &config_path {
        Some(path) => match FileConfig::load(path) {
            Ok(config) => {
                aflog!("Loaded config from: {}", path.display());
                config
            }
            Err(e) => {
                aflog_warn!("Failed to load config from {}: {}", path.display(), e);
                aflog_warn!("Using default configuration");
                FileConfig::default()
            }
        },
        None => {
            aflog!("No config file found, using defaults");
            FileConfig::default()
        }
    };

    let cli_config = CliConfig {
        tasks_file,
        project_dir,
        sync_interval: cli.sync_interval,
        dry_run: cli.dry_run,
        single_run: cli.single_run,
        install_only: cli.install_only,
        testing: cli.testing,
        agent: cli.agent,
        model_class: cli.model_class,
        branch_prefix: cli.branch_prefix,
        commands_namespace: cli.namespace,
    };
    let config = merge_configs(file_config, cli_config)?;

    aflog!("Starting task processing");
    aflog!("Tasks file: {}", config.tasks_file.display());
    aflog!("Project dir: {}", config.project_dir.display());
    aflog!("Sync interval: {}s", config.sync_interval);
    aflog!("Dry run: {}", config.dry_run);
    aflog!("Single run: {}", config.single_run);
    aflog!("Agent: {}", config.agent);
    aflog!("Concurrent tasks: {}", config.concurrent_tasks);

    let source = MarkdownTaskSource::new(config.tasks_file.clone());
    let manager = TaskManager::new(Box::new(source))?;
    aflog!(
        "Initialized task manager with {} worktrees",
        manager.worktrees().len()
    );
    let manager = Arc::new(Mutex::new(manager));

    let agents = Arc::new(AgentRunner::with_builtin_agents());
    let handler = Arc::new(TaskHandler::new(
        config.clone(),
        Arc::clone(&manager),
        agents,
    )?);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let scheduler = Scheduler::new(config.clone(), manager, handler, shutdown);
    if config.install_only {
        scheduler.run_install_only().await
    } else {
        scheduler.run().await
    }
}

/// Cancel the shutdown token on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        aflog_error!("Failed to install SIGTERM handler: {}", e);
                        let _ = ctrl_c.await;
                        shutdown.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => aflog!("Received SIGINT, shutting down gracefully..."),
                _ = sigterm.recv() => aflog!("Received SIGTERM, shutting down gracefully..."),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            aflog!("Received Ctrl-C, shutting down gracefully...");
        }
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    agentflow::log::init_with_debug(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            aflog_error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
