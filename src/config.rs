//! Layered configuration.
//!
//! Three layers with precedence CLI > config file > defaults, merged once
//! at startup into an [`EffectiveConfig`] that is passed explicitly into
//! every component constructor. The file config lives in
//! `.agentflow.toml` (or `agentflow.toml`), discovered upward from the
//! project directory to the git root.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::ModelClass;
use crate::{aflog_debug, Error, Result};

/// Model mappings for a single agent: one concrete model identifier per
/// abstract model class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentModels {
    pub thinking: String,
    pub standard: String,
    pub light: String,
}

impl AgentModels {
    /// Resolve an abstract model class to this agent's concrete model name.
    pub fn model_for(&self, class: ModelClass) -> &str {
        match class {
            ModelClass::Thinking => &self.thinking,
            ModelClass::Standard => &self.standard,
            ModelClass::Light => &self.light,
        }
    }
}

/// System-wide configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Directory (relative to the project root) where worktrees are created.
    pub worktrees: String,
    /// Maximum number of tasks executed concurrently per iteration.
    pub concurrent_tasks: usize,
    /// Default agent name.
    pub agent: String,
    /// Default abstract model class.
    pub model_class: String,
    /// Branch name prefix; falls back to the git user name when unset.
    pub branch_prefix: Option<String>,
    /// Namespace for agent slash commands.
    pub commands_namespace: String,
    /// Per-agent model tables.
    pub agents: HashMap<String, AgentModels>,
}

impl Default for FileConfig {
    fn default() -> Self {
        let mut agents = HashMap::new();
        agents.insert(
            "claude-code".to_string(),
            AgentModels {
                thinking: "opus".to_string(),
                standard: "sonnet".to_string(),
                light: "haiku".to_string(),
            },
        );
        agents.insert(
            "opencode".to_string(),
            AgentModels {
                thinking: "github-copilot/claude-opus-4.5".to_string(),
                standard: "github-copilot/claude-sonnet-4.5".to_string(),
                light: "github-copilot/claude-haiku-4.5".to_string(),
            },
        );
        Self {
            worktrees: ".worktrees".to_string(),
            concurrent_tasks: 5,
            agent: "claude-code".to_string(),
            model_class: "standard".to_string(),
            branch_prefix: None,
            commands_namespace: "agentflow".to_string(),
            agents,
        }
    }
}

impl FileConfig {
    /// Load from a TOML file. Missing file is an error; use
    /// [`FileConfig::discover`] + default fallback for the optional path.
    pub fn load(path: &Path) -> Result<Self> {
        aflog_debug!("FileConfig::load path={}", path.display());
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        if config.concurrent_tasks == 0 {
            return Err(Error::Validation(
                "concurrent-tasks must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    /// Find a config file by walking up from `start_dir`, stopping at the
    /// git repository root or the filesystem root. `.agentflow.toml` wins
    /// over `agentflow.toml` in the same directory.
    pub fn discover(start_dir: &Path) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();
        loop {
            for name in [".agentflow.toml", "agentflow.toml"] {
                let candidate = current.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            if current.join(".git").exists() {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        None
    }
}

/// Runtime configuration from command-line arguments.
///
/// Optional fields override the file config when set.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub tasks_file: PathBuf,
    pub project_dir: PathBuf,
    pub sync_interval: u64,
    pub dry_run: bool,
    pub single_run: bool,
    pub install_only: bool,
    pub testing: bool,
    pub agent: Option<String>,
    pub model_class: Option<String>,
    pub branch_prefix: Option<String>,
    pub commands_namespace: Option<String>,
}

/// Final resolved configuration passed into every component.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    // From the file config
    pub worktrees: String,
    pub concurrent_tasks: usize,
    pub agents: HashMap<String, AgentModels>,

    // From the CLI
    pub tasks_file: PathBuf,
    pub project_dir: PathBuf,
    pub sync_interval: u64,
    pub dry_run: bool,
    pub single_run: bool,
    pub install_only: bool,
    pub testing: bool,

    // Resolved values (after precedence)
    pub agent: String,
    pub model_class: ModelClass,
    pub branch_prefix: Option<String>,
    pub commands_namespace: String,
}

/// Merge the file config and CLI config with precedence CLI > file.
pub fn merge_configs(file: FileConfig, cli: CliConfig) -> Result<EffectiveConfig> {
    let agent = cli.agent.unwrap_or(file.agent);
    let model_class: ModelClass = cli
        .model_class
        .unwrap_or(file.model_class)
        .parse()
        .map_err(Error::Validation)?;
    let branch_prefix = cli.branch_prefix.or(file.branch_prefix);
    let commands_namespace = cli.commands_namespace.unwrap_or(file.commands_namespace);

    Ok(EffectiveConfig {
        worktrees: file.worktrees,
        concurrent_tasks: file.concurrent_tasks,
        agents: file.agents,
        tasks_file: cli.tasks_file,
        project_dir: cli.project_dir,
        sync_interval: cli.sync_interval,
        dry_run: cli.dry_run,
        single_run: cli.single_run,
        install_only: cli.install_only,
        testing: cli.testing,
        agent,
        model_class,
        branch_prefix,
        commands_namespace,
    })
}

impl EffectiveConfig {
    /// Model table for the given agent name.
    pub fn models_for(&self, agent: &str) -> Option<&AgentModels> {
        self.agents.get(agent)
    }

    /// Resolve an abstract model class to a concrete model name for the
    /// given agent. An agent without a model table gets the class name
    /// as-is and may apply its own default.
    pub fn resolve_model(&self, agent: &str, class: ModelClass) -> String {
        match self.models_for(agent) {
            Some(models) => models.model_for(class).to_string(),
            None => class.to_string(),
        }
    }

    /// Absolute path of the directory holding all worktrees.
    pub fn worktrees_dir(&self) -> PathBuf {
        self.project_dir.join(&self.worktrees)
    }
}
