//! External agent invocation.
//!
//! Agents are external CLI processes (Claude Code, OpenCode) executed one
//! structured command at a time. The engine never speaks to a model API
//! directly; each phase of a workflow is one agent invocation in the
//! worktree's directory.

pub mod claude;
pub mod opencode;
pub mod runner;

pub use claude::ClaudeCodeAgent;
pub use opencode::OpenCodeAgent;
pub use runner::AgentRunner;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default timeout for a single agent invocation (1 hour).
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Abstract model class, resolved to a concrete model name per agent
/// through the configuration's model tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    Thinking,
    Standard,
    Light,
}

impl std::fmt::Display for ModelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelClass::Thinking => write!(f, "thinking"),
            ModelClass::Standard => write!(f, "standard"),
            ModelClass::Light => write!(f, "light"),
        }
    }
}

impl std::str::FromStr for ModelClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "thinking" => Ok(ModelClass::Thinking),
            "standard" => Ok(ModelClass::Standard),
            "light" => Ok(ModelClass::Light),
            other => Err(format!(
                "unknown model class '{}' (expected thinking, standard, or light)",
                other
            )),
        }
    }
}

/// A structured command for an agent: a namespaced slash command plus
/// positional parameters.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Namespace the command lives in (e.g. `agentflow`).
    pub namespace: String,
    /// Command name (e.g. `plan`, `implement`, `create-commit`).
    pub name: String,
    /// Positional parameters, quoted into the prompt in order.
    pub params: Vec<String>,
    /// Abstract model class for this command.
    pub model: ModelClass,
    /// Whether to extract a fenced JSON payload from the agent's answer.
    pub json_output: bool,
}

impl CommandSpec {
    pub fn new(namespace: &str, name: &str, model: ModelClass) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            params: Vec::new(),
            model,
            json_output: false,
        }
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Render the command as a slash-command prompt:
    /// `/<namespace>:<name> "param1" "param2"`. Quotes inside parameters
    /// are escaped so they survive the agent's own prompt parsing.
    pub fn to_prompt(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("\"{}\"", p.replace('"', "\\\"").replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(" ");
        format!("/{}:{} {}", self.namespace, self.name, params)
            .trim_end()
            .to_string()
    }
}

/// Execution parameters for one invocation.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    /// Concrete model name, already resolved for the target agent.
    pub model: Option<String>,
    /// Working directory the agent runs in (the worktree).
    pub working_dir: PathBuf,
    /// Maximum duration for the invocation.
    pub timeout: Duration,
    /// Skip interactive permission prompts (automated workflows).
    pub skip_permissions: bool,
    /// Extra CLI arguments appended verbatim.
    pub extra_args: Vec<String>,
}

impl InvocationConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            model: None,
            working_dir: working_dir.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            skip_permissions: true,
            extra_args: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// The agent's textual answer.
    pub output: String,
    /// Process exit code.
    pub exit_code: i32,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
    /// Name of the agent that produced this result.
    pub agent_name: String,
    /// Error message when the invocation failed.
    pub error: Option<String>,
    /// Structured payload extracted from the answer, when requested.
    pub json_output: Option<serde_json::Value>,
}

impl AgentResult {
    /// Get the error message, falling back to a generic exit-code message.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("Process exited with code {}", self.exit_code))
    }
}

/// Interface for all agents.
///
/// `run` takes a free-form instruction (the raw-prompt workflow variant);
/// `run_command` renders a [`CommandSpec`] into the agent's slash-command
/// syntax and extracts structured output when the spec requests it.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent identifier (e.g. `claude-code`).
    fn name(&self) -> &str;

    /// Execute the agent with a free-form instruction.
    async fn run(&self, prompt: &str, config: &InvocationConfig) -> Result<AgentResult>;

    /// Execute the agent with a structured command.
    async fn run_command(
        &self,
        spec: &CommandSpec,
        config: &InvocationConfig,
    ) -> Result<AgentResult>;
}

/// Extract the first fenced ```json block from a text answer.
///
/// Returns `None` when no block is present or the block does not parse;
/// callers that need the payload treat that as a phase failure.
pub fn extract_fenced_json(text: &str) -> Option<serde_json::Value> {
    let re = RegexBuilder::new(r"```json\s*\n(.*?)\n```")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap();
    let captured = re.captures(text)?;
    serde_json::from_str(captured.get(1).unwrap().as_str().trim()).ok()
}
