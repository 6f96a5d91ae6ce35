//! Claude Code headless agent.
//!
//! Executes the `claude` CLI in non-interactive mode (`-p` flag) with JSON
//! output and parses the response envelope. The textual answer lives in the
//! envelope's `result` field; structured payloads are fenced ```json blocks
//! inside that answer.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::agent::{extract_fenced_json, Agent, AgentResult, CommandSpec, InvocationConfig};
use crate::{aflog_debug, aflog_trace, Error, Result};

/// Envelope returned by `claude -p --output-format json`.
#[derive(Debug, Deserialize)]
struct RawClaudeResponse {
    subtype: Option<String>,
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Agent implementation for the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCodeAgent {
    binary: PathBuf,
}

impl ClaudeCodeAgent {
    pub const CLI_COMMAND: &'static str = "claude";

    /// Create an agent, locating the `claude` binary on PATH.
    pub fn new() -> Result<Self> {
        let binary = which::which(Self::CLI_COMMAND)
            .map_err(|_| Error::AgentNotAvailable(Self::CLI_COMMAND.to_string()))?;
        Ok(Self { binary })
    }

    /// Create an agent with an explicit binary path (tests, non-standard installs).
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn build_args(&self, prompt: &str, config: &InvocationConfig) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            prompt.to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if config.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.extend(config.extra_args.iter().cloned());
        args
    }

    /// Pull the textual answer out of the JSON envelope. Falls back to the
    /// raw stdout when the envelope does not parse.
    fn answer_text(stdout: &str) -> (String, Option<String>) {
        match serde_json::from_str::<RawClaudeResponse>(stdout) {
            Ok(raw) => match raw.subtype.as_deref() {
                Some("error") => (
                    raw.result.clone().unwrap_or_default(),
                    Some(raw.error.or(raw.result).unwrap_or_default()),
                ),
                _ => (raw.result.unwrap_or_default(), raw.error),
            },
            Err(_) => (stdout.trim().to_string(), None),
        }
    }

    async fn execute(&self, prompt: &str, config: &InvocationConfig) -> Result<AgentResult> {
        aflog_debug!(
            "claude-code invoking in {}: {}",
            config.working_dir.display(),
            prompt
        );
        let start = Instant::now();

        let output = tokio::time::timeout(
            config.timeout,
            Command::new(&self.binary)
                .args(self.build_args(prompt, config))
                .current_dir(&config.working_dir)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout(config.timeout))?
        .map_err(Error::Io)?;

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        aflog_trace!("claude-code stdout: {}", stdout);

        if !output.status.success() {
            let error = if stderr.trim().is_empty() {
                format!(
                    "Process exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Ok(AgentResult {
                success: false,
                output: stdout.trim().to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                duration,
                agent_name: self.name().to_string(),
                error: Some(error),
                json_output: None,
            });
        }

        let (answer, error) = Self::answer_text(&stdout);
        Ok(AgentResult {
            success: error.is_none(),
            output: answer,
            exit_code: 0,
            duration,
            agent_name: self.name().to_string(),
            error,
            json_output: None,
        })
    }
}

#[async_trait]
impl Agent for ClaudeCodeAgent {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn run(&self, prompt: &str, config: &InvocationConfig) -> Result<AgentResult> {
        self.execute(prompt, config).await
    }

    async fn run_command(
        &self,
        spec: &CommandSpec,
        config: &InvocationConfig,
    ) -> Result<AgentResult> {
        let mut result = self.execute(&spec.to_prompt(), config).await?;
        if spec.json_output && result.success {
            result.json_output = extract_fenced_json(&result.output);
        }
        Ok(result)
    }
}
