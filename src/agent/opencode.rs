//! OpenCode agent.
//!
//! Executes the `opencode` CLI with `run <prompt> --format json`. OpenCode
//! emits NDJSON: one JSON event per line, with text events carrying the
//! answer under `part.text`. Structured payloads are fenced ```json blocks
//! inside those text events.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use crate::agent::{extract_fenced_json, Agent, AgentResult, CommandSpec, InvocationConfig};
use crate::{aflog_debug, aflog_trace, Error, Result};

/// Agent implementation for the OpenCode CLI.
#[derive(Debug, Clone)]
pub struct OpenCodeAgent {
    binary: PathBuf,
}

impl OpenCodeAgent {
    pub const CLI_COMMAND: &'static str = "opencode";

    /// Create an agent, locating the `opencode` binary on PATH.
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
            "run".to_string(),
            prompt.to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = &config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(config.extra_args.iter().cloned());
        args
    }

    /// Collect the text of all text-type events, in order.
    fn text_events(stdout: &str) -> Vec<String> {
        stdout
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                serde_json::from_str::<serde_json::Value>(line).ok()
            })
            .filter(|event| event.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|event| {
                event
                    .get("part")
                    .and_then(|p| p.get("text"))
                    .and_then(|t| t.as_str())
                    .map(str::to_string)
            })
            .collect()
    }

    async fn execute(&self, prompt: &str, config: &InvocationConfig) -> Result<AgentResult> {
        aflog_debug!(
            "opencode invoking in {}: {}",
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
        aflog_trace!("opencode stdout: {}", stdout);

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

        let texts = Self::text_events(&stdout);
        let answer = if texts.is_empty() {
            stdout.trim().to_string()
        } else {
            texts.join("\n")
        };

        Ok(AgentResult {
            success: true,
            output: answer,
            exit_code: 0,
            duration,
            agent_name: self.name().to_string(),
            error: None,
            json_output: None,
        })
    }
}

#[async_trait]
impl Agent for OpenCodeAgent {
    fn name(&self) -> &str {
        "opencode"
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
