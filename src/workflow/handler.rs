//! Task handler: the per-task state machine.
//!
//! `handle_task` drives one (worktree, task) pair to completion:
//! initialize the working copy, install command files, mark the task in
//! progress, run the variant's phases, and record the outcome. Every
//! failure is caught here and converted into a FAILED status plus a
//! recorded error; nothing escapes to the scheduler except the boolean.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agent::{Agent, AgentRunner, CommandSpec, InvocationConfig, ModelClass};
use crate::config::EffectiveConfig;
use crate::controller::WorktreeController;
use crate::core::manager::TaskManager;
use crate::core::task::{Task, TaskId, TaskStatus, Worktree};
use crate::installer::Installer;
use crate::util;
use crate::workflow::TaskKind;
use crate::{aflog, aflog_debug, aflog_error, aflog_warn, Error, Result};

/// Executes tasks in isolated worktrees and reports status back through
/// the task manager.
pub struct TaskHandler {
    config: EffectiveConfig,
    manager: Arc<Mutex<TaskManager>>,
    controller: Arc<WorktreeController>,
    agents: Arc<AgentRunner>,
}

impl TaskHandler {
    pub fn new(
        config: EffectiveConfig,
        manager: Arc<Mutex<TaskManager>>,
        agents: Arc<AgentRunner>,
    ) -> Result<Self> {
        let controller = Arc::new(WorktreeController::new(config.clone())?);
        Ok(Self {
            config,
            manager,
            controller,
            agents,
        })
    }

    /// The agent serving this worktree: its own override, or the default.
    fn effective_agent(&self, worktree: &Worktree) -> Result<Arc<dyn Agent>> {
        let name = worktree.agent.as_deref().unwrap_or(&self.config.agent);
        self.agents.get(name)
    }

    fn invocation_config(&self, agent_name: &str, path: &Path, model: ModelClass) -> InvocationConfig {
        InvocationConfig::new(path).with_model(&self.config.resolve_model(agent_name, model))
    }

    /// Run one structured command, wrapping any failure with the phase name.
    async fn run_spec(
        &self,
        agent: &Arc<dyn Agent>,
        path: &Path,
        spec: CommandSpec,
        phase: &str,
    ) -> Result<crate::agent::AgentResult> {
        let config = self.invocation_config(agent.name(), path, spec.model);
        aflog_debug!("Running {} phase: {}", phase, spec.to_prompt());
        let result = agent
            .run_command(&spec, &config)
            .await
            .map_err(|e| Error::phase(phase, e))?;
        if !result.success {
            return Err(Error::phase(phase, result.error_message()));
        }
        Ok(result)
    }

    /// Planning phase: produces the artifact consumed by implementation.
    async fn run_planning(
        &self,
        agent: &Arc<dyn Agent>,
        path: &Path,
        kind: TaskKind,
        reference: &str,
        task: &Task,
    ) -> Result<String> {
        let command = kind
            .planning_command()
            .ok_or_else(|| Error::phase("Planning", format!("variant '{}' has no planning command", kind)))?;
        let spec = CommandSpec::new(&self.config.commands_namespace, command, ModelClass::Thinking)
            .with_params(vec![reference.to_string(), task.description.clone()])
            .with_json_output();
        let result = self.run_spec(agent, path, spec, "Planning").await?;
        result
            .json_output
            .as_ref()
            .and_then(|v| v.get("path"))
            .and_then(|p| p.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::phase("Planning", "agent output missing artifact path"))
    }

    /// Implementation phase: consumes the planning artifact.
    async fn run_implement(
        &self,
        agent: &Arc<dyn Agent>,
        path: &Path,
        spec_path: &str,
    ) -> Result<String> {
        let spec = CommandSpec::new(
            &self.config.commands_namespace,
            "implement",
            ModelClass::Standard,
        )
        .with_params(vec![format!("@{}", spec_path)]);
        let result = self.run_spec(agent, path, spec, "Implementation").await?;
        Ok(result.output.trim().to_string())
    }

    /// Combined build phase: plans and implements in one invocation.
    async fn run_build(
        &self,
        agent: &Arc<dyn Agent>,
        path: &Path,
        reference: &str,
        task: &Task,
    ) -> Result<String> {
        let spec = CommandSpec::new(&self.config.commands_namespace, "build", ModelClass::Standard)
            .with_params(vec![reference.to_string(), task.description.clone()]);
        let result = self.run_spec(agent, path, spec, "Build").await?;
        Ok(result.output.trim().to_string())
    }

    /// Raw-prompt phase: the task description goes to the agent verbatim.
    async fn run_prompt(&self, agent: &Arc<dyn Agent>, path: &Path, task: &Task) -> Result<String> {
        let config = self.invocation_config(agent.name(), path, self.config.model_class);
        let result = agent
            .run(&task.description, &config)
            .await
            .map_err(|e| Error::phase("Prompt", e))?;
        if !result.success {
            return Err(Error::phase("Prompt", result.error_message()));
        }
        Ok(result.output.trim().to_string())
    }

    /// Finalize phase: commit the work and return the commit sha.
    async fn run_create_commit(&self, agent: &Arc<dyn Agent>, path: &Path) -> Result<Option<String>> {
        let spec = CommandSpec::new(
            &self.config.commands_namespace,
            "create-commit",
            ModelClass::Standard,
        )
        .with_json_output();
        let result = self.run_spec(agent, path, spec, "Commit").await?;
        let info = result
            .json_output
            .as_ref()
            .ok_or_else(|| Error::phase("Commit", "agent output missing commit information"))?;
        Ok(info
            .get("commit_sha")
            .and_then(|s| s.as_str())
            .map(str::to_string))
    }

    /// Test-mode finalize: record an empty commit and nothing else.
    async fn run_empty_commit(
        &self,
        agent: &Arc<dyn Agent>,
        path: &Path,
        task: &Task,
        task_id: &TaskId,
    ) -> Result<Option<String>> {
        let spec = CommandSpec::new(
            &self.config.commands_namespace,
            "empty-commit",
            ModelClass::Standard,
        )
        .with_params(vec![task_id.to_string(), task.description.clone()])
        .with_json_output();
        let result = self.run_spec(agent, path, spec, "Empty commit").await?;
        let info = result
            .json_output
            .as_ref()
            .ok_or_else(|| Error::phase("Empty commit", "agent output missing commit information"))?;
        Ok(info
            .get("commit_sha")
            .and_then(|s| s.as_str())
            .map(str::to_string))
    }

    /// Publish side effect: request external review of the finished worktree.
    async fn run_create_pr(
        &self,
        agent: &Arc<dyn Agent>,
        path: &Path,
        reference: &str,
    ) -> Result<String> {
        let spec = CommandSpec::new(
            &self.config.commands_namespace,
            "create-github-pr",
            ModelClass::Standard,
        )
        .with_params(vec![reference.to_string()]);
        let result = self.run_spec(agent, path, spec, "Publish").await?;
        Ok(result.output.trim().to_string())
    }

    /// Initialize a worktree and install its command files without running
    /// any task. Returns the number of files installed.
    pub async fn install_worktree(&self, worktree: &Worktree) -> Result<usize> {
        let controller = Arc::clone(&self.controller);
        let for_init = worktree.clone();
        let path = util::blocking(move || controller.initialize(&for_init)).await?;

        let mut worktree = worktree.clone();
        worktree.directory_path = Some(path);
        let installed = Installer::new(&self.config, &worktree).install_commands()?;
        Ok(installed.len())
    }

    /// Run the phases for one task and return the finalize commit sha.
    async fn execute(
        &self,
        worktree: &Worktree,
        task: &Task,
        task_id: &TaskId,
    ) -> Result<Option<String>> {
        // Materialize or validate the working copy.
        let controller = Arc::clone(&self.controller);
        let for_init = worktree.clone();
        let path = util::blocking(move || controller.initialize(&for_init)).await?;

        let head_sha = self.controller.head_sha(&path).ok();
        {
            let mut manager = self.manager.lock().await;
            manager.set_worktree_location(&worktree.name, path.clone(), head_sha)?;
        }

        let mut worktree = worktree.clone();
        worktree.directory_path = Some(path.clone());

        let installed = Installer::new(&self.config, &worktree).install_commands()?;
        aflog_debug!("Installed {} command files to worktree", installed.len());

        {
            let mut manager = self.manager.lock().await;
            manager.update_task_status(&worktree.name, task_id, TaskStatus::InProgress, None)?;
        }

        let agent = self.effective_agent(&worktree)?;

        if self.config.testing {
            aflog!("Testing mode enabled - creating empty commit only");
            return self.run_empty_commit(&agent, &path, task, task_id).await;
        }

        let kind = TaskKind::from_task(task);
        let reference = worktree
            .external_id
            .clone()
            .unwrap_or_else(|| task_id.to_string());

        match kind {
            TaskKind::Build => {
                self.run_build(&agent, &path, &reference, task).await?;
            }
            TaskKind::Prompt => {
                self.run_prompt(&agent, &path, task).await?;
            }
            TaskKind::Chore | TaskKind::Feature | TaskKind::Plan => {
                let spec_path = self
                    .run_planning(&agent, &path, kind, &reference, task)
                    .await?;
                self.run_implement(&agent, &path, &spec_path).await?;
            }
        }

        self.run_create_commit(&agent, &path).await
    }

    /// Publish once every task in the worktree has completed. Failures are
    /// logged and never affect the finished task.
    async fn maybe_publish(&self, worktree: &Worktree, task_id: &TaskId, path: &Path) {
        if self.config.testing {
            return;
        }

        let all_completed = {
            let manager = self.manager.lock().await;
            manager
                .worktree(&worktree.name)
                .map(Worktree::all_tasks_completed)
                .unwrap_or(false)
        };
        if !all_completed {
            return;
        }

        aflog!(
            "All tasks in worktree '{}' completed - requesting review",
            worktree.name
        );
        let reference = worktree
            .external_id
            .clone()
            .unwrap_or_else(|| task_id.to_string());

        let publish = async {
            let agent = self.effective_agent(worktree)?;
            self.run_create_pr(&agent, path, &reference).await
        };
        match publish.await {
            Ok(output) => aflog!("Review request created: {}", output),
            Err(e) => aflog_warn!(
                "Error requesting review for worktree '{}': {}",
                worktree.name,
                e
            ),
        }
    }

    /// Handle the complete workflow for one (worktree, task) pair.
    ///
    /// Returns true on success. Every failure is recorded as a FAILED task
    /// status with its error message; the boolean exists for logging only.
    pub async fn handle_task(&self, worktree: &Worktree, task: &Task) -> bool {
        let Some(task_id) = task.id.clone() else {
            aflog_error!(
                "Task '{}' in worktree '{}' has no id; skipping",
                crate::util::truncate_words(&task.description, 5),
                worktree.name
            );
            return false;
        };

        aflog!(
            "Starting task {} in worktree '{}'",
            task_id,
            worktree.name
        );

        match self.execute(worktree, task, &task_id).await {
            Ok(commit_sha) => {
                let recorded = {
                    let mut manager = self.manager.lock().await;
                    manager.update_task_status(
                        &worktree.name,
                        &task_id,
                        TaskStatus::Completed,
                        commit_sha.as_deref(),
                    )
                };
                if let Err(e) = recorded {
                    aflog_error!("Failed to record completion of task {}: {}", task_id, e);
                    return false;
                }
                aflog!("Task {} completed successfully", task_id);

                let path = self.controller.worktree_path(worktree);
                self.maybe_publish(worktree, &task_id, &path).await;
                true
            }
            Err(e) => {
                let message = e.to_string();
                aflog_error!("Error handling task {}: {}", task_id, message);
                let mut manager = self.manager.lock().await;
                if let Err(persist_err) =
                    manager.mark_task_error(&worktree.name, &task_id, &message)
                {
                    aflog_error!(
                        "Failed to record failure of task {}: {}",
                        task_id,
                        persist_err
                    );
                }
                false
            }
        }
    }
}
