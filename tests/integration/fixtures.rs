//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Creating temporary git repositories
//! - Scripted mock agents that record their invocations
//! - Building effective configs pointed at temp repositories

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use agentflow::agent::{Agent, AgentResult, CommandSpec, InvocationConfig};
use agentflow::config::{merge_configs, CliConfig, EffectiveConfig, FileConfig};
use agentflow::Result;

/// A test repository with a temporary directory and initialized git.
pub struct TestRepo {
    /// The temporary directory containing the repo.
    pub temp_dir: TempDir,
    /// Path to the repository root.
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a new test repository with an initial commit.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().to_path_buf();

        Command::new("git")
            .args(["init"])
            .current_dir(&path)
            .output()
            .expect("Failed to init git");

        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(&path)
            .output()
            .expect("Failed to set user.email");

        Command::new("git")
            .args(["config", "user.name", "Test User"])
            .current_dir(&path)
            .output()
            .expect("Failed to set user.name");

        std::fs::write(path.join("README.md"), "# Test Repository\n")
            .expect("Failed to write README");

        Command::new("git")
            .args(["add", "."])
            .current_dir(&path)
            .output()
            .expect("Failed to git add");

        Command::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(&path)
            .output()
            .expect("Failed to git commit");

        Self { temp_dir, path }
    }

    /// Write a tasks file into the repository and return its path.
    pub fn write_tasks(&self, content: &str) -> PathBuf {
        let tasks_file = self.path.join("tasks.md");
        std::fs::write(&tasks_file, content).expect("Failed to write tasks file");
        tasks_file
    }

    /// Read the tasks file back.
    pub fn read_tasks(&self) -> String {
        std::fs::read_to_string(self.path.join("tasks.md")).expect("Failed to read tasks file")
    }
}

/// Build an effective config for a test repo with the mock agent selected.
pub fn test_config(repo: &TestRepo, tasks_file: &Path, testing: bool) -> EffectiveConfig {
    merge_configs(
        FileConfig::default(),
        CliConfig {
            tasks_file: tasks_file.to_path_buf(),
            project_dir: repo.path.clone(),
            sync_interval: 1,
            dry_run: false,
            single_run: true,
            install_only: false,
            testing,
            agent: Some("mock".to_string()),
            model_class: None,
            branch_prefix: Some("bots".to_string()),
            commands_namespace: None,
        },
    )
    .expect("Failed to build config")
}

/// One recorded agent invocation: the command name, or `<raw>` for the
/// free-form prompt path.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Scripted agent that records invocations and answers from a canned
/// playbook: planning commands yield an artifact path, commit commands
/// yield a commit sha, everything else plain success. Commands listed in
/// `fail_on` report failure instead.
pub struct MockAgent {
    calls: CallLog,
    fail_on: Vec<String>,
}

impl MockAgent {
    pub fn new() -> (Arc<Self>, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let agent = Arc::new(Self {
            calls: Arc::clone(&calls),
            fail_on: Vec::new(),
        });
        (agent, calls)
    }

    /// A mock that fails every command whose name is in `fail_on`.
    pub fn failing_on(fail_on: &[&str]) -> (Arc<Self>, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let agent = Arc::new(Self {
            calls: Arc::clone(&calls),
            fail_on: fail_on.iter().map(|s| s.to_string()).collect(),
        });
        (agent, calls)
    }

    fn success(output: &str, json_output: Option<serde_json::Value>) -> AgentResult {
        AgentResult {
            success: true,
            output: output.to_string(),
            exit_code: 0,
            duration: std::time::Duration::from_millis(1),
            agent_name: "mock".to_string(),
            error: None,
            json_output,
        }
    }

    fn failure(message: &str) -> AgentResult {
        AgentResult {
            success: false,
            output: String::new(),
            exit_code: 1,
            duration: std::time::Duration::from_millis(1),
            agent_name: "mock".to_string(),
            error: Some(message.to_string()),
            json_output: None,
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, _prompt: &str, _config: &InvocationConfig) -> Result<AgentResult> {
        self.calls.lock().unwrap().push("<raw>".to_string());
        Ok(Self::success("raw prompt handled", None))
    }

    async fn run_command(
        &self,
        spec: &CommandSpec,
        _config: &InvocationConfig,
    ) -> Result<AgentResult> {
        self.calls.lock().unwrap().push(spec.name.clone());

        if self.fail_on.contains(&spec.name) {
            return Ok(Self::failure("scripted failure"));
        }

        let json_output = if spec.json_output {
            match spec.name.as_str() {
                "plan" | "chore" | "feature" => {
                    Some(serde_json::json!({"path": "docs/plan.md"}))
                }
                "create-commit" | "empty-commit" => Some(serde_json::json!({
                    "commit_sha": "fake0001",
                    "commit_message": "test commit"
                })),
                _ => None,
            }
        } else {
            None
        };

        Ok(Self::success("done", json_output))
    }
}
