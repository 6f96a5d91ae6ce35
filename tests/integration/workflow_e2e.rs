//! Full workflow execution with a scripted mock agent.
//!
//! Each test drives `TaskHandler::handle_task` against a real temporary
//! git repository and markdown task file, asserting on the exact agent
//! invocations and the status written back to the file.

use std::sync::Arc;

use tokio::sync::Mutex;

use agentflow::agent::AgentRunner;
use agentflow::core::TaskManager;
use agentflow::git::GitOps;
use agentflow::source::MarkdownTaskSource;
use agentflow::workflow::TaskHandler;
use agentflow::{Task, Worktree};

use crate::fixtures::{test_config, CallLog, MockAgent, TestRepo};

struct Setup {
    repo: TestRepo,
    manager: Arc<Mutex<TaskManager>>,
    handler: Arc<TaskHandler>,
    calls: CallLog,
}

fn setup_with(doc: &str, testing: bool, fail_on: &[&str]) -> Setup {
    let repo = TestRepo::new();
    let tasks_file = repo.write_tasks(doc);
    let config = test_config(&repo, &tasks_file, testing);

    let source = MarkdownTaskSource::new(tasks_file);
    let manager = Arc::new(Mutex::new(
        TaskManager::new(Box::new(source)).expect("manager should load"),
    ));

    let (agent, calls) = if fail_on.is_empty() {
        MockAgent::new()
    } else {
        MockAgent::failing_on(fail_on)
    };
    let mut agents = AgentRunner::new();
    agents.register(agent);

    let handler = Arc::new(
        TaskHandler::new(config, Arc::clone(&manager), Arc::new(agents))
            .expect("handler should build"),
    );

    Setup {
        repo,
        manager,
        handler,
        calls,
    }
}

async fn first_pair(setup: &Setup) -> (Worktree, Task) {
    let manager = setup.manager.lock().await;
    let mut batch = manager.fetch_next_available(1);
    assert_eq!(batch.len(), 1, "expected one runnable task");
    batch.remove(0)
}

fn recorded_calls(setup: &Setup) -> Vec<String> {
    setup.calls.lock().unwrap().clone()
}

#[tokio::test]
async fn scenario_d_build_task_invokes_agent_exactly_twice() {
    // A second pending task keeps the publish step out of the picture.
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Build the widget {build}\n\
         - [, bbbbbb] Later task\n",
        false,
        &[],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    // Build phase then finalize phase, never a planning phase.
    assert_eq!(recorded_calls(&setup), vec!["build", "create-commit"]);

    let content = setup.repo.read_tasks();
    assert!(content.contains("- [✅, aaaaaa, fake0001] Build the widget {build}"));
}

#[tokio::test]
async fn scenario_e_testing_mode_invokes_agent_exactly_once() {
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Planned work {feature}\n\
         - [, bbbbbb] Later task\n",
        true,
        &[],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    // Tags are irrelevant in testing mode: one no-op finalize, nothing else.
    assert_eq!(recorded_calls(&setup), vec!["empty-commit"]);

    let content = setup.repo.read_tasks();
    assert!(content.contains("- [✅, aaaaaa, fake0001] Planned work {feature}"));
}

#[tokio::test]
async fn planning_variant_runs_plan_implement_finalize() {
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Ship the feature {feature}\n\
         - [, bbbbbb] Later task\n",
        false,
        &[],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    assert_eq!(
        recorded_calls(&setup),
        vec!["feature", "implement", "create-commit"]
    );
}

#[tokio::test]
async fn prompt_variant_sends_description_verbatim() {
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Just do exactly this {prompt}\n\
         - [, bbbbbb] Later task\n",
        false,
        &[],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    assert_eq!(recorded_calls(&setup), vec!["<raw>", "create-commit"]);
}

#[tokio::test]
async fn failed_phase_marks_task_failed_and_stops() {
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Build the widget {build}\n",
        false,
        &["build"],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(!setup.handler.handle_task(&worktree, &task).await);

    // The failing phase is the last invocation; no finalize, no publish.
    assert_eq!(recorded_calls(&setup), vec!["build"]);

    let content = setup.repo.read_tasks();
    assert!(content.contains("- [❌, aaaaaa] Build the widget {build}"));

    // A failed task blocks the worktree from further selection.
    let manager = setup.manager.lock().await;
    assert!(manager.fetch_next_available(5).is_empty());
}

#[tokio::test]
async fn publish_runs_once_after_last_task_completes() {
    let setup = setup_with(
        "## Git Worktree w {TCK-3}\n\n\
         - [, aaaaaa] Build the widget {build}\n",
        false,
        &[],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    assert_eq!(
        recorded_calls(&setup),
        vec!["build", "create-commit", "create-github-pr"]
    );
}

#[tokio::test]
async fn publish_failure_leaves_task_completed() {
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Build the widget {build}\n",
        false,
        &["create-github-pr"],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    let content = setup.repo.read_tasks();
    assert!(content.contains("- [✅, aaaaaa, fake0001] Build the widget {build}"));
}

#[tokio::test]
async fn handle_task_materializes_the_worktree() {
    let setup = setup_with(
        "## Git Worktree feature-auth\n\n\
         - [, aaaaaa] Build it {build}\n",
        false,
        &[],
    );

    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);

    let wt_path = setup.repo.path.join(".worktrees/feature-auth");
    assert!(wt_path.exists());
    assert_eq!(
        GitOps::current_branch(&wt_path).unwrap(),
        "bots/feature-auth"
    );

    let manager = setup.manager.lock().await;
    let stored = manager.worktree("feature-auth").unwrap();
    assert_eq!(stored.directory_path.as_deref(), Some(wt_path.as_path()));
    assert!(stored.head_sha.is_some());
}

#[tokio::test]
async fn dirty_worktree_fails_the_task_without_agent_calls() {
    let setup = setup_with(
        "## Git Worktree w\n\n\
         - [, aaaaaa] First {build}\n",
        false,
        &[],
    );

    // Materialize the worktree, then dirty it.
    let (worktree, task) = first_pair(&setup).await;
    assert!(setup.handler.handle_task(&worktree, &task).await);
    let wt_path = setup.repo.path.join(".worktrees/w");
    std::fs::write(wt_path.join("scratch.txt"), "uncommitted").unwrap();

    // Reset the task so it is selectable again.
    setup.repo.write_tasks(
        "## Git Worktree w\n\n\
         - [, aaaaaa] Second attempt {build}\n",
    );
    {
        let mut manager = setup.manager.lock().await;
        manager.refresh_from_source().unwrap();
    }

    let (worktree, task) = first_pair(&setup).await;
    let calls_before = recorded_calls(&setup).len();
    assert!(!setup.handler.handle_task(&worktree, &task).await);

    // No phase ran; the failure is recorded at the source.
    assert_eq!(recorded_calls(&setup).len(), calls_before);
    assert!(setup.repo.read_tasks().contains("❌"));
}
