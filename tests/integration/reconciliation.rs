//! Reconciliation behavior across source refreshes.
//!
//! The source document is re-read on every sync while tasks are executing;
//! these tests verify that execution state survives external edits.

use agentflow::core::TaskManager;
use agentflow::source::MarkdownTaskSource;
use agentflow::{TaskId, TaskStatus};

use crate::fixtures::TestRepo;

fn manager_for(repo: &TestRepo) -> TaskManager {
    let source = MarkdownTaskSource::new(repo.path.join("tasks.md"));
    TaskManager::new(Box::new(source)).expect("manager should load")
}

#[test]
fn refresh_preserves_status_over_external_edits() {
    let repo = TestRepo::new();
    repo.write_tasks("## Git Worktree alpha\n\n- [, aaaaaa] Implement login\n");

    let mut manager = manager_for(&repo);
    manager
        .update_task_status(
            "alpha",
            &TaskId::from("aaaaaa"),
            TaskStatus::Completed,
            Some("abc1234"),
        )
        .unwrap();

    // A human edits the file: reorders, adds a task, and resets the status
    // marker of the completed task. The description is the natural key, so
    // the completed state must survive.
    repo.write_tasks(
        "## Git Worktree alpha\n\n- [] Add logout {x}\n- [, aaaaaa] Implement login\n",
    );
    manager.refresh_from_source().unwrap();

    let worktree = manager.worktree("alpha").unwrap();
    assert_eq!(worktree.tasks.len(), 2);

    let login = worktree
        .tasks
        .iter()
        .find(|t| t.description == "Implement login")
        .unwrap();
    assert_eq!(login.status, TaskStatus::Completed);
    assert_eq!(login.commit_sha, Some("abc1234".to_string()));
    assert_eq!(login.id, Some(TaskId::from("aaaaaa")));
    assert_eq!(login.sequence, 1);

    let logout = worktree
        .tasks
        .iter()
        .find(|t| t.description == "Add logout")
        .unwrap();
    assert_eq!(logout.status, TaskStatus::NotStarted);
    assert_eq!(logout.tags, vec!["x"]);
    assert_eq!(logout.sequence, 0);
}

#[test]
fn refresh_is_idempotent() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree alpha {TCK-1}\n\n- [✅, aaaaaa, abc1234] Done task\n- [] Pending task\n",
    );

    let mut manager = manager_for(&repo);
    let once = serde_json::to_string(manager.worktrees()).unwrap();

    manager.refresh_from_source().unwrap();
    let twice = serde_json::to_string(manager.worktrees()).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn refresh_drops_removed_worktrees() {
    let repo = TestRepo::new();
    repo.write_tasks("## Git Worktree alpha\n\n- [, aaaaaa] Task a\n\n## Git Worktree beta\n\n- [, bbbbbb] Task b\n");

    let mut manager = manager_for(&repo);
    assert_eq!(manager.worktrees().len(), 2);

    repo.write_tasks("## Git Worktree beta\n\n- [, bbbbbb] Task b\n");
    manager.refresh_from_source().unwrap();

    assert_eq!(manager.worktrees().len(), 1);
    assert!(manager.worktree("alpha").is_none());
    assert!(manager.worktree("beta").is_some());
}

#[test]
fn new_tasks_receive_ids_written_back() {
    let repo = TestRepo::new();
    repo.write_tasks("## Git Worktree alpha\n\n- [] Brand new task\n");

    let manager = manager_for(&repo);
    let task = &manager.worktree("alpha").unwrap().tasks[0];
    let id = task.id.clone().expect("id should be assigned on load");

    // The id is persisted into the file so the next read agrees.
    let content = repo.read_tasks();
    assert!(content.contains(&format!("- [, {}] Brand new task", id)));

    // A second load parses the same id instead of generating a new one.
    let reloaded = manager_for(&repo);
    assert_eq!(reloaded.worktree("alpha").unwrap().tasks[0].id, Some(id));
}

#[test]
fn refresh_updates_worktree_metadata() {
    let repo = TestRepo::new();
    repo.write_tasks("## Git Worktree alpha\n\n- [, aaaaaa] Task a\n");

    let mut manager = manager_for(&repo);
    assert!(manager.worktree("alpha").unwrap().external_id.is_none());

    repo.write_tasks("## Git Worktree alpha {TCK-9} (opencode)\n\n- [, aaaaaa] Task a\n");
    manager.refresh_from_source().unwrap();

    let worktree = manager.worktree("alpha").unwrap();
    assert_eq!(worktree.external_id, Some("TCK-9".to_string()));
    assert_eq!(worktree.agent, Some("opencode".to_string()));
}
