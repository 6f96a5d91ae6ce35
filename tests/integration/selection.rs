//! Batch selection behavior over real markdown documents.

use agentflow::core::TaskManager;
use agentflow::source::MarkdownTaskSource;
use agentflow::TaskStatus;

use crate::fixtures::TestRepo;

fn manager_for(repo: &TestRepo) -> TaskManager {
    let source = MarkdownTaskSource::new(repo.path.join("tasks.md"));
    TaskManager::new(Box::new(source)).expect("manager should load")
}

#[test]
fn scenario_a_selects_first_runnable_after_completed_prefix() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree alpha\n\n\
         - [✅, aaaaaa, abc1234] First task\n\
         - [, bbbbbb] Second task\n\
         - [, cccccc] Third task\n",
    );

    let manager = manager_for(&repo);
    let batch = manager.fetch_next_available(5);

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].0.name, "alpha");
    assert_eq!(batch[0].1.description, "Second task");
}

#[test]
fn scenario_b_failed_predecessor_blocks_worktree() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree beta\n\n\
         - [✅, aaaaaa] First task\n\
         - [❌, bbbbbb] Second task\n\
         - [, cccccc] Third task\n",
    );

    let manager = manager_for(&repo);
    assert!(manager.fetch_next_available(5).is_empty());
}

#[test]
fn selection_respects_sequence_ordering() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree w\n\n\
         - [✅, aaaaaa] One\n\
         - [✅, bbbbbb] Two\n\
         - [, cccccc] Three\n\
         - [, dddddd] Four\n",
    );

    let manager = manager_for(&repo);
    let batch = manager.fetch_next_available(5);

    // The selected task's predecessors are all completed.
    assert_eq!(batch.len(), 1);
    let selected = &batch[0].1;
    assert_eq!(selected.description, "Three");
    let worktree = manager.worktree("w").unwrap();
    for task in &worktree.tasks {
        if task.sequence < selected.sequence {
            assert_eq!(task.status, TaskStatus::Completed);
        }
    }
}

#[test]
fn at_most_one_task_per_worktree() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree solo\n\n\
         - [, aaaaaa] One\n\
         - [, bbbbbb] Two\n\
         - [, cccccc] Three\n",
    );

    let manager = manager_for(&repo);
    let batch = manager.fetch_next_available(5);

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].1.description, "One");
}

#[test]
fn count_caps_across_worktrees_in_order() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree one\n\n- [, aaaaaa] A\n\n\
         ## Git Worktree two\n\n- [, bbbbbb] B\n\n\
         ## Git Worktree three\n\n- [, cccccc] C\n",
    );

    let manager = manager_for(&repo);
    let batch = manager.fetch_next_available(2);

    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].0.name, "one");
    assert_eq!(batch[1].0.name, "two");

    let names: Vec<&str> = batch.iter().map(|(w, _)| w.name.as_str()).collect();
    let mut deduped = names.clone();
    deduped.dedup();
    assert_eq!(names, deduped);
}

#[test]
fn blocked_task_is_selectable_once_predecessors_complete() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree w\n\n\
         - [✅, aaaaaa] One\n\
         - [⏰, bbbbbb] Two\n",
    );

    let manager = manager_for(&repo);
    let batch = manager.fetch_next_available(5);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].1.description, "Two");
}

#[test]
fn in_progress_candidate_yields_nothing() {
    let repo = TestRepo::new();
    repo.write_tasks(
        "## Git Worktree w\n\n\
         - [🟡, aaaaaa] One\n\
         - [, bbbbbb] Two\n",
    );

    let manager = manager_for(&repo);
    assert!(manager.fetch_next_available(5).is_empty());
}
