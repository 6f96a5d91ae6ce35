//! Byte-level guarantees of the markdown source.
//!
//! Reading a document never changes it; updates touch exactly the
//! addressed line and leave every other byte as written by the human.

use agentflow::source::{MarkdownTaskSource, TaskSource};
use agentflow::{TaskId, TaskStatus};

use crate::fixtures::TestRepo;

const DOC: &str = "\
# Project tasks

Some free-form prose the engine must never touch.

## Git Worktree feature-auth {TCK-7899}

- [✅, aaaaaa, 17d16d1] Implement login endpoint {feature}
- [, bbbbbb] Add rate limiting
  with a multi-line description {chore}

## Git Worktree bugfix-cache (opencode)

- [⏰, cccccc] Fix cache invalidation

Trailing prose, also untouchable.
";

#[test]
fn read_is_a_no_op_on_disk() {
    let repo = TestRepo::new();
    let path = repo.write_tasks(DOC);
    let source = MarkdownTaskSource::new(path);

    let worktrees = source.list_worktrees().unwrap();
    assert_eq!(worktrees.len(), 2);

    assert_eq!(repo.read_tasks(), DOC);
}

#[test]
fn same_status_update_is_byte_identical() {
    let repo = TestRepo::new();
    let path = repo.write_tasks(DOC);
    let source = MarkdownTaskSource::new(path);

    source
        .update_task_status(
            "feature-auth",
            &TaskId::from("aaaaaa"),
            TaskStatus::Completed,
            None,
        )
        .unwrap();

    assert_eq!(repo.read_tasks(), DOC);
}

#[test]
fn status_update_changes_exactly_one_line() {
    let repo = TestRepo::new();
    let path = repo.write_tasks(DOC);
    let source = MarkdownTaskSource::new(path);

    source
        .update_task_status(
            "bugfix-cache",
            &TaskId::from("cccccc"),
            TaskStatus::InProgress,
            None,
        )
        .unwrap();

    let before: Vec<&str> = DOC.split('\n').collect();
    let content = repo.read_tasks();
    let after: Vec<&str> = content.split('\n').collect();
    assert_eq!(before.len(), after.len());

    let changed: Vec<usize> = before
        .iter()
        .zip(after.iter())
        .enumerate()
        .filter(|(_, (b, a))| b != a)
        .map(|(i, _)| i)
        .collect();

    assert_eq!(changed.len(), 1);
    assert_eq!(after[changed[0]], "- [🟡, cccccc] Fix cache invalidation");
}

#[test]
fn commit_sha_update_preserves_description_and_tags() {
    let repo = TestRepo::new();
    let path = repo.write_tasks(DOC);
    let source = MarkdownTaskSource::new(path);

    source
        .update_task_status(
            "feature-auth",
            &TaskId::from("bbbbbb"),
            TaskStatus::Completed,
            Some("99fe12a"),
        )
        .unwrap();

    let content = repo.read_tasks();
    assert!(content.contains("- [✅, bbbbbb, 99fe12a] Add rate limiting"));
    // Continuation line untouched.
    assert!(content.contains("  with a multi-line description {chore}"));
}

#[test]
fn parse_update_parse_agrees() {
    let repo = TestRepo::new();
    let path = repo.write_tasks(DOC);
    let source = MarkdownTaskSource::new(path);

    source
        .update_task_status(
            "feature-auth",
            &TaskId::from("bbbbbb"),
            TaskStatus::Failed,
            None,
        )
        .unwrap();

    let worktrees = source.list_worktrees().unwrap();
    let task = worktrees[0]
        .tasks
        .iter()
        .find(|t| t.id == Some(TaskId::from("bbbbbb")))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.description,
        "Add rate limiting\nwith a multi-line description"
    );
    assert_eq!(task.tags, vec!["chore"]);
}
