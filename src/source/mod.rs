//! Task source adapters.
//!
//! A task source is the external, human-editable record of worktrees and
//! tasks. The engine treats it as the durable source of truth: it re-reads
//! the whole document on every sync and writes status changes back through
//! the narrow interface below.

pub mod markdown;

pub use markdown::MarkdownTaskSource;

use crate::core::task::{TaskId, TaskStatus, Worktree};
use crate::Result;

/// Interface for reading and updating the external task list.
///
/// All writes must be idempotent under retry: re-applying the same status
/// update or id assignment leaves the document unchanged.
pub trait TaskSource: Send + Sync {
    /// Read all worktrees with their tasks from the source.
    fn list_worktrees(&self) -> Result<Vec<Worktree>>;

    /// Update the status (and optionally the commit sha) of one task.
    fn update_task_status(
        &self,
        worktree_name: &str,
        task_id: &TaskId,
        status: TaskStatus,
        commit_sha: Option<&str>,
    ) -> Result<()>;

    /// Write a generated task id back to the source. The task is addressed
    /// by its sequence position because, by definition, it has no id yet.
    fn assign_task_id(&self, worktree_name: &str, sequence: usize, task_id: &TaskId)
        -> Result<()>;

    /// Mark a task as failed with an error message.
    fn mark_task_error(&self, worktree_name: &str, task_id: &TaskId, error_msg: &str)
        -> Result<()>;
}
