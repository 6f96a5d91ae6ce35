//! Task manager: reconciliation against the source and batch selection.
//!
//! The manager owns the in-memory worktree list. Every sync re-reads the
//! whole source document and merges it into memory with equivalence rules
//! (worktrees match by name, tasks by description) so execution state
//! survives external edits. Selection walks the reconciled worktrees and
//! returns at most one runnable task per worktree.

use std::collections::HashMap;

use crate::core::task::{Task, TaskId, TaskStatus, Worktree};
use crate::source::TaskSource;
use crate::{aflog_debug, Error, Result};

/// Reconcile one worktree's task list against a fresh source snapshot.
///
/// Tasks are matched by description. A matched task keeps `status`,
/// `commit_sha`, and `id` from the existing entry (execution state must not
/// be lost) and takes `description`, `tags`, and `sequence` from the
/// incoming entry (definitions may be edited externally). Unmatched
/// incoming tasks pass through unchanged; existing tasks absent from the
/// snapshot are dropped. Output order follows the snapshot.
pub fn reconcile_tasks(existing: &[Task], incoming: Vec<Task>) -> Vec<Task> {
    let existing_by_desc: HashMap<&str, &Task> = existing
        .iter()
        .map(|t| (t.description.as_str(), t))
        .collect();

    incoming
        .into_iter()
        .map(|source_task| match existing_by_desc.get(source_task.description.as_str()) {
            Some(prior) => Task {
                id: prior.id.clone(),
                status: prior.status,
                commit_sha: prior.commit_sha.clone(),
                description: source_task.description,
                tags: source_task.tags,
                sequence: source_task.sequence,
            },
            None => source_task,
        })
        .collect()
}

/// Reconcile the in-memory worktree list against a fresh source snapshot.
///
/// Worktrees are matched by name. Matched worktrees refresh `external_id`
/// and `agent` from the snapshot, keep the existing `directory_path` and
/// `head_sha` unless the snapshot supplies a differing non-null value, and
/// reconcile their task lists. New worktrees are adopted as-is; worktrees
/// absent from the snapshot are dropped. The same procedure serves initial
/// load (empty `existing`) and every later refresh.
pub fn reconcile_worktrees(existing: &[Worktree], incoming: Vec<Worktree>) -> Vec<Worktree> {
    let existing_by_name: HashMap<&str, &Worktree> =
        existing.iter().map(|w| (w.name.as_str(), w)).collect();

    incoming
        .into_iter()
        .map(|source_wt| match existing_by_name.get(source_wt.name.as_str()) {
            Some(prior) => Worktree {
                name: source_wt.name,
                external_id: source_wt.external_id,
                agent: source_wt.agent,
                tasks: reconcile_tasks(&prior.tasks, source_wt.tasks),
                directory_path: source_wt
                    .directory_path
                    .or_else(|| prior.directory_path.clone()),
                head_sha: source_wt.head_sha.or_else(|| prior.head_sha.clone()),
            },
            None => source_wt,
        })
        .collect()
}

/// Owns the in-memory task store and coordinates with the task source.
pub struct TaskManager {
    source: Box<dyn TaskSource>,
    worktrees: Vec<Worktree>,
}

impl TaskManager {
    /// Create a manager and perform the initial load from the source.
    pub fn new(source: Box<dyn TaskSource>) -> Result<Self> {
        let mut manager = Self {
            source,
            worktrees: Vec::new(),
        };
        manager.refresh_from_source()?;
        Ok(manager)
    }

    /// Re-read the source and reconcile it into the in-memory state, then
    /// assign ids to any tasks that do not have one yet.
    pub fn refresh_from_source(&mut self) -> Result<()> {
        let snapshot = self.source.list_worktrees()?;
        self.worktrees = reconcile_worktrees(&self.worktrees, snapshot);
        self.assign_missing_ids()?;
        Ok(())
    }

    /// Generate ids for id-less tasks and write them back to the source.
    /// Tasks that already carry an id are never touched.
    fn assign_missing_ids(&mut self) -> Result<()> {
        for worktree in &mut self.worktrees {
            for task in &mut worktree.tasks {
                if task.id.is_none() {
                    let id = TaskId::generate();
                    aflog_debug!(
                        "Assigning id {} to task at sequence {} in worktree '{}'",
                        id,
                        task.sequence,
                        worktree.name
                    );
                    self.source
                        .assign_task_id(&worktree.name, task.sequence, &id)?;
                    task.id = Some(id);
                }
            }
        }
        Ok(())
    }

    /// All worktrees, in source order.
    pub fn worktrees(&self) -> &[Worktree] {
        &self.worktrees
    }

    /// Look up a worktree by name.
    pub fn worktree(&self, name: &str) -> Option<&Worktree> {
        self.worktrees.iter().find(|w| w.name == name)
    }

    fn worktree_mut(&mut self, name: &str) -> Result<&mut Worktree> {
        self.worktrees
            .iter_mut()
            .find(|w| w.name == name)
            .ok_or_else(|| Error::WorktreeNotFound(name.to_string()))
    }

    /// Record the materialized location of a worktree's working copy.
    pub fn set_worktree_location(
        &mut self,
        name: &str,
        directory_path: std::path::PathBuf,
        head_sha: Option<String>,
    ) -> Result<()> {
        let worktree = self.worktree_mut(name)?;
        worktree.directory_path = Some(directory_path);
        if head_sha.is_some() {
            worktree.head_sha = head_sha;
        }
        Ok(())
    }

    /// Update a task's status in memory and persist it to the source.
    pub fn update_task_status(
        &mut self,
        worktree_name: &str,
        task_id: &TaskId,
        status: TaskStatus,
        commit_sha: Option<&str>,
    ) -> Result<()> {
        let worktree = self.worktree_mut(worktree_name)?;
        let task = worktree
            .task_by_id_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound {
                worktree: worktree_name.to_string(),
                task_id: task_id.to_string(),
            })?;

        task.status = status;
        if let Some(sha) = commit_sha {
            task.commit_sha = Some(sha.to_string());
        }

        self.source
            .update_task_status(worktree_name, task_id, status, commit_sha)
    }

    /// Mark a task failed and record the error at the source.
    pub fn mark_task_error(
        &mut self,
        worktree_name: &str,
        task_id: &TaskId,
        error_msg: &str,
    ) -> Result<()> {
        let worktree = self.worktree_mut(worktree_name)?;
        let task = worktree
            .task_by_id_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound {
                worktree: worktree_name.to_string(),
                task_id: task_id.to_string(),
            })?;
        task.status = TaskStatus::Failed;

        self.source
            .mark_task_error(worktree_name, task_id, error_msg)
    }

    /// Select the next batch of runnable (worktree, task) pairs.
    ///
    /// At most one pair per worktree, at most `count` pairs total, in
    /// worktree iteration order. Within a worktree the candidate is the
    /// first task (ascending sequence) whose predecessors have all
    /// completed; it is emitted only when it is itself still runnable
    /// (not started, or blocked purely on precedence). A worktree whose
    /// candidate is in progress or failed contributes nothing.
    ///
    /// Returned values are clones captured at selection time; callers must
    /// report outcomes back through [`TaskManager::update_task_status`]
    /// rather than mutating them.
    pub fn fetch_next_available(&self, count: usize) -> Vec<(Worktree, Task)> {
        let mut available = Vec::new();

        for worktree in &self.worktrees {
            if available.len() >= count {
                break;
            }
            if let Some(task) = Self::next_eligible_task(worktree) {
                available.push((worktree.clone(), task.clone()));
            }
        }

        available
    }

    /// Find the runnable task in a worktree, if any.
    fn next_eligible_task(worktree: &Worktree) -> Option<&Task> {
        let candidate = worktree
            .tasks
            .iter()
            .find(|t| t.status != TaskStatus::Completed)?;
        candidate.is_selectable().then_some(candidate)
    }
}
