//! Task and worktree data model.
//!
//! Tasks are the atomic units of work executed by agents. Each worktree
//! groups an ordered list of tasks that share one isolated working copy;
//! the task's `sequence` position defines its dependency order.

use crate::util::short_id;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Short opaque identifier for a task.
///
/// Assigned once (either parsed from the source or generated) and stable
/// thereafter. Six lowercase characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new short task identifier.
    pub fn generate() -> Self {
        Self(short_id())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task status in its lifecycle.
///
/// Statuses are recorded at the source; the engine only ever moves a task
/// to `InProgress`, `Completed`, or `Failed`. `NotStarted` and `Blocked`
/// are written by humans editing the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been picked up yet.
    NotStarted,
    /// Task is waiting on its predecessors.
    Blocked,
    /// Task is currently being executed by an agent.
    InProgress,
    /// Task completed successfully.
    Completed,
    /// Task failed with an error.
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::NotStarted => write!(f, "not_started"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A single task within a worktree.
///
/// `description` is the natural key within a worktree: reconciliation
/// matches tasks by description so execution state survives external
/// edits to the rest of the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Short opaque identifier; `None` until assigned.
    pub id: Option<TaskId>,
    /// What the task should accomplish. Natural key within its worktree.
    pub description: String,
    /// Current execution status.
    pub status: TaskStatus,
    /// Position within the worktree, dense and increasing in source order.
    pub sequence: usize,
    /// Labels; a reserved subset selects the workflow variant.
    pub tags: Vec<String>,
    /// Commit produced when the task completed.
    pub commit_sha: Option<String>,
}

impl Task {
    /// Create a new task with the given description and sequence position.
    ///
    /// The task starts with no id, `NotStarted` status, no tags, and no
    /// commit.
    pub fn new(description: &str, sequence: usize) -> Self {
        Self {
            id: None,
            description: description.to_string(),
            status: TaskStatus::NotStarted,
            sequence,
            tags: Vec::new(),
            commit_sha: None,
        }
    }

    /// Attach tags to the task (builder style, used by parsers and tests).
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the task id (builder style).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the status (builder style).
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// A task is selectable when a human left it runnable: either not
    /// started, or blocked purely on precedence. The two are treated
    /// identically once every predecessor has completed.
    pub fn is_selectable(&self) -> bool {
        matches!(self.status, TaskStatus::NotStarted | TaskStatus::Blocked)
    }

    /// Check if the task is in a terminal state (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A named git worktree containing an ordered list of tasks.
///
/// The worktree name is the natural key across the whole engine. The
/// isolated working copy is materialized lazily by the controller, which
/// fills in `directory_path` and `head_sha`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worktree {
    /// Unique name across the engine.
    pub name: String,
    /// Optional external label (e.g. a ticket id) used for branch naming
    /// and correlation, not identity.
    pub external_id: Option<String>,
    /// Optional agent override for this worktree; beats the engine default.
    pub agent: Option<String>,
    /// Tasks ordered by `sequence`.
    pub tasks: Vec<Task>,
    /// Filesystem location of the working copy once materialized.
    pub directory_path: Option<PathBuf>,
    /// Tip commit of the working copy once materialized.
    pub head_sha: Option<String>,
}

impl Worktree {
    /// Create a new worktree with the given name and no tasks.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_id: None,
            agent: None,
            tasks: Vec::new(),
            directory_path: None,
            head_sha: None,
        }
    }

    /// Set the external id (builder style).
    pub fn with_external_id(mut self, id: &str) -> Self {
        self.external_id = Some(id.to_string());
        self
    }

    /// Set the agent override (builder style).
    pub fn with_agent(mut self, agent: &str) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    /// Append tasks (builder style).
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Find a task by id.
    pub fn task_by_id(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id.as_ref() == Some(id))
    }

    /// Find a task by id, mutably.
    pub fn task_by_id_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id.as_ref() == Some(id))
    }

    /// Check if every task in this worktree has completed.
    ///
    /// Returns false for an empty task list: an empty worktree has
    /// produced nothing worth publishing.
    pub fn all_tasks_completed(&self) -> bool {
        !self.tasks.is_empty()
            && self
                .tasks
                .iter()
                .all(|t| t.status == TaskStatus::Completed)
    }
}
