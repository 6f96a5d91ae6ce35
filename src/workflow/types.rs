//! Workflow variant selection.

use crate::core::task::Task;

/// The workflow variant for a task, resolved once from its reserved tag.
///
/// `Chore`, `Feature`, and `Plan` run a planning phase whose artifact feeds
/// the implementation phase. `Build` skips planning and runs one combined
/// build phase. `Prompt` bypasses the structured command contract and sends
/// the task description to the agent verbatim. Tasks without a reserved tag
/// default to `Plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Chore,
    Feature,
    Plan,
    Build,
    Prompt,
}

impl TaskKind {
    /// Resolve the variant from a task's tags. The first reserved tag wins;
    /// unknown and absent tags map to the default `Plan` variant.
    pub fn from_task(task: &Task) -> Self {
        for tag in &task.tags {
            match tag.as_str() {
                "chore" => return TaskKind::Chore,
                "feature" => return TaskKind::Feature,
                "plan" => return TaskKind::Plan,
                "build" => return TaskKind::Build,
                "prompt" => return TaskKind::Prompt,
                _ => continue,
            }
        }
        TaskKind::Plan
    }

    /// Command name for the planning phase of this variant, when it has one.
    pub fn planning_command(&self) -> Option<&'static str> {
        match self {
            TaskKind::Chore => Some("chore"),
            TaskKind::Feature => Some("feature"),
            TaskKind::Plan => Some("plan"),
            TaskKind::Build | TaskKind::Prompt => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Chore => write!(f, "chore"),
            TaskKind::Feature => write!(f, "feature"),
            TaskKind::Plan => write!(f, "plan"),
            TaskKind::Build => write!(f, "build"),
            TaskKind::Prompt => write!(f, "prompt"),
        }
    }
}
