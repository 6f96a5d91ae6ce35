use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Task source error: {0}")]
    Source(String),

    #[error("Worktree not found: {0}")]
    WorktreeNotFound(String),

    #[error("Task '{task_id}' not found in worktree '{worktree}'")]
    TaskNotFound { worktree: String, task_id: String },

    #[error("Worktree creation failed: {0}")]
    ContextCreation(String),

    #[error("Expected branch '{expected}' but found '{actual}'")]
    BranchMismatch { expected: String, actual: String },

    #[error("Worktree has uncommitted changes: {0}")]
    DirtyWorktree(String),

    #[error("Agent CLI '{0}' not found. Is it installed and in PATH?")]
    AgentNotAvailable(String),

    #[error("Unknown agent '{name}'. Available agents: {available}")]
    UnknownAgent { name: String, available: String },

    #[error("Agent execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to parse agent output: {0}")]
    OutputParse(String),

    #[error("{phase} phase failed: {message}")]
    Phase { phase: String, message: String },

    #[error("PR creation failed: {0}")]
    Publish(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Wrap any error as a phase failure, prefixing it with the phase name.
    pub fn phase(phase: &str, err: impl std::fmt::Display) -> Self {
        Error::Phase {
            phase: phase.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
