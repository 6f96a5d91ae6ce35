//! Per-task workflow engine.
//!
//! Drives one (worktree, task) pair through its phases: optional planning,
//! implementation or build, and a finalize step that commits the work.
//! The workflow variant is selected once per task from its reserved tag.

mod handler;
mod types;

pub use handler::TaskHandler;
pub use types::TaskKind;
