//! Worktree controller.
//!
//! Creates or validates the isolated working copy for a worktree before
//! any task runs in it. A fresh worktree is materialized from the current
//! project HEAD on a deterministically named branch; an existing one must
//! be clean and on the expected branch before it is reused.

use std::path::PathBuf;

use crate::config::EffectiveConfig;
use crate::core::task::Worktree;
use crate::git::GitOps;
use crate::{aflog, aflog_debug, Error, Result};

/// Controller for materializing and validating worktree working copies.
pub struct WorktreeController {
    config: EffectiveConfig,
    git: GitOps,
}

impl WorktreeController {
    pub fn new(config: EffectiveConfig) -> Result<Self> {
        let git = GitOps::new(&config.project_dir)?;
        Ok(Self { config, git })
    }

    /// Deterministic absolute path for a worktree's working copy.
    pub fn worktree_path(&self, worktree: &Worktree) -> PathBuf {
        self.config.worktrees_dir().join(&worktree.name)
    }

    /// Deterministic branch name for a worktree.
    ///
    /// `{prefix}/{external_id}-{name}` when an external id is present,
    /// `{prefix}/{name}` otherwise. The prefix is the configured branch
    /// prefix, falling back to the git user name.
    pub fn branch_name(&self, worktree: &Worktree) -> Result<String> {
        let prefix = match &self.config.branch_prefix {
            Some(prefix) => prefix.clone(),
            None => self.git.git_user()?,
        };
        Ok(match &worktree.external_id {
            Some(id) => format!("{}/{}-{}", prefix, id, worktree.name),
            None => format!("{}/{}", prefix, worktree.name),
        })
    }

    /// Create or validate the working copy; returns its absolute path.
    ///
    /// Missing path: a new worktree is created from the current project
    /// HEAD on the computed branch. Existing path: the checked-out branch
    /// must match and the tree must be clean, otherwise the task cannot
    /// safely enter it.
    pub fn initialize(&self, worktree: &Worktree) -> Result<PathBuf> {
        let path = self.worktree_path(worktree);
        let branch = self.branch_name(worktree)?;

        if !path.exists() {
            aflog!(
                "Creating worktree at {} with branch {}",
                path.display(),
                branch
            );
            self.git
                .create_worktree(&branch, &path)
                .map_err(|e| Error::ContextCreation(e.to_string()))?;
        } else {
            aflog_debug!("Worktree directory exists, validating state");

            let actual = GitOps::current_branch(&path)?;
            if actual != branch {
                return Err(Error::BranchMismatch {
                    expected: branch,
                    actual,
                });
            }

            if GitOps::is_dirty(&path)? {
                return Err(Error::DirtyWorktree(path.display().to_string()));
            }

            aflog_debug!("Worktree validation passed");
        }

        Ok(path)
    }

    /// Tip commit of the working copy at the given path.
    pub fn head_sha(&self, path: &std::path::Path) -> Result<String> {
        GitOps::head_commit(path)
    }
}
