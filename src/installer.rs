//! Command-file installer.
//!
//! Copies the project's prompt command files into a worktree so the
//! agent's slash commands (`/agentflow:plan`, `/agentflow:implement`, ...)
//! resolve when invoked from inside the working copy. Commands live under
//! `.claude/commands/<namespace>/` relative to the project root.

use std::path::{Path, PathBuf};

use crate::config::EffectiveConfig;
use crate::core::task::Worktree;
use crate::{aflog_debug, Error, Result};

/// Installs command files into a worktree's working copy.
pub struct Installer<'a> {
    config: &'a EffectiveConfig,
    worktree: &'a Worktree,
}

impl<'a> Installer<'a> {
    pub fn new(config: &'a EffectiveConfig, worktree: &'a Worktree) -> Self {
        Self { config, worktree }
    }

    fn commands_subdir(&self) -> PathBuf {
        Path::new(".claude")
            .join("commands")
            .join(&self.config.commands_namespace)
    }

    /// Copy the command files into the worktree. Returns the copied paths.
    ///
    /// A project without a commands directory installs nothing; the
    /// worktree must be materialized first.
    pub fn install_commands(&self) -> Result<Vec<PathBuf>> {
        let target_root = self
            .worktree
            .directory_path
            .as_ref()
            .ok_or_else(|| Error::Validation("worktree has no directory path".to_string()))?;

        let source_dir = self.config.project_dir.join(self.commands_subdir());
        if !source_dir.is_dir() {
            aflog_debug!(
                "No commands directory at {}, nothing to install",
                source_dir.display()
            );
            return Ok(Vec::new());
        }

        let target_dir = target_root.join(self.commands_subdir());
        std::fs::create_dir_all(&target_dir)?;

        let mut copied = Vec::new();
        for entry in std::fs::read_dir(&source_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                let target = target_dir.join(entry.file_name());
                std::fs::copy(&path, &target)?;
                copied.push(target);
            }
        }

        aflog_debug!(
            "Installed {} command files into {}",
            copied.len(),
            target_dir.display()
        );
        Ok(copied)
    }
}
