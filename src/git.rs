use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository, StatusOptions};

use crate::{aflog_debug, Result};

/// Git operations for the main repository and its worktrees.
pub struct GitOps {
    repo_path: PathBuf,
}

impl GitOps {
    pub fn new(repo_path: &Path) -> Result<Self> {
        aflog_debug!("GitOps::new path={}", repo_path.display());
        let _ = Repository::discover(repo_path)?;
        Ok(Self {
            repo_path: repo_path.to_path_buf(),
        })
    }

    fn repo(&self) -> Result<Repository> {
        Ok(Repository::discover(&self.repo_path)?)
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Create a worktree on a new branch rooted at the current HEAD commit.
    pub fn create_worktree(&self, branch: &str, worktree_path: &Path) -> Result<()> {
        aflog_debug!(
            "GitOps::create_worktree branch={} path={}",
            branch,
            worktree_path.display()
        );
        let repo = self.repo()?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        aflog_debug!("Creating branch {} from commit {}", branch, commit.id());
        let branch_obj = repo.branch(branch, &commit, false)?;
        let branch_ref = branch_obj.into_reference();
        let mut opts = git2::WorktreeAddOptions::new();
        opts.reference(Some(&branch_ref));
        // Use worktree path's folder name as worktree name (branch may contain slashes)
        let worktree_name = worktree_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(branch);
        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        repo.worktree(worktree_name, worktree_path, Some(&opts))?;
        aflog_debug!("Worktree created successfully");
        Ok(())
    }

    /// Name of the branch checked out at the given worktree path.
    pub fn current_branch(worktree_path: &Path) -> Result<String> {
        let repo = Repository::open(worktree_path)?;
        let head = repo.head()?;
        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(name.to_string());
            }
        }
        // Detached HEAD: report the short commit id.
        let commit = head.peel_to_commit()?;
        Ok(format!("{:.7}", commit.id()))
    }

    /// Check if a worktree has uncommitted changes, including untracked files.
    pub fn is_dirty(worktree_path: &Path) -> Result<bool> {
        let repo = Repository::open(worktree_path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Full commit id of HEAD at the given worktree path.
    pub fn head_commit(worktree_path: &Path) -> Result<String> {
        let repo = Repository::open(worktree_path)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let repo = self.repo()?;
        let exists = match repo.find_branch(branch, git2::BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        };
        exists
    }

    /// Get the git user name from config, falling back to system username or "user"
    pub fn git_user(&self) -> Result<String> {
        let repo = self.repo()?;
        let config = repo.config()?;

        // Try git config user.name first
        if let Ok(name) = config.get_string("user.name") {
            // Sanitize: lowercase, replace spaces with hyphens
            let sanitized = name
                .trim()
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '-' })
                .collect::<String>();
            if !sanitized.is_empty() && sanitized != "-" {
                return Ok(sanitized);
            }
        }

        // Fall back to system username
        if let Ok(user) = std::env::var("USER").or_else(|_| std::env::var("USERNAME")) {
            return Ok(user.to_lowercase());
        }

        Ok("user".to_string())
    }
}
