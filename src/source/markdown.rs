//! Markdown-backed task source.
//!
//! Reads and updates task lists kept in a Markdown file with the format:
//!
//! ```markdown
//! ## Git Worktree feature-auth {TCK-7899} (opencode)
//!
//! - [✅, ntjnwf, 17d16d1] Implement login endpoint {feature}
//! - [] Add rate limiting to the endpoint
//!   covering both per-IP and per-account limits {chore, security}
//! ```
//!
//! The braces on the header carry the optional external id, the parens the
//! optional agent override. Task lines carry a status marker, optional id,
//! optional commit sha, a description (indented lines continue it), and
//! optional trailing tags in braces.
//!
//! Writes are line-surgical: a status update rewrites only the bracketed
//! cell of the one matching line, and an id assignment inserts the id into
//! the one line addressed by sequence position. Everything else stays
//! byte-identical, so re-reading and re-updating the file never disturbs
//! human edits elsewhere.

use std::path::PathBuf;
use std::sync::Mutex;

use regex::Regex;

use crate::core::task::{Task, TaskId, TaskStatus, Worktree};
use crate::source::TaskSource;
use crate::{aflog_warn, Error, Result};

/// Status markers used in the Markdown encoding, 1:1 with `TaskStatus`.
fn status_to_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::NotStarted => "",
        TaskStatus::Blocked => "⏰",
        TaskStatus::InProgress => "🟡",
        TaskStatus::Completed => "✅",
        TaskStatus::Failed => "❌",
    }
}

/// Unknown markers parse as `NotStarted` so a typo never hides a task.
fn marker_to_status(marker: &str) -> TaskStatus {
    match marker {
        "" => TaskStatus::NotStarted,
        "⏰" => TaskStatus::Blocked,
        "🟡" => TaskStatus::InProgress,
        "✅" => TaskStatus::Completed,
        "❌" => TaskStatus::Failed,
        _ => TaskStatus::NotStarted,
    }
}

fn task_line_re() -> Regex {
    Regex::new(r"^(\s*-\s*\[)(.*?)(\].*)$").unwrap()
}

/// Task source backed by a Markdown file.
pub struct MarkdownTaskSource {
    file_path: PathBuf,
    file_lock: Mutex<()>,
}

impl MarkdownTaskSource {
    /// Create a source reading from the given Markdown file.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            file_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }

    fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.file_path)
            .map_err(|e| Error::Source(format!("reading {}: {}", self.file_path.display(), e)))
    }

    fn write(&self, content: &str) -> Result<()> {
        std::fs::write(&self.file_path, content)
            .map_err(|e| Error::Source(format!("writing {}: {}", self.file_path.display(), e)))
    }

    /// Parse a worktree header line like
    /// `## Git Worktree feature-auth {TCK-7899} (opencode)`.
    fn parse_header(line: &str) -> (String, Option<String>, Option<String>) {
        fn strip_trailing<'a>(re: &Regex, s: &'a str) -> (&'a str, Option<String>) {
            match re.captures(s) {
                Some(c) => {
                    let val = c.get(1).unwrap().as_str().trim().to_string();
                    (s[..c.get(0).unwrap().start()].trim_end(), Some(val))
                }
                None => (s, None),
            }
        }

        let header = line[2..].trim();
        let (header, agent) = strip_trailing(&Regex::new(r"\(([^)]+)\)\s*$").unwrap(), header);
        let (header, external_id) =
            strip_trailing(&Regex::new(r"\{([^}]+)\}\s*$").unwrap(), header);

        let name = header
            .strip_prefix("Git Worktree ")
            .unwrap_or(header)
            .trim()
            .to_string();

        (name, external_id, agent)
    }

    /// Split a status cell like `✅, ntjnwf, 17d16d1` into its parts.
    fn split_status_cell(cell: &str) -> (String, Option<String>, Option<String>) {
        let parts: Vec<&str> = cell.split(',').map(str::trim).collect();
        let marker = parts.first().copied().unwrap_or("").to_string();
        let id = parts
            .get(1)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string());
        let sha = parts
            .get(2)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string());
        (marker, id, sha)
    }

    /// Extract trailing tags in braces from a description.
    fn split_tags(text: &str) -> (String, Vec<String>) {
        let re = Regex::new(r"\{([^}]+)\}\s*$").unwrap();
        if let Some(c) = re.captures(text) {
            let tags = c
                .get(1)
                .unwrap()
                .as_str()
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            let description = text[..c.get(0).unwrap().start()].trim().to_string();
            return (description, tags);
        }
        (text.trim().to_string(), Vec::new())
    }

    /// Parse a task from its first line plus any continuation lines.
    ///
    /// Ids are never generated here: a line without an id yields
    /// `id = None` and the manager assigns one later.
    fn parse_task_lines(lines: &[String], sequence: usize) -> Option<Task> {
        let first = lines.first()?.trim();
        let caps = Regex::new(r"^-\s*\[(.*?)\]\s*(.*)$")
            .unwrap()
            .captures(first)?;

        let cell = caps.get(1).unwrap().as_str().trim();
        let rest = caps.get(2).unwrap().as_str().trim();

        let (marker, id, sha) = Self::split_status_cell(cell);
        let status = marker_to_status(&marker);

        let mut description_parts = vec![rest.to_string()];
        for line in &lines[1..] {
            description_parts.push(line.trim().to_string());
        }
        let full_text = description_parts.join("\n");

        let (description, tags) = Self::split_tags(&full_text);

        let mut task = Task::new(description.trim(), sequence).with_tags(tags);
        task.status = status;
        task.id = id.map(TaskId);
        task.commit_sha = sha;
        Some(task)
    }

    /// Rewrite the status cell of a task line, preserving everything else.
    fn update_task_line(line: &str, status: TaskStatus, commit_sha: Option<&str>) -> String {
        let Some(caps) = task_line_re().captures(line) else {
            return line.to_string();
        };
        let prefix = caps.get(1).unwrap().as_str();
        let cell = caps.get(2).unwrap().as_str().trim();
        let suffix = caps.get(3).unwrap().as_str();

        let (_, id, old_sha) = Self::split_status_cell(cell);

        let sha = commit_sha.map(str::to_string).or(old_sha);

        let mut parts = vec![status_to_marker(status).to_string()];
        if let Some(id) = id {
            parts.push(id);
        }
        if let Some(sha) = sha {
            parts.push(sha);
        }

        format!("{}{}{}", prefix, parts.join(", "), suffix)
    }

    /// Insert a task id into a line that has none. Idempotent: a line that
    /// already carries an id is returned unchanged.
    fn insert_task_id(line: &str, task_id: &TaskId) -> String {
        let Some(caps) = task_line_re().captures(line) else {
            return line.to_string();
        };
        let prefix = caps.get(1).unwrap().as_str();
        let cell = caps.get(2).unwrap().as_str().trim();
        let suffix = caps.get(3).unwrap().as_str();

        let (marker, id, sha) = Self::split_status_cell(cell);
        if id.is_some() {
            return line.to_string();
        }

        let mut parts = vec![marker, task_id.0.clone()];
        if let Some(sha) = sha {
            parts.push(sha);
        }

        format!("{}{}{}", prefix, parts.join(", "), suffix)
    }

    /// Check whether a task line carries the given id in its status cell.
    fn line_has_task_id(line: &str, task_id: &TaskId) -> bool {
        task_line_re()
            .captures(line)
            .map(|caps| {
                let cell = caps.get(2).unwrap().as_str().trim();
                let (_, id, _) = Self::split_status_cell(cell);
                id.as_deref() == Some(task_id.0.as_str())
            })
            .unwrap_or(false)
    }
}

impl TaskSource for MarkdownTaskSource {
    fn list_worktrees(&self) -> Result<Vec<Worktree>> {
        let _guard = self.file_lock.lock().unwrap();

        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let content = self.read()?;
        let lines: Vec<&str> = content.split('\n').collect();

        let mut worktrees: Vec<Worktree> = Vec::new();
        let mut current: Option<Worktree> = None;
        let mut sequence = 0usize;
        let mut pending: Vec<String> = Vec::new();

        let flush =
            |pending: &mut Vec<String>, current: &mut Option<Worktree>, sequence: &mut usize| {
                if pending.is_empty() {
                    return;
                }
                if let Some(wt) = current.as_mut() {
                    if let Some(task) = Self::parse_task_lines(pending, *sequence) {
                        wt.tasks.push(task);
                        *sequence += 1;
                    }
                }
                pending.clear();
            };

        for line in &lines {
            if line.starts_with("## ") {
                flush(&mut pending, &mut current, &mut sequence);
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                let (name, external_id, agent) = Self::parse_header(line);
                let mut wt = Worktree::new(&name);
                wt.external_id = external_id;
                wt.agent = agent;
                current = Some(wt);
                sequence = 0;
            } else if line.trim_start().starts_with("- [") && current.is_some() {
                flush(&mut pending, &mut current, &mut sequence);
                pending.push(line.to_string());
            } else if !pending.is_empty()
                && !line.is_empty()
                && line.starts_with([' ', '\t'])
                && current.is_some()
            {
                pending.push(line.to_string());
            } else {
                flush(&mut pending, &mut current, &mut sequence);
            }
        }

        flush(&mut pending, &mut current, &mut sequence);
        if let Some(wt) = current.take() {
            worktrees.push(wt);
        }

        Ok(worktrees)
    }

    fn update_task_status(
        &self,
        worktree_name: &str,
        task_id: &TaskId,
        status: TaskStatus,
        commit_sha: Option<&str>,
    ) -> Result<()> {
        let _guard = self.file_lock.lock().unwrap();

        let content = self.read()?;
        let mut in_target = false;

        let updated: Vec<String> = content
            .split('\n')
            .map(|line| {
                if line.starts_with("## ") {
                    let (name, _, _) = Self::parse_header(line);
                    in_target = name == worktree_name;
                    line.to_string()
                } else if in_target
                    && line.trim_start().starts_with("- [")
                    && Self::line_has_task_id(line, task_id)
                {
                    Self::update_task_line(line, status, commit_sha)
                } else {
                    line.to_string()
                }
            })
            .collect();

        self.write(&updated.join("\n"))
    }

    fn assign_task_id(
        &self,
        worktree_name: &str,
        sequence: usize,
        task_id: &TaskId,
    ) -> Result<()> {
        let _guard = self.file_lock.lock().unwrap();

        let content = self.read()?;
        let mut in_target = false;
        let mut current_sequence = 0usize;

        let updated: Vec<String> = content
            .split('\n')
            .map(|line| {
                if line.starts_with("## ") {
                    let (name, _, _) = Self::parse_header(line);
                    in_target = name == worktree_name;
                    current_sequence = 0;
                    line.to_string()
                } else if in_target && line.trim_start().starts_with("- [") {
                    let result = if current_sequence == sequence {
                        Self::insert_task_id(line, task_id)
                    } else {
                        line.to_string()
                    };
                    current_sequence += 1;
                    result
                } else {
                    line.to_string()
                }
            })
            .collect();

        self.write(&updated.join("\n"))
    }

    fn mark_task_error(
        &self,
        worktree_name: &str,
        task_id: &TaskId,
        error_msg: &str,
    ) -> Result<()> {
        // The encoding carries no error text; record the failure status and
        // keep the message in the log.
        aflog_warn!(
            "Task {} in worktree '{}' failed: {}",
            task_id,
            worktree_name,
            error_msg
        );
        self.update_task_status(worktree_name, task_id, TaskStatus::Failed, None)
    }
}
