//! Scheduling loop.
//!
//! One control loop per process. Each iteration re-reads the task source,
//! selects the next batch of runnable (worktree, task) pairs, and executes
//! them concurrently under the configured cap. A new iteration starts only
//! after every unit of the previous batch has finished plus the configured
//! idle interval, so two batches never race on the same worktree. The
//! inter-iteration wait sleeps in one-second slices and checks the
//! cancellation token each slice, bounding shutdown latency; in-flight
//! units always run to completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EffectiveConfig;
use crate::core::manager::TaskManager;
use crate::core::task::{Task, Worktree};
use crate::util::truncate_words;
use crate::workflow::TaskHandler;
use crate::{aflog, aflog_error, Result};

/// Top-level scheduler driving iterations of select-and-execute.
pub struct Scheduler {
    config: EffectiveConfig,
    manager: Arc<Mutex<TaskManager>>,
    handler: Arc<TaskHandler>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: EffectiveConfig,
        manager: Arc<Mutex<TaskManager>>,
        handler: Arc<TaskHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            manager,
            handler,
            shutdown,
        }
    }

    /// Run the scheduling loop until shutdown (or once in single-run mode).
    pub async fn run(&self) -> Result<()> {
        let mut iteration = 1u64;
        self.run_iteration(iteration).await;

        if self.config.single_run {
            aflog!("Single run completed, exiting");
            return Ok(());
        }

        while !self.shutdown.is_cancelled() {
            aflog!("Next iteration in {}s", self.config.sync_interval);
            if !self.wait_interval().await {
                break;
            }
            iteration += 1;
            self.run_iteration(iteration).await;
        }

        aflog!("Scheduler stopped");
        Ok(())
    }

    /// Initialize every worktree and install command files, without
    /// selecting or executing any task.
    pub async fn run_install_only(&self) -> Result<()> {
        let worktrees: Vec<Worktree> = {
            let manager = self.manager.lock().await;
            manager.worktrees().to_vec()
        };

        for worktree in &worktrees {
            match self.handler.install_worktree(worktree).await {
                Ok(count) => aflog!(
                    "Installed {} command files into worktree '{}'",
                    count,
                    worktree.name
                ),
                Err(e) => aflog_error!(
                    "Failed to install into worktree '{}': {}",
                    worktree.name,
                    e
                ),
            }
        }

        aflog!("Install-only run completed, exiting");
        Ok(())
    }

    /// Run one iteration: refresh, select, execute. Returns the number of
    /// tasks processed. Source errors abort the iteration, not the loop.
    async fn run_iteration(&self, iteration: u64) -> usize {
        aflog!("--- Iteration {} ---", iteration);
        let start = Instant::now();

        let batch = {
            let mut manager = self.manager.lock().await;
            if let Err(e) = manager.refresh_from_source() {
                aflog_error!("Failed to refresh from source: {}", e);
                return 0;
            }
            manager.fetch_next_available(self.config.concurrent_tasks)
        };

        if batch.is_empty() {
            aflog!("No tasks available for processing");
            return 0;
        }

        aflog!(
            "Processing {} tasks in parallel (max concurrent: {})",
            batch.len(),
            self.config.concurrent_tasks
        );

        let processed = if self.config.dry_run {
            self.report_batch(&batch);
            batch.len()
        } else {
            self.process_batch(batch).await
        };

        aflog!(
            "Iteration {} completed in {:.2}s (processed {} tasks)",
            iteration,
            start.elapsed().as_secs_f64(),
            processed
        );
        processed
    }

    /// Dry-run: log what would execute without touching anything.
    fn report_batch(&self, batch: &[(Worktree, Task)]) {
        for (worktree, task) in batch {
            let id = task
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            aflog!(
                "[DRY-RUN] worktree: {} task: {} description: {}",
                worktree.name,
                id,
                truncate_words(&task.description, 5)
            );
        }
    }

    /// Execute a batch under the concurrency cap; returns the number of
    /// units that finished (successfully or not).
    async fn process_batch(&self, batch: Vec<(Worktree, Task)>) -> usize {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_tasks));
        let mut units: JoinSet<bool> = JoinSet::new();

        for (worktree, task) in batch {
            let handler = Arc::clone(&self.handler);
            let semaphore = Arc::clone(&semaphore);
            units.spawn(async move {
                // Semaphore closed only on runtime shutdown.
                let Ok(_permit) = semaphore.acquire().await else {
                    return false;
                };
                handler.handle_task(&worktree, &task).await
            });
        }

        let mut processed = 0;
        let mut succeeded = 0;
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(success) => {
                    processed += 1;
                    if success {
                        succeeded += 1;
                    }
                }
                Err(e) => aflog_error!("Task unit panicked: {}", e),
            }
        }

        aflog!("Batch finished: {}/{} tasks succeeded", succeeded, processed);
        processed
    }

    /// Sleep the sync interval in one-second slices. Returns false when
    /// shutdown was requested during the wait.
    async fn wait_interval(&self) -> bool {
        for _ in 0..self.config.sync_interval {
            if self.shutdown.is_cancelled() {
                return false;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
        !self.shutdown.is_cancelled()
    }
}
