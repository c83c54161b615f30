//! Restart-until-done supervision of the corpus traversal.
//!
//! Each attempt runs a complete traversal behind the fault boundary. Any
//! failure (crash, timeout, silent exit) restarts the traversal from the first
//! corpus row, immediately and without backoff. There is no persisted cursor:
//! entries already flushed before a failure are appended again by the next
//! attempt.

use crate::executor::{IsolatedExecutor, IsolationError, WorkerCommand};
use async_trait::async_trait;
use shared_types::{TraversalSettings, TraversalSummary};
use std::time::Duration;

/// Fault boundary that runs one traversal
#[async_trait]
pub trait Isolation: Send + Sync {
    async fn run_traversal(
        &self,
        settings: &TraversalSettings,
        timeout: Duration,
    ) -> Result<TraversalSummary, IsolationError>;
}

/// Runs each traversal in a fresh worker process
pub struct ProcessIsolation {
    executor: IsolatedExecutor,
    worker: WorkerCommand,
}

impl ProcessIsolation {
    pub fn new(executor: IsolatedExecutor, worker: WorkerCommand) -> Self {
        Self { executor, worker }
    }

    /// Re-enter the running binary through its `worker` subcommand
    pub fn current_exe(executor: IsolatedExecutor) -> std::io::Result<Self> {
        Ok(Self::new(executor, WorkerCommand::current_exe()?.arg("worker")))
    }
}

#[async_trait]
impl Isolation for ProcessIsolation {
    async fn run_traversal(
        &self,
        settings: &TraversalSettings,
        timeout: Duration,
    ) -> Result<TraversalSummary, IsolationError> {
        let work = self.worker.clone().payload_json(settings).map_err(|e| {
            IsolationError::Spawn(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.executor.run(&work, timeout).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub summary: TraversalSummary,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Gave up after {attempts} attempts; last failure: {last_failure}")]
    AttemptsExhausted { attempts: u32, last_failure: String },
}

pub struct ResumableBatchRunner<I> {
    isolation: I,
    settings: TraversalSettings,
    timeout: Duration,
    max_attempts: Option<u32>,
}

impl<I: Isolation> ResumableBatchRunner<I> {
    pub fn new(isolation: I, settings: TraversalSettings, timeout: Duration) -> Self {
        Self {
            isolation,
            settings,
            timeout,
            max_attempts: None,
        }
    }

    /// Stop after `max_attempts` failed traversals instead of retrying forever
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Run traversals until one completes.
    ///
    /// Only returns an error when an attempt cap is configured and reached.
    pub async fn run(&self) -> Result<BatchOutcome, RunnerError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::info!(
                "Batch attempt {}: {:?} -> {:?}",
                attempt,
                self.settings.corpus_path,
                self.settings.output_path
            );

            match self.isolation.run_traversal(&self.settings, self.timeout).await {
                Ok(summary) => {
                    tracing::info!(
                        "Batch completed on attempt {}: {} entries processed, {} rows written",
                        attempt,
                        summary.processed_count,
                        summary.emitted_rows
                    );
                    return Ok(BatchOutcome {
                        summary,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    tracing::error!("Batch attempt {} failed: {}", attempt, e);

                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(RunnerError::AttemptsExhausted {
                            attempts: attempt,
                            last_failure: e.to_string(),
                        });
                    }

                    tracing::info!("Restarting batch from the first corpus row");
                }
            }
        }
    }
}
