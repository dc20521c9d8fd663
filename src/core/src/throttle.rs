//! Bounded-concurrency executor with per-unit retry.
//!
//! Units of work are spawned onto a caller-owned [`JoinSet`]. The executor
//! hands out at most `max_concurrency` permits; [`Executor::spawn`] waits for
//! a permit before spawning, so units start in submission order. Each unit
//! holds its permit for all of its retry attempts.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{ArchiveError, Result};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Result of one unit of work, tagged with the label it was spawned under.
#[derive(Debug)]
pub struct Outcome<T> {
    pub label: String,
    pub result: Result<T>,
}

/// Retry/throttle executor
#[derive(Debug, Clone)]
pub struct Executor {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    retry: RetryConfig,
}

impl Executor {
    /// Create an executor running at most `max_concurrency` units at once.
    ///
    /// A limit of zero is treated as one.
    pub fn new(max_concurrency: usize, retry: RetryConfig) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            retry,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Permits not currently held by a running unit.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot, then spawn `operation` onto `tasks`.
    ///
    /// The spawned unit retries transient failures according to the
    /// executor's [`RetryConfig`] and always yields an [`Outcome`].
    pub async fn spawn<T, F, Fut>(
        &self,
        tasks: &mut JoinSet<Outcome<T>>,
        label: impl Into<String>,
        operation: F,
    ) -> Result<()>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let label = label.into();
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ArchiveError::Other("Executor semaphore closed".to_string()))?;
        let retry = self.retry.clone();

        tracing::debug!(unit = %label, "Starting unit of work");

        tasks.spawn(async move {
            let _permit = permit;
            let result = retry_with_backoff(&retry, &label, operation).await;
            Outcome { label, result }
        });

        Ok(())
    }
}
