use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by caller-supplied work.
///
/// Shared rather than boxed so a failed outcome can be cloned between the
/// worker that produced it and whoever observes it.
pub type BoxError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur within the `task_relay` pool and fan-out helpers.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,

  #[error("Pool has already been started")]
  AlreadyStarted,

  #[error("Task was cancelled")]
  TaskCancelled,

  #[error("Submitted task future panicked")]
  TaskPanicked,

  #[error("Task failed: {0}")]
  TaskFailed(#[source] BoxError),
}

impl PoolError {
  /// Wraps any error produced by user work into `PoolError::TaskFailed`.
  pub fn task_failed<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    PoolError::TaskFailed(Arc::new(err))
  }

  /// Returns `true` if this error reports a cancellation rather than a failure.
  pub fn is_cancellation(&self) -> bool {
    matches!(self, PoolError::TaskCancelled)
  }
}

impl PartialEq for PoolError {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (PoolError::PoolShuttingDown, PoolError::PoolShuttingDown)
      | (PoolError::AlreadyStarted, PoolError::AlreadyStarted)
      | (PoolError::TaskCancelled, PoolError::TaskCancelled)
      | (PoolError::TaskPanicked, PoolError::TaskPanicked) => true,
      (PoolError::TaskFailed(a), PoolError::TaskFailed(b)) => a.to_string() == b.to_string(),
      _ => false,
    }
  }
}
