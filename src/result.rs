use crate::error::PoolError;

use futures::Stream;

/// The outcome of one task executed by a `WorkerPool`.
///
/// Produced exactly once per dequeued task and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<R> {
  /// Identifier reported by `Task::id`, if the task had one.
  pub task_id: Option<String>,
  /// Index of the worker that executed the task, in `0..worker_count`.
  pub worker_id: usize,
  pub outcome: Result<R, PoolError>,
}

impl<R> TaskResult<R> {
  pub fn is_ok(&self) -> bool {
    self.outcome.is_ok()
  }

  pub fn value(&self) -> Option<&R> {
    self.outcome.as_ref().ok()
  }

  pub fn error(&self) -> Option<&PoolError> {
    self.outcome.as_ref().err()
  }

  pub fn into_outcome(self) -> Result<R, PoolError> {
    self.outcome
  }
}

/// Receiving side of a pool's result channel.
///
/// Cloning yields another consumer of the same channel; each result is
/// delivered to exactly one of them. `recv` returns `None` once the pool has
/// stopped and every buffered result has been taken.
#[derive(Debug)]
pub struct ResultReceiver<R> {
  pub(crate) rx: async_channel::Receiver<TaskResult<R>>,
}

impl<R> Clone for ResultReceiver<R> {
  fn clone(&self) -> Self {
    Self { rx: self.rx.clone() }
  }
}

impl<R> ResultReceiver<R> {
  pub async fn recv(&self) -> Option<TaskResult<R>> {
    self.rx.recv().await.ok()
  }

  /// Returns a result if one is ready, without waiting.
  pub fn try_recv(&self) -> Option<TaskResult<R>> {
    self.rx.try_recv().ok()
  }

  /// Number of results produced but not yet received.
  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rx.is_empty()
  }

  /// `true` once the pool's coordinator has closed the channel.
  pub fn is_closed(&self) -> bool {
    self.rx.is_closed()
  }

  pub fn into_stream(self) -> impl Stream<Item = TaskResult<R>> {
    self.rx
  }
}
