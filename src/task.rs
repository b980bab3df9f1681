use crate::error::BoxError;

use std::future::Future;
use std::pin::Pin;

/// The future produced by executing a task.
/// It must be `Send` and `'static`, and resolve to either a value of type `R`
/// or the error the work reported.
pub type TaskFuture<R> = Pin<Box<dyn Future<Output = Result<R, BoxError>> + Send + 'static>>;

/// A unit of work that can be handed to a `WorkerPool`.
///
/// Ownership of the task moves to the worker that dequeues it; `execute`
/// consumes the task so nothing can observe it after submission.
///
/// Any `FnOnce() -> impl Future<Output = Result<R, BoxError>>` closure is a task.
pub trait Task<R>: Send + 'static {
  /// Optional caller-chosen identifier, echoed back in the `TaskResult`.
  fn id(&self) -> Option<String> {
    None
  }

  fn execute(self: Box<Self>) -> TaskFuture<R>;
}

/// Type-erased task as it travels through a pool's queue.
pub type BoxedTask<R> = Box<dyn Task<R>>;

impl<R, F, Fut> Task<R> for F
where
  R: Send + 'static,
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
{
  fn execute(self: Box<Self>) -> TaskFuture<R> {
    Box::pin((*self)())
  }
}

/// Attaches a caller identifier to any task.
#[derive(Debug)]
pub struct IdentifiedTask<T> {
  id: String,
  inner: T,
}

impl<T> IdentifiedTask<T> {
  pub fn new(id: impl Into<String>, inner: T) -> Self {
    Self { id: id.into(), inner }
  }
}

impl<R, T> Task<R> for IdentifiedTask<T>
where
  T: Task<R>,
{
  fn id(&self) -> Option<String> {
    Some(self.id.clone())
  }

  fn execute(self: Box<Self>) -> TaskFuture<R> {
    Task::<R>::execute(Box::new(self.inner))
  }
}
