use crate::error::PoolError;
use crate::result::TaskResult;
use crate::task::BoxedTask;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, trace, warn, Instrument};

/// Tasks currently executing, keyed by the worker running them.
pub(crate) type ActiveTasks = Arc<DashMap<usize, Option<String>>>;

/// A single execution unit that repeatedly dequeues a task from a shared
/// queue, runs it, and publishes a `TaskResult`.
///
/// A worker runs one task at a time. Stopping it abandons anything it has not
/// dequeued yet but never interrupts the task it is already running.
pub struct Worker<R: Send + 'static> {
  id: usize,
  pool_name: Arc<String>,
  task_rx: Receiver<BoxedTask<R>>,
  result_tx: Sender<TaskResult<R>>,
  quit: CancellationToken,
  active_tasks: ActiveTasks,
}

impl<R: Send + 'static> Worker<R> {
  /// Binds a worker to shared channels. Nothing runs until [`Worker::start`].
  pub fn new(
    id: usize,
    task_rx: Receiver<BoxedTask<R>>,
    result_tx: Sender<TaskResult<R>>,
    quit: CancellationToken,
  ) -> Self {
    Self::for_pool(
      id,
      Arc::new("standalone".to_string()),
      task_rx,
      result_tx,
      quit,
      Arc::new(DashMap::new()),
    )
  }

  pub(crate) fn for_pool(
    id: usize,
    pool_name: Arc<String>,
    task_rx: Receiver<BoxedTask<R>>,
    result_tx: Sender<TaskResult<R>>,
    quit: CancellationToken,
    active_tasks: ActiveTasks,
  ) -> Self {
    Self {
      id,
      pool_name,
      task_rx,
      result_tx,
      quit,
      active_tasks,
    }
  }

  pub fn id(&self) -> usize {
    self.id
  }

  /// Spawns the worker loop on `tokio_handle`, registered with `tracker` so a
  /// coordinator can wait for it to exit.
  pub fn start(&self, tracker: &TaskTracker, tokio_handle: &TokioHandle) -> JoinHandle<()> {
    let worker_loop = Self::run_loop(
      self.id,
      self.pool_name.clone(),
      self.task_rx.clone(),
      self.result_tx.clone(),
      self.quit.clone(),
      self.active_tasks.clone(),
    )
    .instrument(info_span!("pool_worker", pool_name = %*self.pool_name, worker_id = self.id));

    tracker.spawn_on(worker_loop, tokio_handle)
  }

  /// Signals this worker to quit. A task already in flight runs to completion.
  pub fn stop(&self) {
    debug!(pool_name = %*self.pool_name, worker_id = self.id, "Worker: Quit requested.");
    self.quit.cancel();
  }

  async fn run_loop(
    worker_id: usize,
    pool_name: Arc<String>,
    task_rx: Receiver<BoxedTask<R>>,
    result_tx: Sender<TaskResult<R>>,
    quit: CancellationToken,
    active_tasks: ActiveTasks,
  ) {
    debug!("Worker started.");

    loop {
      let task = tokio::select! {
        biased;

        _ = quit.cancelled() => {
          debug!("Quit signal received. Worker terminating.");
          break;
        }

        recv_result = task_rx.recv() => match recv_result {
          Ok(task) => task,
          Err(_) => {
            debug!("Task queue closed and empty. Worker terminating.");
            break;
          }
        }
      };

      let task_id = task.id();
      active_tasks.insert(worker_id, task_id.clone());
      trace!(task_id = ?task_id, "Dequeued task. Executing.");

      let outcome = match AssertUnwindSafe(async move { task.execute().await })
        .catch_unwind()
        .await
      {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(work_error)) => {
          debug!(task_id = ?task_id, "Task returned an error: {}", work_error);
          Err(PoolError::TaskFailed(work_error))
        }
        Err(_panic_payload) => {
          error!(pool_name = %*pool_name, task_id = ?task_id, "Task panicked during execution.");
          Err(PoolError::TaskPanicked)
        }
      };
      active_tasks.remove(&worker_id);

      let result = TaskResult {
        task_id: task_id.clone(),
        worker_id,
        outcome,
      };

      // Quit must be able to unblock a worker whose result nobody is reading.
      tokio::select! {
        biased;

        sent = result_tx.send(result) => {
          if sent.is_err() {
            warn!(task_id = ?task_id, "Result channel closed. Dropping result and terminating.");
            break;
          }
        }

        _ = quit.cancelled() => {
          warn!(task_id = ?task_id, "Quit signal received while delivering result. Result dropped.");
          break;
        }
      }
    }

    debug!("Worker stopped.");
  }
}
