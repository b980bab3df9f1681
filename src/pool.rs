use crate::channel;
use crate::error::PoolError;
use crate::result::{ResultReceiver, TaskResult};
use crate::task::{BoxedTask, Task};
use crate::worker::{ActiveTasks, Worker};

use std::fmt;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Defines how the pool should behave upon shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Closes the task queue and lets workers drain whatever is already queued.
  /// Results for drained tasks must still be consumed or workers will stall.
  Graceful,
  /// Cancels the pool token, closes the task queue and tells every worker to
  /// quit. Queued tasks that haven't been dequeued are dropped; tasks already
  /// running finish but their results are dropped if nobody is receiving.
  Immediate,
}

/// Lifecycle of a `WorkerPool`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
  Idle,
  Running,
  Stopping,
  Stopped,
}

/// A fixed-size pool of workers sharing one task queue and one result channel.
///
/// The result channel is closed by a single coordinator task, and only after
/// every worker has exited, so no worker ever sends on a closed channel.
pub struct WorkerPool<R: Send + 'static> {
  pool_name: Arc<String>,
  worker_count: usize,
  tokio_handle: TokioHandle,
  task_tx: Sender<BoxedTask<R>>,
  task_rx: Receiver<BoxedTask<R>>,
  result_tx: Sender<TaskResult<R>>,
  result_rx: Receiver<TaskResult<R>>,
  shutdown_token: CancellationToken,
  tracker: TaskTracker,
  workers: Mutex<Vec<Worker<R>>>,
  coordinator_join_handle: Mutex<Option<JoinHandle<()>>>,
  state: Mutex<PoolState>,
  active_tasks: ActiveTasks,
}

impl<R: Send + 'static> WorkerPool<R> {
  /// Creates an idle pool with a fresh cancellation token.
  pub fn new(worker_count: usize, queue_capacity: usize, tokio_handle: TokioHandle, pool_name: &str) -> Arc<Self> {
    Self::build(CancellationToken::new(), worker_count, queue_capacity, tokio_handle, pool_name)
  }

  /// Creates an idle pool whose token is a child of `parent`; cancelling the
  /// parent stops the pool's workers.
  pub fn with_parent_token(
    parent: &CancellationToken,
    worker_count: usize,
    queue_capacity: usize,
    tokio_handle: TokioHandle,
    pool_name: &str,
  ) -> Arc<Self> {
    Self::build(parent.child_token(), worker_count, queue_capacity, tokio_handle, pool_name)
  }

  fn build(
    shutdown_token: CancellationToken,
    worker_count: usize,
    queue_capacity: usize,
    tokio_handle: TokioHandle,
    pool_name: &str,
  ) -> Arc<Self> {
    let (task_tx, task_rx) = channel::bounded(queue_capacity);
    let (result_tx, result_rx) = channel::bounded(queue_capacity);

    debug!(pool_name, worker_count, queue_capacity, "Pool created.");

    Arc::new(Self {
      pool_name: Arc::new(pool_name.to_string()),
      worker_count: worker_count.max(1),
      tokio_handle,
      task_tx,
      task_rx,
      result_tx,
      result_rx,
      shutdown_token,
      tracker: TaskTracker::new(),
      workers: Mutex::new(Vec::new()),
      coordinator_join_handle: Mutex::new(None),
      state: Mutex::new(PoolState::Idle),
      active_tasks: Arc::new(DashMap::new()),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  pub fn state(&self) -> PoolState {
    let state = *self.state.lock();
    if state == PoolState::Running && self.shutdown_token.is_cancelled() {
      PoolState::Stopping
    } else {
      state
    }
  }

  /// Number of tasks dequeued by a worker and still executing.
  pub fn active_task_count(&self) -> usize {
    self.active_tasks.len()
  }

  /// Returns the current number of tasks waiting in the queue.
  pub fn queued_task_count(&self) -> usize {
    self.task_tx.len()
  }

  /// The pool's cancellation token. Cancelling it has the same effect on the
  /// workers as an immediate shutdown, but does not wait for them.
  pub fn token(&self) -> &CancellationToken {
    &self.shutdown_token
  }

  /// Receiver for the pool's results. May be called before or after `start`.
  pub fn results(&self) -> ResultReceiver<R> {
    ResultReceiver {
      rx: self.result_rx.clone(),
    }
  }

  /// Spawns the workers and the coordinator that closes the result channel
  /// once all of them have exited.
  ///
  /// The state lock is held until the coordinator is stored, so a concurrent
  /// `shutdown` either sees an idle pool or a fully started one.
  pub fn start(&self) -> Result<(), PoolError> {
    let mut state = self.state.lock();
    match *state {
      PoolState::Idle => {}
      PoolState::Running => return Err(PoolError::AlreadyStarted),
      PoolState::Stopping | PoolState::Stopped => return Err(PoolError::PoolShuttingDown),
    }

    {
      let mut workers = self.workers.lock();
      for worker_id in 0..self.worker_count {
        let worker = Worker::for_pool(
          worker_id,
          self.pool_name.clone(),
          self.task_rx.clone(),
          self.result_tx.clone(),
          self.shutdown_token.child_token(),
          self.active_tasks.clone(),
        );
        worker.start(&self.tracker, &self.tokio_handle);
        workers.push(worker);
      }
    }
    self.tracker.close();

    let tracker = self.tracker.clone();
    let result_tx = self.result_tx.clone();
    let coordinator = self.tokio_handle.spawn(
      async move {
        tracker.wait().await;
        result_tx.close();
        debug!("All workers exited. Result channel closed.");
      }
      .instrument(info_span!("pool_coordinator", pool_name = %*self.pool_name)),
    );
    *self.coordinator_join_handle.lock() = Some(coordinator);
    *state = PoolState::Running;
    drop(state);

    info!(pool_name = %self.pool_name, worker_count = self.worker_count, "Pool started.");
    Ok(())
  }

  /// Hands a task to the pool's queue, waiting for queue space if needed.
  ///
  /// Never blocks past cancellation: if the pool is stopping or stopped, or is
  /// cancelled while waiting, the task is dropped and `PoolShuttingDown` is
  /// returned.
  pub async fn submit<T>(&self, task: T) -> Result<(), PoolError>
  where
    T: Task<R>,
  {
    if self.shutdown_token.is_cancelled() || self.task_tx.is_closed() {
      debug!(pool_name = %self.pool_name, "Submit: Pool is shutting down or closed. Task abandoned.");
      return Err(PoolError::PoolShuttingDown);
    }

    let task: BoxedTask<R> = Box::new(task);
    trace!(pool_name = %self.pool_name, task_id = ?task.id(), "Submitting task to queue.");

    tokio::select! {
      biased;

      _ = self.shutdown_token.cancelled() => {
        debug!(pool_name = %self.pool_name, "Submit: Pool cancelled while waiting for queue space. Task abandoned.");
        Err(PoolError::PoolShuttingDown)
      }

      sent = self.task_tx.send(task) => sent.map_err(|_| {
        debug!(pool_name = %self.pool_name, "Submit: Task queue closed. Task abandoned.");
        PoolError::PoolShuttingDown
      }),
    }
  }

  /// Equivalent to `shutdown(ShutdownMode::Immediate)`.
  pub async fn stop(&self) {
    self.shutdown(ShutdownMode::Immediate).await;
  }

  /// Stops the pool and waits until every worker has exited and the result
  /// channel is closed. Calling it again, or concurrently, is harmless.
  pub async fn shutdown(&self, mode: ShutdownMode) {
    let initiating = {
      let mut state = self.state.lock();
      match *state {
        PoolState::Stopping | PoolState::Stopped => false,
        PoolState::Idle | PoolState::Running => {
          *state = PoolState::Stopping;
          true
        }
      }
    };

    if initiating {
      info!(pool_name = %self.pool_name, "Initiating pool shutdown (mode: {:?}).", mode);
    } else {
      info!(pool_name = %self.pool_name, "Shutdown already in progress or completed (mode: {:?}).", mode);
    }

    match mode {
      // Also escalates a graceful shutdown that is still waiting on workers.
      ShutdownMode::Immediate => {
        self.shutdown_token.cancel();
        self.task_tx.close();
        for worker in self.workers.lock().iter() {
          worker.stop();
        }
      }
      ShutdownMode::Graceful if initiating => {
        self.task_tx.close();
        info!(pool_name = %self.pool_name, "Graceful shutdown: Workers will drain {} queued task(s).", self.task_tx.len());
      }
      ShutdownMode::Graceful => {}
    }

    let coordinator = self.coordinator_join_handle.lock().take();
    match coordinator {
      Some(handle) => {
        if let Err(join_error) = handle.await {
          error!(pool_name = %self.pool_name, "Error joining pool coordinator: {:?}", join_error);
          self.result_tx.close();
        }
      }
      None => {
        // Never started, or another caller already took the coordinator.
        self.tracker.close();
        self.tracker.wait().await;
        self.result_tx.close();
      }
    }

    self.shutdown_token.cancel();
    *self.state.lock() = PoolState::Stopped;

    if initiating {
      info!(pool_name = %self.pool_name, "Pool shutdown completed.");
    }
  }
}

impl<R: Send + 'static> fmt::Debug for WorkerPool<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerPool")
      .field("pool_name", &self.pool_name)
      .field("worker_count", &self.worker_count)
      .field("state", &self.state())
      .field("queued", &self.task_tx.len())
      .field("active", &self.active_tasks.len())
      .finish_non_exhaustive()
  }
}

impl<R: Send + 'static> Drop for WorkerPool<R> {
  fn drop(&mut self) {
    if *self.state.get_mut() == PoolState::Stopped {
      trace!(pool_name = %*self.pool_name, "Drop: Pool already stopped.");
      return;
    }

    // Workers hold their own handles to the channels; signal them and let the
    // coordinator close the result channel once they are gone.
    warn!(
      pool_name = %*self.pool_name,
      "WorkerPool dropped without shutdown. Cancelling workers and closing task queue."
    );
    self.shutdown_token.cancel();
    self.task_tx.close();
    self.tracker.close();
    if self.coordinator_join_handle.get_mut().is_none() {
      self.result_tx.close();
    }
  }
}
