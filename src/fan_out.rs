use crate::channel::{self, Delivery};
use crate::error::{BoxError, PoolError};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, debug_span, error, trace, Instrument};

/// Spreads the items of `inputs` over `worker_count` concurrent workers, each
/// applying `work` to one item at a time.
///
/// Successful outputs arrive on the first receiver and failures on the second,
/// in completion order. Both receivers are closed exactly once, by a single
/// coordinator, after every worker has exited.
///
/// Cancellation of `token` is cooperative: a call to `work` already running is
/// not interrupted, but no new item is started and any worker blocked on
/// delivering an output gives up. If any worker exits because of
/// cancellation, the coordinator closes the result channel and then delivers
/// exactly one `PoolError::TaskCancelled` before closing the error channel, so
/// the error receiver must be drained for the coordinator to finish.
///
/// Must be called from within a Tokio runtime.
pub fn fan_out<I, O, F, Fut>(
  token: &CancellationToken,
  inputs: Receiver<I>,
  work: F,
  worker_count: usize,
) -> (Receiver<O>, Receiver<PoolError>)
where
  I: Send + 'static,
  O: Send + 'static,
  F: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
{
  let worker_count = worker_count.max(1);
  let (results_tx, results_rx) = channel::bounded(worker_count);
  let (errors_tx, errors_rx) = channel::bounded(worker_count);
  let work = Arc::new(work);
  let tracker = TaskTracker::new();
  let saw_cancellation = Arc::new(AtomicBool::new(false));

  for worker_id in 0..worker_count {
    tracker.spawn(
      run_worker(
        token.clone(),
        inputs.clone(),
        work.clone(),
        results_tx.clone(),
        errors_tx.clone(),
        saw_cancellation.clone(),
      )
      .instrument(debug_span!("fan_out_worker", worker_id)),
    );
  }
  tracker.close();

  tokio::spawn(async move {
    tracker.wait().await;
    results_tx.close();
    if saw_cancellation.load(Ordering::Acquire) && errors_tx.send(PoolError::TaskCancelled).await.is_err() {
      debug!("Error receiver dropped before cancellation could be reported.");
    }
    errors_tx.close();
    trace!(worker_count, "Fan-out workers finished. Output channels closed.");
  });

  (results_rx, errors_rx)
}

async fn run_worker<I, O, F, Fut>(
  token: CancellationToken,
  inputs: Receiver<I>,
  work: Arc<F>,
  results_tx: Sender<O>,
  errors_tx: Sender<PoolError>,
  saw_cancellation: Arc<AtomicBool>,
) where
  F: Fn(CancellationToken, I) -> Fut,
  Fut: Future<Output = Result<O, BoxError>>,
{
  let mut cancelled = false;

  loop {
    let item = tokio::select! {
      biased;
      _ = token.cancelled() => {
        cancelled = true;
        break;
      }
      recv_result = inputs.recv() => match recv_result {
        Ok(item) => item,
        Err(_) => break,
      },
    };

    if token.is_cancelled() {
      cancelled = true;
      break;
    }

    let (work_ref, token_ref) = (&work, &token);
    let outcome = AssertUnwindSafe(async move { work_ref(token_ref.clone(), item).await })
      .catch_unwind()
      .await;

    let delivery = match outcome {
      Ok(Ok(value)) => channel::send_or_cancel(&token, &results_tx, value).await,
      Ok(Err(work_error)) => {
        trace!("Work returned an error: {}", work_error);
        channel::send_or_cancel(&token, &errors_tx, PoolError::TaskFailed(work_error)).await
      }
      Err(_panic_payload) => {
        error!("Work function panicked.");
        channel::send_or_cancel(&token, &errors_tx, PoolError::TaskPanicked).await
      }
    };

    match delivery {
      Delivery::Sent => {}
      Delivery::Cancelled => {
        cancelled = true;
        break;
      }
      Delivery::Closed => {
        debug!("Output receiver dropped. Worker exiting.");
        break;
      }
    }
  }

  if cancelled {
    debug!("Cancellation observed. Worker exiting.");
    saw_cancellation.store(true, Ordering::Release);
  }
}
