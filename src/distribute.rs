use crate::channel::{self, Delivery};
use crate::error::{BoxError, PoolError};
use crate::fan_out::fan_out;

use std::future::Future;

use async_channel::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Feeds a finite collection into [`fan_out`] and returns its live channels.
///
/// A feeder task sends the items one by one and stops early on cancellation,
/// so callers can start consuming before feeding completes.
pub fn distribute<Items, I, O, F, Fut>(
  token: &CancellationToken,
  inputs: Items,
  work: F,
  worker_count: usize,
) -> (Receiver<O>, Receiver<PoolError>)
where
  Items: IntoIterator<Item = I>,
  Items::IntoIter: Send + 'static,
  I: Send + 'static,
  O: Send + 'static,
  F: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
{
  let (feed_tx, feed_rx) = channel::bounded(1);
  let feeder_token = token.clone();
  let items = inputs.into_iter();

  tokio::spawn(async move {
    let mut fed = 0usize;
    for item in items {
      match channel::send_or_cancel(&feeder_token, &feed_tx, item).await {
        Delivery::Sent => fed += 1,
        Delivery::Cancelled | Delivery::Closed => {
          debug!(fed, "Feeder stopped early.");
          break;
        }
      }
    }
    trace!(fed, "Feeder finished.");
  });

  fan_out(token, feed_rx, work, worker_count)
}

/// Runs `work` over every input and waits for all of it.
///
/// The work runs under a child of `token` that is cancelled when this returns,
/// so no worker outlives the call. Outputs and errors are returned in
/// completion order.
pub async fn process_all<Items, I, O, F, Fut>(
  token: &CancellationToken,
  inputs: Items,
  work: F,
  worker_count: usize,
) -> (Vec<O>, Vec<PoolError>)
where
  Items: IntoIterator<Item = I>,
  Items::IntoIter: Send + 'static,
  I: Send + 'static,
  O: Send + 'static,
  F: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
{
  let child = token.child_token();
  let _cancel_on_return = child.clone().drop_guard();

  let (results, errors) = distribute(&child, inputs, work, worker_count);
  collect_all(results, errors).await
}

/// Drains a results/errors pair until both are closed.
///
/// Both receivers are polled together, so a producer blocked on one of them
/// can never stall the drain of the other.
pub async fn collect_all<O>(results: Receiver<O>, errors: Receiver<PoolError>) -> (Vec<O>, Vec<PoolError>) {
  let mut values = Vec::new();
  let mut failures = Vec::new();
  let mut results_open = true;
  let mut errors_open = true;

  while results_open || errors_open {
    tokio::select! {
      value = results.recv(), if results_open => match value {
        Ok(value) => values.push(value),
        Err(_) => results_open = false,
      },
      failure = errors.recv(), if errors_open => match failure {
        Ok(failure) => failures.push(failure),
        Err(_) => errors_open = false,
      },
    }
  }

  (values, failures)
}
