use crate::channel::{self, Delivery};

use async_channel::Receiver;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

/// Merges several receivers into one.
///
/// Every item sent on any input appears exactly once on the output, unless
/// `token` is cancelled first, in which case forwarding stops early. The
/// output is closed once every input has been drained or abandoned.
///
/// Must be called from within a Tokio runtime.
pub fn fan_in<T, S>(token: &CancellationToken, channels: S) -> Receiver<T>
where
  T: Send + 'static,
  S: IntoIterator<Item = Receiver<T>>,
{
  let channels: Vec<Receiver<T>> = channels.into_iter().collect();
  let (out_tx, out_rx) = channel::bounded(channels.len());
  let tracker = TaskTracker::new();
  let input_count = channels.len();

  for input in channels {
    let token = token.clone();
    let out_tx = out_tx.clone();
    tracker.spawn(async move {
      while let Some(item) = recv_or_cancel(&token, &input).await {
        if channel::send_or_cancel(&token, &out_tx, item).await != Delivery::Sent {
          break;
        }
      }
    });
  }
  tracker.close();

  tokio::spawn(async move {
    tracker.wait().await;
    out_tx.close();
    trace!(input_count, "Fan-in inputs drained. Output channel closed.");
  });

  out_rx
}

async fn recv_or_cancel<T>(token: &CancellationToken, input: &Receiver<T>) -> Option<T> {
  tokio::select! {
    biased;
    _ = token.cancelled() => None,
    recv_result = input.recv() => recv_result.ok(),
  }
}
