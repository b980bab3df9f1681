use async_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

/// How an attempt to hand an item to a channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
  Sent,
  /// The token fired before a receiver took the item.
  Cancelled,
  /// Every receiver is gone or the channel was closed.
  Closed,
}

/// Bounded MPMC channel. Capacity is clamped to at least one slot since
/// `async_channel` has no rendezvous mode.
pub(crate) fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
  async_channel::bounded(capacity.max(1))
}

/// Sends `item`, giving up as soon as `token` is cancelled.
///
/// Cancellation wins when both are ready.
pub(crate) async fn send_or_cancel<T>(token: &CancellationToken, tx: &Sender<T>, item: T) -> Delivery {
  tokio::select! {
    biased;
    _ = token.cancelled() => Delivery::Cancelled,
    sent = tx.send(item) => match sent {
      Ok(()) => Delivery::Sent,
      Err(_) => Delivery::Closed,
    },
  }
}
