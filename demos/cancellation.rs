use std::time::Duration;
use task_relay::{collect_all, distribute, BoxError, CancellationToken};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Cancellation Example ---");

  let token = CancellationToken::new();
  let (results, errors) = distribute(
    &token,
    0..100u32,
    |_token, x: u32| async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok::<u32, BoxError>(x)
    },
    4,
  );

  for _ in 0..5 {
    match results.recv().await {
      Ok(value) => info!("Early result: {}", value),
      Err(_) => break,
    }
  }

  info!("Cancelling remaining work.");
  token.cancel();

  let (late, failures) = collect_all(results, errors).await;
  info!("{} result(s) arrived after cancellation.", late.len());
  for failure in failures {
    warn!("Reported: {}", failure);
  }
  info!("--- Cancellation Example End ---");
}
