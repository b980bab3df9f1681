use task_relay::{process_all, BoxError, CancellationToken};
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Fan-Out Example ---");

  let worker_count = std::env::args().nth(1).and_then(|arg| arg.parse().ok()).unwrap_or(4);
  let token = CancellationToken::new();

  let (mut squares, errors) = process_all(
    &token,
    1..=10u64,
    |_token, x: u64| async move { Ok::<u64, BoxError>(x * x) },
    worker_count,
  )
  .await;

  squares.sort_unstable();
  info!("Squares ({} workers): {:?}", worker_count, squares);
  info!("Errors: {:?}", errors);
  info!("--- Fan-Out Example End ---");
}
