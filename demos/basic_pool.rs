use std::time::Duration;
use task_relay::{BoxError, IdentifiedTask, ShutdownMode, WorkerPool};
use tokio::runtime::Handle;
use tracing::{info, warn};

async fn checksum(id: usize, delay_ms: u64) -> Result<u64, BoxError> {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  Ok((id as u64 + 1) * 1_000 + delay_ms)
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Pool Example ---");

  let worker_count = std::env::args().nth(1).and_then(|arg| arg.parse().ok()).unwrap_or(3);
  let pool = WorkerPool::<u64>::new(worker_count, 4, Handle::current(), "basic_pool");
  pool.start().expect("Pool failed to start");

  let results = pool.results();
  let printer = tokio::spawn(async move {
    while let Some(result) = results.recv().await {
      match &result.outcome {
        Ok(value) => info!(
          "Task {:?} finished on worker {}: {}",
          result.task_id, result.worker_id, value
        ),
        Err(e) => warn!("Task {:?} failed on worker {}: {}", result.task_id, result.worker_id, e),
      }
    }
    info!("Result channel closed.");
  });

  for i in 0..8 {
    let delay: u64 = 200 + (i as u64 % 3 * 150);
    let task = IdentifiedTask::new(format!("checksum-{}", i), move || checksum(i, delay));
    if let Err(e) = pool.submit(task).await {
      warn!("Failed to submit task {}: {}", i, e);
    }
  }

  info!("All tasks submitted. Draining the queue before stopping.");
  pool.shutdown(ShutdownMode::Graceful).await;
  printer.await.expect("Result printer panicked");
  info!("--- Basic Pool Example End ---");
}
