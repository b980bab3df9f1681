use std::time::Duration;
use task_relay::{BoxError, PoolState, WorkerPool};
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Immediate Shutdown Example ---");

  let pool = WorkerPool::<String>::new(2, 10, Handle::current(), "shutdown_pool");
  pool.start().expect("Pool failed to start");
  let results = pool.results();

  for i in 0..6 {
    pool
      .submit(move || async move {
        info!("Task {} running for 1s", i);
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<String, BoxError>(format!("task {} done", i))
      })
      .await
      .expect("Failed to submit task");
  }

  tokio::time::sleep(Duration::from_millis(100)).await;
  info!(
    "Queued: {}, active: {}. Stopping now; queued tasks will be abandoned.",
    pool.queued_task_count(),
    pool.active_task_count()
  );

  let drain = tokio::spawn(async move {
    let mut received = 0;
    while let Some(result) = results.recv().await {
      info!("Received from worker {}: {:?}", result.worker_id, result.outcome);
      received += 1;
    }
    received
  });

  pool.stop().await;
  assert_eq!(pool.state(), PoolState::Stopped);

  let submit_after_stop = pool.submit(|| async { Ok::<String, BoxError>("late".to_string()) }).await;
  info!("Submit after stop returned: {:?}", submit_after_stop);

  let received = drain.await.expect("Drain task panicked");
  info!("{} of 6 tasks delivered a result before shutdown.", received);
  info!("--- Immediate Shutdown Example End ---");
}
