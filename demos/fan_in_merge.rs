use std::time::Duration;
use task_relay::{fan_in, CancellationToken};
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Fan-In Example ---");

  let token = CancellationToken::new();
  let sources = [("sensor-a", 3u64), ("sensor-b", 2), ("sensor-c", 1)];

  let mut receivers = Vec::new();
  for (name, readings) in sources {
    let (tx, rx) = async_channel::bounded(1);
    receivers.push(rx);
    tokio::spawn(async move {
      for n in 0..readings {
        tokio::time::sleep(Duration::from_millis(20 * (n + 1))).await;
        if tx.send(format!("{}#{}", name, n)).await.is_err() {
          break;
        }
      }
    });
  }

  let merged = fan_in(&token, receivers);
  while let Ok(reading) = merged.recv().await {
    info!("Merged reading: {}", reading);
  }
  info!("All sources drained.");
  info!("--- Fan-In Example End ---");
}
