use task_relay::{collect_all, distribute, fan_in, fan_out, process_all, BoxError, CancellationToken, PoolError};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,task_relay=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

fn negative_input(x: i64) -> BoxError {
  Arc::new(io::Error::new(io::ErrorKind::InvalidInput, format!("negative input: {}", x)))
}

#[tokio::test]
async fn test_fan_out_maps_every_input() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let (results, errors) = distribute(
    &token,
    1..=10i64,
    |_token, x: i64| async move { Ok::<i64, BoxError>(x * x) },
    3,
  );

  let (mut squares, failures) = timeout(Duration::from_secs(5), collect_all(results, errors))
    .await
    .unwrap();
  squares.sort_unstable();
  assert_eq!(squares, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);
  assert!(failures.is_empty(), "unexpected errors: {:?}", failures);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_partitions_errors_from_successes() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let inputs = vec![-2i64, -1, 0, 1, 2];
  let (input_tx, input_rx) = async_channel::bounded(1);
  let input_count = inputs.len();

  tokio::spawn(async move {
    for x in inputs {
      input_tx.send(x).await.unwrap();
    }
  });

  let (results, errors) = fan_out(
    &token,
    input_rx,
    |_token, x: i64| async move {
      if x < 0 {
        Err(negative_input(x))
      } else {
        Ok(x * 10)
      }
    },
    2,
  );

  let (mut successes, failures) = timeout(Duration::from_secs(5), collect_all(results, errors))
    .await
    .unwrap();
  successes.sort_unstable();
  assert_eq!(successes, vec![0, 10, 20]);
  assert_eq!(failures.len(), 2);
  assert!(failures.iter().all(|e| matches!(e, PoolError::TaskFailed(_))));
  assert_eq!(successes.len() + failures.len(), input_count);
}

#[tokio::test]
async fn test_fan_out_single_worker_preserves_order() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let (results, errors) = distribute(
    &token,
    vec!["a", "b", "c", "d"],
    |_token, s: &'static str| async move { Ok::<String, BoxError>(s.to_uppercase()) },
    1,
  );

  let (letters, failures) = collect_all(results, errors).await;
  assert_eq!(letters, vec!["A", "B", "C", "D"]);
  assert!(failures.is_empty());
}

#[tokio::test]
async fn test_fan_out_reports_panicking_work() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let (values, failures) = process_all(
    &token,
    vec![1u32, 2, 3],
    |_token, x: u32| async move {
      if x == 2 {
        panic!("work intentionally panicked on {}", x);
      }
      Ok::<u32, BoxError>(x)
    },
    2,
  )
  .await;

  let mut values = values;
  values.sort_unstable();
  assert_eq!(values, vec![1, 3]);
  assert_eq!(failures, vec![PoolError::TaskPanicked]);
}

#[tokio::test]
async fn test_fan_in_merges_every_item_once() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let batches: Vec<Vec<u32>> = vec![vec![1, 2, 3], vec![10, 20], vec![100]];

  let mut receivers = Vec::new();
  for batch in batches {
    let (tx, rx) = async_channel::bounded(1);
    receivers.push(rx);
    tokio::spawn(async move {
      for item in batch {
        tx.send(item).await.unwrap();
      }
    });
  }

  let merged = fan_in(&token, receivers);
  let mut items = Vec::new();
  while let Ok(item) = timeout(Duration::from_secs(5), merged.recv()).await.unwrap() {
    items.push(item);
  }

  items.sort_unstable();
  assert_eq!(items, vec![1, 2, 3, 10, 20, 100]);
}

#[tokio::test]
async fn test_fan_in_with_no_inputs_closes_immediately() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let merged = fan_in::<u8, _>(&token, Vec::new());
  assert!(timeout(Duration::from_secs(1), merged.recv()).await.unwrap().is_err());
}

#[tokio::test]
async fn test_fan_in_stops_forwarding_on_cancellation() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  // Senders stay alive, so only cancellation can close the output.
  let (_tx_a, rx_a) = async_channel::bounded::<u8>(1);
  let (_tx_b, rx_b) = async_channel::bounded::<u8>(1);

  let merged = fan_in(&token, [rx_a, rx_b]);
  token.cancel();
  assert!(timeout(Duration::from_secs(1), merged.recv()).await.unwrap().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_terminates_all_workers() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let started = Arc::new(AtomicUsize::new(0));
  let started_in_work = started.clone();

  let (results, errors) = distribute(
    &token,
    0..100u32,
    move |_token, x: u32| {
      let started = started_in_work.clone();
      async move {
        started.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(5)).await;
        Ok::<u32, BoxError>(x)
      }
    },
    4,
  );

  let mut received = 0;
  while received < 5 {
    results.recv().await.unwrap();
    received += 1;
  }
  token.cancel();

  let (remaining, failures) = timeout(Duration::from_secs(5), collect_all(results, errors))
    .await
    .expect("every worker should exit after cancellation");

  assert!(received + remaining.len() < 100);
  assert!(
    failures.iter().any(PoolError::is_cancellation),
    "expected at least one cancellation error, got {:?}",
    failures
  );
  assert!(started.load(Ordering::SeqCst) < 100);
}

#[tokio::test]
async fn test_cancellation_reported_even_with_full_error_channel() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  // One worker means the error channel has a single slot, taken by the failure
  // on item 0 before anyone reads errors.
  let (results, errors) = distribute(
    &token,
    0..100i64,
    |_token, x: i64| async move {
      if x == 0 {
        Err::<i64, BoxError>(Arc::new(io::Error::new(io::ErrorKind::Other, "bad")))
      } else {
        Ok(x)
      }
    },
    1,
  );

  for _ in 0..5 {
    results.recv().await.unwrap();
  }
  token.cancel();

  let (_remaining, failures) = timeout(Duration::from_secs(5), collect_all(results, errors))
    .await
    .expect("coordinator should finish once errors are drained");

  assert!(
    failures.iter().any(|e| matches!(e, PoolError::TaskFailed(_))),
    "the failure on item 0 must still be delivered: {:?}",
    failures
  );
  assert_eq!(
    failures.iter().filter(|e| e.is_cancellation()).count(),
    1,
    "expected exactly one cancellation report, got {:?}",
    failures
  );
}

#[tokio::test]
async fn test_process_all_collects_partition() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let (mut values, failures) = process_all(
    &token,
    vec![-2i64, -1, 0, 1, 2],
    |_token, x: i64| async move {
      if x < 0 {
        Err(negative_input(x))
      } else {
        Ok(x * 10)
      }
    },
    3,
  )
  .await;

  values.sort_unstable();
  assert_eq!(values, vec![0, 10, 20]);
  assert_eq!(failures.len(), 2);
  let mut messages: Vec<String> = failures.iter().map(|e| e.to_string()).collect();
  messages.sort();
  assert_eq!(
    messages,
    vec!["Task failed: negative input: -1", "Task failed: negative input: -2"]
  );
}

#[tokio::test]
async fn test_process_all_with_cancelled_token_does_no_work() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  token.cancel();
  let calls = Arc::new(AtomicUsize::new(0));
  let calls_in_work = calls.clone();

  let (values, failures) = timeout(
    Duration::from_secs(2),
    process_all(
      &token,
      vec![1u8, 2, 3],
      move |_token, x: u8| {
        calls_in_work.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<u8, BoxError>(x) }
      },
      2,
    ),
  )
  .await
  .unwrap();

  assert!(values.is_empty());
  assert_eq!(failures, vec![PoolError::TaskCancelled]);
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_process_all_cancels_its_child_token_on_return() {
  setup_tracing_for_test();
  let token = CancellationToken::new();
  let seen_tokens = Arc::new(parking_lot::Mutex::new(Vec::new()));
  let seen_in_work = seen_tokens.clone();

  let (values, _failures) = process_all(
    &token,
    vec![1u8, 2],
    move |work_token: CancellationToken, x: u8| {
      seen_in_work.lock().push(work_token);
      async move { Ok::<u8, BoxError>(x) }
    },
    2,
  )
  .await;

  assert_eq!(values.len(), 2);
  assert!(!token.is_cancelled(), "the caller's token must be left alone");
  let seen = seen_tokens.lock();
  assert_eq!(seen.len(), 2);
  assert!(seen.iter().all(CancellationToken::is_cancelled));
}
