//! A Tokio-based worker pool and fan-out/fan-in toolkit with cooperative
//! cancellation.
//!
//! Every shared output channel is closed by one coordinator task after all of
//! its producers have exited, never by a producer itself.

mod channel;
mod distribute;
mod error;
mod fan_in;
mod fan_out;
mod pool;
mod result;
mod task;
mod worker;

pub use distribute::{collect_all, distribute, process_all};
pub use error::{BoxError, PoolError};
pub use fan_in::fan_in;
pub use fan_out::fan_out;
pub use pool::{PoolState, ShutdownMode, WorkerPool};
pub use result::{ResultReceiver, TaskResult};
pub use task::{BoxedTask, IdentifiedTask, Task, TaskFuture};
pub use worker::Worker;

pub use async_channel::{Receiver, Sender};
pub use tokio_util::sync::CancellationToken;
