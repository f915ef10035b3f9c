//! Asynchronous tile-fetch dispatch core.
//!
//! Fetch requests from the rendering engine are admitted into a bounded FIFO
//! queue and executed by a fixed pool of workers. Each worker calls the
//! provider on the blocking pool and hands the result to a weakly referenced
//! owner, so a destroyed source never receives data.
//!
//! # Components
//!
//! - [`DispatchQueue`]: bounded, non-blocking admission with strict FIFO order
//! - [`WorkerPool`]: fixed set of long-lived worker tasks
//! - [`FetchTask`]: one provider call plus delivery, with timeout and
//!   cancellation
//! - [`ProviderLimiter`]: caps concurrent provider calls at the pool size,
//!   abandoned calls included
//! - [`ResultSink`]: weak delivery back to a [`TileDataSink`]
//! - [`TileDispatcher`]: the facade tying them together
//!
//! # Example
//!
//! ```ignore
//! use vectorsource::executor::{DispatchConfig, ResultSink, TileDispatcher};
//!
//! let dispatcher = TileDispatcher::start(DispatchConfig::default(), provider, ResultSink::new(&owner))?;
//! dispatcher.request_fetch(1, 0, 0)?;
//! dispatcher.shutdown().await;
//! ```

mod config;
mod dispatcher;
mod inflight;
mod limiter;
mod pool;
mod queue;
mod sink;
mod stats;
mod task;

pub use config::{
    ConfigError, DispatchConfig, CONFIG_SECTION, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_POOL_SIZE,
    DEFAULT_QUEUE_CAPACITY,
};
pub use dispatcher::{Admission, CancelOutcome, DispatchError, TileDispatcher};
pub use inflight::InFlightTable;
pub use limiter::{ProviderLimiter, ProviderPermit};
pub use pool::WorkerPool;
pub use queue::{DispatchQueue, EnqueueError};
pub use sink::{ResultSink, TileDataSink};
pub use stats::{DispatchStats, StatsSnapshot};
pub use task::{FetchOutcome, FetchTask, TaskTicket};
