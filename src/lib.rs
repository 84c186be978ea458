#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Single-assignment task futures over a fixed worker pool, with counter
//! primitives for demonstrating contended shared state.
//!
//! Weft provides a small task-composition core: a [`TaskFuture`] resolves
//! exactly once on a worker distinct from its creator and supports chaining
//! (`map`, `and_then`, `combine`), failure recovery (`recover`) and
//! timeout-based force-completion, alongside a [`WorkerPool`] with explicit
//! graceful shutdown and a pair of counters ([`counter::AtomicCounter`],
//! [`counter::PlainCounter`]) contrasting correct and racy concurrent
//! increment.

pub mod counter;
pub mod error;
pub mod future;
pub mod pool;
pub mod timer;

// Public re-exports for convenience.
pub use error::{CompleteError, TaskError};
pub use future::{pair, Completer, ResolvedFuture, TaskFuture};
pub use pool::WorkerPool;
pub use timer::Timer;

// Helper function to check if a type is Send + Sync.
// Useful for static assertions in generic code.
#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}
