// src/future/mod.rs

//! Single-assignment task futures with chaining, combination, recovery and
//! timeout force-completion.
//!
//! A [`TaskFuture`] is a handle to a value that becomes available at an
//! unspecified later time. It resolves exactly once, either `Completed` with a
//! value or `Failed` with a [`TaskError`], and may be observed by any number
//! of readers: blocking waiters ([`TaskFuture::wait`]), async waiters
//! ([`TaskFuture::resolved`]) and attached continuations ([`TaskFuture::map`]
//! and friends). Values are `Clone` so every observer gets its own copy of
//! the outcome.
//!
//! Futures are produced three ways: already resolved
//! ([`TaskFuture::completed`] / [`TaskFuture::failed`]), by submitting work to
//! a [`WorkerPool`](crate::pool::WorkerPool), or manually through a
//! [`Completer`] obtained from [`pair`].
//!
//! # Examples
//!
//! ```
//! use weft::{pair, TaskFuture};
//!
//! // Manual completion through a separate producer handle.
//! let (completer, future) = pair::<i32>();
//! let doubled = future.map(|x| x * 2);
//! completer.complete(21).unwrap();
//! assert_eq!(doubled.wait(), Ok(42));
//!
//! // A second completion attempt is a no-op and reports the rejected value.
//! assert_eq!(completer.complete(7).unwrap_err().into_inner(), 7);
//! ```
//!
//! Failure propagates through chains until a `recover` intercepts it:
//!
//! ```
//! use weft::{TaskError, TaskFuture};
//!
//! let out = TaskFuture::<i32>::failed(TaskError::computation("nope"))
//!   .map(|x| x + 1) // skipped
//!   .recover(|_| Ok(100))
//!   .map(|x| x + 1);
//! assert_eq!(out.wait(), Ok(101));
//! ```

pub use crate::error::{CompleteError, TaskError};

pub(crate) mod core;

#[cfg(test)]
mod tests;

use self::core::FutureShared;
use crate::pool::WorkerPool;
use crate::timer::Timer;

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Creates a manually-completed future, returning the producer and consumer
/// halves.
///
/// The [`Completer`] is the single producer: its first `complete`/`fail` call
/// resolves the future; later calls report [`CompleteError`] without side
/// effect. The [`TaskFuture`] may be cloned freely among readers.
pub fn pair<T>() -> (Completer<T>, TaskFuture<T>) {
  let shared = Arc::new(FutureShared::new());
  (
    Completer {
      shared: Arc::clone(&shared),
    },
    TaskFuture { shared },
  )
}

/// Runs a step of user code, converting a panic into a `Computation` error.
pub(crate) fn catch_step<U>(f: impl FnOnce() -> U) -> Result<U, TaskError> {
  panic::catch_unwind(AssertUnwindSafe(f)).map_err(TaskError::from_panic)
}

/// Like `catch_step` for fallible user code: a panic and an explicit `Err`
/// both surface as the step's failure.
pub(crate) fn catch_flat<U>(f: impl FnOnce() -> Result<U, TaskError>) -> Result<U, TaskError> {
  catch_step(f).and_then(|outcome| outcome)
}

/// A handle to a value that resolves exactly once, on a producer distinct
/// from the reader.
///
/// Cloning a `TaskFuture` clones the handle, not the computation: all clones
/// observe the same single resolution.
pub struct TaskFuture<T> {
  shared: Arc<FutureShared<T>>,
}

impl<T> Clone for TaskFuture<T> {
  fn clone(&self) -> Self {
    TaskFuture {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T> fmt::Debug for TaskFuture<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskFuture")
      .field("state", &self.shared.state_name())
      .finish()
  }
}

/// The producer half of a manually-completed future. See [`pair`].
pub struct Completer<T> {
  shared: Arc<FutureShared<T>>,
}

impl<T> fmt::Debug for Completer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Completer")
      .field("state", &self.shared.state_name())
      .finish()
  }
}

impl<T: Clone> Completer<T> {
  /// Resolves the paired future with `value`.
  ///
  /// Returns [`CompleteError`] carrying `value` back if the future already
  /// reached a terminal state; the earlier outcome is retained.
  pub fn complete(&self, value: T) -> Result<(), CompleteError<T>> {
    self.shared.complete_value(value).map_err(CompleteError)
  }

  /// Resolves the paired future with a failure.
  ///
  /// Returns [`CompleteError`] carrying `error` back if the future already
  /// reached a terminal state.
  pub fn fail(&self, error: TaskError) -> Result<(), CompleteError<TaskError>> {
    self.shared.complete_error(error).map_err(CompleteError)
  }

  /// Whether the paired future has already reached a terminal state.
  pub fn is_resolved(&self) -> bool {
    self.shared.is_resolved()
  }
}

impl<T> TaskFuture<T> {
  pub(crate) fn pending() -> (TaskFuture<T>, Arc<FutureShared<T>>) {
    let shared = Arc::new(FutureShared::new());
    (
      TaskFuture {
        shared: Arc::clone(&shared),
      },
      shared,
    )
  }

  /// Whether the future has reached a terminal state.
  pub fn is_resolved(&self) -> bool {
    self.shared.is_resolved()
  }
}

impl<T: Clone + Send + 'static> TaskFuture<T> {
  /// A future that is already `Completed` with `value`.
  pub fn completed(value: T) -> Self {
    let (future, shared) = Self::pending();
    shared.resolve(Ok(value));
    future
  }

  /// A future that is already `Failed` with `error`.
  pub fn failed(error: TaskError) -> Self {
    let (future, shared) = Self::pending();
    shared.resolve(Err(error));
    future
  }

  /// Non-blocking inspection: the outcome if terminal, `None` if still
  /// pending.
  pub fn try_get(&self) -> Option<Result<T, TaskError>> {
    self.shared.try_outcome()
  }

  /// Blocks the calling thread until the future resolves, returning the
  /// tagged outcome.
  ///
  /// A failure is returned as `Err`, never raised; callers that want to
  /// propagate it use `?` as usual.
  pub fn wait(&self) -> Result<T, TaskError> {
    self.shared.wait()
  }

  /// An async wait on the same resolution. The returned future is `Ready`
  /// once this task future is terminal.
  pub fn resolved(&self) -> ResolvedFuture<'_, T> {
    ResolvedFuture {
      shared: &self.shared,
    }
  }

  /// Schedules `f(value)` to run after this future completes successfully.
  ///
  /// On failure, `f` is never invoked and the same error propagates to the
  /// returned future. The continuation runs inline on the thread that
  /// resolves this future (or on the caller if already terminal); use
  /// [`TaskFuture::map_async`] to guarantee pool redispatch instead.
  pub fn map<U, F>(&self, f: F) -> TaskFuture<U>
  where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    let (future, downstream) = TaskFuture::pending();
    self.shared.subscribe(Box::new(move |outcome| {
      let next = match outcome {
        Ok(value) => catch_step(move || f(value)),
        Err(error) => Err(error),
      };
      downstream.resolve(next);
    }));
    future
  }

  /// Like [`TaskFuture::map`], but the continuation is always redispatched
  /// through `pool` instead of running on the producer's thread.
  ///
  /// This bounds stack depth in long chains and keeps a slow continuation
  /// from starving the worker that resolved this future. Failure still
  /// propagates inline, without invoking `f` or occupying a worker.
  pub fn map_async<U, F>(&self, pool: &WorkerPool, f: F) -> TaskFuture<U>
  where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    let (future, downstream) = TaskFuture::pending();
    let handle = pool.handle();
    self.shared.subscribe(Box::new(move |outcome| match outcome {
      Err(error) => {
        downstream.resolve(Err(error));
      }
      Ok(value) => {
        let dispatched = Arc::clone(&downstream);
        let accepted = handle.execute(Box::new(move || {
          dispatched.resolve(catch_step(move || f(value)));
        }));
        if !accepted {
          downstream.resolve(Err(TaskError::pool_shut_down()));
        }
      }
    }));
    future
  }

  /// Value-consuming variant of [`TaskFuture::map`]: runs `f(value)` for its
  /// effect and yields a unit future. Failure propagates without invoking
  /// `f`.
  pub fn map_unit<F>(&self, f: F) -> TaskFuture<()>
  where
    F: FnOnce(T) + Send + 'static,
  {
    self.map(f)
  }

  /// Schedules `f()` (ignoring this future's value) after this future
  /// completes successfully. Failure propagates without invoking `f`.
  pub fn run_after<F>(&self, f: F) -> TaskFuture<()>
  where
    F: FnOnce() + Send + 'static,
  {
    self.map(move |_| f())
  }

  /// Waits for both inputs to reach a terminal state and combines their
  /// values with `f`.
  ///
  /// The combined future stays pending until both inputs are terminal, even
  /// when one of them has already failed. If either input failed, the
  /// combined future then fails with the first failure observed and `f` is
  /// never invoked; when both inputs fail near-simultaneously, which failure
  /// was observed first is not deterministic and must not be relied upon.
  pub fn combine<U, R, F>(&self, other: &TaskFuture<U>, f: F) -> TaskFuture<R>
  where
    U: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: FnOnce(T, U) -> R + Send + 'static,
  {
    self.combine_inner(other, f, None)
  }

  /// Like [`TaskFuture::combine`], but `f` is always redispatched through
  /// `pool` once both inputs have completed.
  pub fn combine_async<U, R, F>(&self, pool: &WorkerPool, other: &TaskFuture<U>, f: F) -> TaskFuture<R>
  where
    U: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: FnOnce(T, U) -> R + Send + 'static,
  {
    self.combine_inner(other, f, Some(pool.handle()))
  }

  fn combine_inner<U, R, F>(
    &self,
    other: &TaskFuture<U>,
    f: F,
    redispatch: Option<crate::pool::PoolHandle>,
  ) -> TaskFuture<R>
  where
    U: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: FnOnce(T, U) -> R + Send + 'static,
  {
    let (future, downstream) = TaskFuture::pending();
    let join = Arc::new(Mutex::new(JoinState {
      left: None,
      right: None,
      first_failure: None,
      merge: Some(f),
    }));

    let left_target = Arc::clone(&downstream);
    let left_join = Arc::clone(&join);
    let left_redispatch = redispatch.clone();
    self.shared.subscribe(Box::new(move |outcome| {
      let ready = {
        let mut state = left_join.lock();
        state.note_failure(&outcome);
        state.left = Some(outcome);
        state.take_ready()
      };
      settle_join(left_target, left_redispatch, ready);
    }));

    let right_target = downstream;
    other.shared.subscribe(Box::new(move |outcome| {
      let ready = {
        let mut state = join.lock();
        state.note_failure(&outcome);
        state.right = Some(outcome);
        state.take_ready()
      };
      settle_join(right_target, redispatch, ready);
    }));

    future
  }

  /// Flattens a future-producing continuation: runs `f(value)` after this
  /// future completes and resolves the returned future with the inner
  /// future's outcome. Failure of either stage propagates.
  pub fn and_then<U, F>(&self, f: F) -> TaskFuture<U>
  where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> TaskFuture<U> + Send + 'static,
  {
    let (future, downstream) = TaskFuture::pending();
    self.shared.subscribe(Box::new(move |outcome| match outcome {
      Err(error) => {
        downstream.resolve(Err(error));
      }
      Ok(value) => match catch_step(move || f(value)) {
        Err(error) => {
          downstream.resolve(Err(error));
        }
        Ok(inner) => {
          inner.shared.subscribe(Box::new(move |inner_outcome| {
            downstream.resolve(inner_outcome);
          }));
        }
      },
    }));
    future
  }

  /// Intercepts a failure: on `Err`, resolves the returned future with
  /// `handler(error)`; on success, the value passes through unchanged.
  ///
  /// A failure (or panic) inside `handler` propagates as a new failure.
  pub fn recover<F>(&self, handler: F) -> TaskFuture<T>
  where
    F: FnOnce(TaskError) -> Result<T, TaskError> + Send + 'static,
  {
    let (future, downstream) = TaskFuture::pending();
    self.shared.subscribe(Box::new(move |outcome| {
      let next = match outcome {
        Ok(value) => Ok(value),
        Err(error) => catch_flat(move || handler(error)),
      };
      downstream.resolve(next);
    }));
    future
  }

  /// Force-completes this future with `fallback` if it has not resolved
  /// within `timeout`.
  ///
  /// The first terminal transition wins: a later natural completion is
  /// ignored, and if the future resolves before the deadline the fallback is
  /// discarded. Returns a clone of this future for chaining.
  pub fn complete_on_timeout(&self, fallback: T, timeout: Duration, timer: &Timer) -> TaskFuture<T> {
    let shared = Arc::clone(&self.shared);
    timer.schedule(timeout, move || {
      if !shared.resolve(Ok(fallback)) {
        tracing::trace!("timeout fallback ignored: future already resolved");
      }
    });
    self.clone()
  }

  /// Force-fails this future with [`TaskError::Timeout`] if it has not
  /// resolved within `timeout`. First terminal transition wins, as with
  /// [`TaskFuture::complete_on_timeout`].
  pub fn fail_on_timeout(&self, timeout: Duration, timer: &Timer) -> TaskFuture<T> {
    let shared = Arc::clone(&self.shared);
    timer.schedule(timeout, move || {
      if !shared.resolve(Err(TaskError::Timeout)) {
        tracing::trace!("deadline ignored: future already resolved");
      }
    });
    self.clone()
  }
}

struct JoinState<T, U, F> {
  left: Option<Result<T, TaskError>>,
  right: Option<Result<U, TaskError>>,
  // Set by the first failing input, in observation order.
  first_failure: Option<TaskError>,
  merge: Option<F>,
}

impl<T, U, F> JoinState<T, U, F> {
  fn note_failure<V>(&mut self, outcome: &Result<V, TaskError>) {
    if let Err(error) = outcome {
      if self.first_failure.is_none() {
        self.first_failure = Some(error.clone());
      }
    }
  }

  /// Both inputs must be terminal before the join settles; a failed input
  /// alone keeps the join (and the combined future) pending.
  fn take_ready(&mut self) -> Option<Result<(T, U, F), TaskError>> {
    if self.left.is_none() || self.right.is_none() {
      return None;
    }
    if let Some(error) = self.first_failure.take() {
      return Some(Err(error));
    }
    match (self.left.take(), self.right.take(), self.merge.take()) {
      (Some(Ok(a)), Some(Ok(b)), Some(f)) => Some(Ok((a, b, f))),
      _ => None,
    }
  }
}

fn settle_join<T, U, R, F>(
  target: Arc<FutureShared<R>>,
  redispatch: Option<crate::pool::PoolHandle>,
  ready: Option<Result<(T, U, F), TaskError>>,
) where
  T: Send + 'static,
  U: Send + 'static,
  R: Clone + Send + 'static,
  F: FnOnce(T, U) -> R + Send + 'static,
{
  match ready {
    None => {}
    Some(Err(error)) => {
      target.resolve(Err(error));
    }
    Some(Ok((a, b, merge))) => merge_into(target, redispatch, a, b, merge),
  }
}

fn merge_into<T, U, R, F>(
  target: Arc<FutureShared<R>>,
  redispatch: Option<crate::pool::PoolHandle>,
  a: T,
  b: U,
  merge: F,
) where
  T: Send + 'static,
  U: Send + 'static,
  R: Clone + Send + 'static,
  F: FnOnce(T, U) -> R + Send + 'static,
{
  match redispatch {
    None => {
      target.resolve(catch_step(move || merge(a, b)));
    }
    Some(handle) => {
      let dispatched = Arc::clone(&target);
      let accepted = handle.execute(Box::new(move || {
        dispatched.resolve(catch_step(move || merge(a, b)));
      }));
      if !accepted {
        target.resolve(Err(TaskError::pool_shut_down()));
      }
    }
  }
}

/// Future returned by [`TaskFuture::resolved`], ready once the task future
/// reaches a terminal state.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct ResolvedFuture<'a, T> {
  shared: &'a Arc<FutureShared<T>>,
}

impl<'a, T> fmt::Debug for ResolvedFuture<'a, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResolvedFuture")
      .field("state", &self.shared.state_name())
      .finish()
  }
}

impl<'a, T: Clone> Future for ResolvedFuture<'a, T> {
  type Output = Result<T, TaskError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.shared.poll_resolved(cx)
  }
}
