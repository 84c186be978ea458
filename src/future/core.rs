// src/future/core.rs

use crate::error::TaskError;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};

// State constants for FutureShared::state.
pub(crate) const STATE_PENDING: usize = 0; // No outcome yet. Initial state.
pub(crate) const STATE_RESOLVING: usize = 1; // The winning producer is writing the outcome (critical section).
pub(crate) const STATE_COMPLETED: usize = 2; // Terminal: outcome slot holds Ok(value).
pub(crate) const STATE_FAILED: usize = 3; // Terminal: outcome slot holds Err(error).

pub(crate) type Callback<T> = Box<dyn FnOnce(Result<T, TaskError>) + Send>;

/// Shared state behind a `TaskFuture`/`Completer` pair and every combinator
/// output.
///
/// The outcome is written exactly once, guarded by the PENDING -> RESOLVING
/// transition, and then stays in the slot for the lifetime of the shared state
/// so that any number of readers (blocking waiters, async waiters, attached
/// continuations) can observe a clone of it.
pub(crate) struct FutureShared<T> {
  state: AtomicUsize,
  outcome: Mutex<Option<Result<T, TaskError>>>,
  resolved: Condvar,
  callbacks: Mutex<Vec<Callback<T>>>,
  wakers: Mutex<Vec<Waker>>,
}

impl<T> fmt::Debug for FutureShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FutureShared")
      .field("state", &self.state_name())
      .finish_non_exhaustive()
  }
}

impl<T> FutureShared<T> {
  pub(crate) fn new() -> Self {
    FutureShared {
      state: AtomicUsize::new(STATE_PENDING),
      outcome: Mutex::new(None),
      resolved: Condvar::new(),
      callbacks: Mutex::new(Vec::new()),
      wakers: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn is_resolved(&self) -> bool {
    self.state.load(Ordering::Acquire) >= STATE_COMPLETED
  }

  pub(crate) fn state_name(&self) -> &'static str {
    match self.state.load(Ordering::Relaxed) {
      STATE_PENDING => "Pending",
      STATE_RESOLVING => "Resolving",
      STATE_COMPLETED => "Completed",
      STATE_FAILED => "Failed",
      _ => "Unknown",
    }
  }

  /// Claims the single PENDING -> RESOLVING transition. Returns `false` if
  /// another producer already won it.
  fn try_begin_resolve(&self) -> bool {
    self
      .state
      .compare_exchange(
        STATE_PENDING,
        STATE_RESOLVING,
        Ordering::AcqRel,
        Ordering::Acquire,
      )
      .is_ok()
  }
}

impl<T: Clone> FutureShared<T> {
  /// Resolves the future with `outcome` if it is still pending. Returns
  /// whether this call was the one that resolved it.
  pub(crate) fn resolve(&self, outcome: Result<T, TaskError>) -> bool {
    if !self.try_begin_resolve() {
      return false;
    }
    self.commit(outcome);
    true
  }

  /// Like `resolve` for a success outcome, handing the value back if the
  /// future was already terminal.
  pub(crate) fn complete_value(&self, value: T) -> Result<(), T> {
    if !self.try_begin_resolve() {
      return Err(value);
    }
    self.commit(Ok(value));
    Ok(())
  }

  /// Like `resolve` for a failure outcome, handing the error back if the
  /// future was already terminal.
  pub(crate) fn complete_error(&self, error: TaskError) -> Result<(), TaskError> {
    if !self.try_begin_resolve() {
      return Err(error);
    }
    self.commit(Err(error));
    Ok(())
  }

  /// Publishes the outcome and runs every observer. Only the thread that won
  /// `try_begin_resolve` may call this, exactly once.
  fn commit(&self, outcome: Result<T, TaskError>) {
    let terminal = if outcome.is_ok() {
      STATE_COMPLETED
    } else {
      STATE_FAILED
    };
    {
      let mut slot = self.outcome.lock();
      *slot = Some(outcome);
      // The terminal state is published while the slot lock is held, so a
      // blocked waiter that checks the state under this lock cannot miss the
      // transition between its check and its wait.
      self.state.store(terminal, Ordering::Release);
    }
    self.resolved.notify_all();
    // Wake outside the lock: a waker may poll inline, which re-enters
    // poll_resolved and takes the wakers lock again.
    let wakers = std::mem::take(&mut *self.wakers.lock());
    for waker in wakers {
      waker.wake();
    }
    let pending = std::mem::take(&mut *self.callbacks.lock());
    for callback in pending {
      callback(self.cloned_outcome());
    }
  }

  fn cloned_outcome(&self) -> Result<T, TaskError> {
    self
      .outcome
      .lock()
      .as_ref()
      .expect("terminal future with an empty outcome slot")
      .clone()
  }

  /// Attaches a continuation. If the future is already terminal the callback
  /// runs immediately on the calling thread; otherwise it runs on the thread
  /// that resolves the future.
  pub(crate) fn subscribe(&self, callback: Callback<T>) {
    {
      let mut callbacks = self.callbacks.lock();
      // Checked under the callbacks lock: the resolver publishes the terminal
      // state before draining, so a pending state seen here guarantees the
      // pushed callback will be drained.
      if !self.is_resolved() {
        callbacks.push(callback);
        return;
      }
    }
    callback(self.cloned_outcome());
  }

  /// Non-blocking snapshot of the outcome, if terminal.
  pub(crate) fn try_outcome(&self) -> Option<Result<T, TaskError>> {
    if self.is_resolved() {
      Some(self.cloned_outcome())
    } else {
      None
    }
  }

  /// Blocks the calling thread until the future is terminal.
  pub(crate) fn wait(&self) -> Result<T, TaskError> {
    if let Some(outcome) = self.try_outcome() {
      return outcome;
    }
    let mut slot = self.outcome.lock();
    while !self.is_resolved() {
      self.resolved.wait(&mut slot);
    }
    slot
      .as_ref()
      .expect("terminal future with an empty outcome slot")
      .clone()
  }

  /// Poll-based wait used by the async surface.
  pub(crate) fn poll_resolved(&self, cx: &mut Context<'_>) -> Poll<Result<T, TaskError>> {
    if let Some(outcome) = self.try_outcome() {
      return Poll::Ready(outcome);
    }
    {
      let mut wakers = self.wakers.lock();
      // Re-checked under the wakers lock: the resolver drains wakers after
      // publishing the terminal state, so a waker pushed here is woken.
      if !self.is_resolved() {
        if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
          wakers.push(cx.waker().clone());
        }
        return Poll::Pending;
      }
    }
    Poll::Ready(self.cloned_outcome())
  }
}
