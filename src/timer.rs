// src/timer.rs

//! A single-threaded deadline scheduler backing the timeout combinators.
//!
//! The [`Timer`] owns one background thread and a min-heap of `(deadline,
//! action)` entries. Due actions run on the timer thread; for this crate they
//! are force-completion attempts, which are cheap. The timer is an injected
//! dependency of [`TaskFuture::complete_on_timeout`](crate::TaskFuture::complete_on_timeout)
//! and [`TaskFuture::fail_on_timeout`](crate::TaskFuture::fail_on_timeout)
//! rather than an ambient singleton; dropping it discards unfired entries and
//! joins the thread.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Action = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
  deadline: Instant,
  // Insertion order breaks deadline ties so firing order is stable.
  seq: u64,
  action: Action,
}

impl PartialEq for Entry {
  fn eq(&self, other: &Self) -> bool {
    self.deadline == other.deadline && self.seq == other.seq
  }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
    Some(self.cmp(other))
  }
}

impl Ord for Entry {
  // Reversed so the BinaryHeap pops the earliest deadline first.
  fn cmp(&self, other: &Self) -> CmpOrdering {
    other
      .deadline
      .cmp(&self.deadline)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

struct TimerInner {
  queue: Mutex<BinaryHeap<Entry>>,
  tick: Condvar,
  shutdown: AtomicBool,
  next_seq: AtomicU64,
}

/// A deadline scheduler with one background thread. See the module docs.
pub struct Timer {
  inner: Arc<TimerInner>,
  thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Timer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Timer")
      .field("scheduled", &self.inner.queue.lock().len())
      .finish()
  }
}

impl Timer {
  /// Spawns the timer thread (`weft-timer`).
  pub fn new() -> io::Result<Self> {
    let inner = Arc::new(TimerInner {
      queue: Mutex::new(BinaryHeap::new()),
      tick: Condvar::new(),
      shutdown: AtomicBool::new(false),
      next_seq: AtomicU64::new(0),
    });
    let timer_inner = Arc::clone(&inner);
    let thread = thread::Builder::new()
      .name("weft-timer".to_string())
      .spawn(move || timer_loop(timer_inner))?;
    Ok(Timer {
      inner,
      thread: Some(thread),
    })
  }

  /// Schedules `action` to run once `delay` has elapsed.
  ///
  /// Entries scheduled on a timer that is shutting down are silently
  /// discarded.
  pub fn schedule(&self, delay: Duration, action: impl FnOnce() + Send + 'static) {
    if self.inner.shutdown.load(Ordering::Acquire) {
      tracing::trace!("timer entry discarded: timer is shutting down");
      return;
    }
    let entry = Entry {
      deadline: Instant::now() + delay,
      seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
      action: Box::new(action),
    };
    self.inner.queue.lock().push(entry);
    self.tick_notify();
  }

  fn tick_notify(&self) {
    let _guard = self.inner.queue.lock();
    self.inner.tick.notify_one();
  }
}

impl Drop for Timer {
  fn drop(&mut self) {
    self.inner.shutdown.store(true, Ordering::Release);
    self.tick_notify();
    if let Some(thread) = self.thread.take() {
      let _ = thread.join();
    }
  }
}

fn timer_loop(inner: Arc<TimerInner>) {
  let mut queue = inner.queue.lock();
  loop {
    if inner.shutdown.load(Ordering::Acquire) {
      // Unfired entries are dropped.
      queue.clear();
      return;
    }
    match queue.peek().map(|entry| entry.deadline) {
      None => {
        inner.tick.wait(&mut queue);
      }
      Some(deadline) => {
        if deadline <= Instant::now() {
          if let Some(Entry { action, .. }) = queue.pop() {
            // Run without the lock so scheduling from an action cannot
            // deadlock.
            drop(queue);
            action();
            queue = inner.queue.lock();
          }
        } else {
          inner.tick.wait_until(&mut queue, deadline);
        }
      }
    }
  }
}
