// src/pool/mod.rs

//! A fixed-size pool of named OS worker threads.
//!
//! Submitted tasks run in parallel on the workers; [`WorkerPool::submit`]
//! never blocks the caller and returns a pending
//! [`TaskFuture`](crate::TaskFuture) immediately. The pool owns no ambient
//! lifecycle: callers shut it down explicitly via [`WorkerPool::shutdown`],
//! which stops intake, waits up to a bounded grace period for queued and
//! in-flight work to drain, and reports whether everything finished in time.
//! Dropping an un-shut-down pool closes intake and joins the workers without
//! a deadline.
//!
//! Relative ordering of independent submissions is not guaranteed; each
//! returned future still transitions pending -> terminal exactly once.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use weft::WorkerPool;
//!
//! let pool = WorkerPool::new(4).unwrap();
//! let future = pool.submit(|| Ok(5 * 10));
//! assert_eq!(future.wait(), Ok(50));
//! assert!(pool.shutdown(Duration::from_secs(1)));
//! ```


use crate::error::TaskError;
use crate::future::{catch_flat, TaskFuture};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
  Job(Job),
  Terminate,
}

struct PoolInner {
  // Queued plus in-flight jobs. SeqCst keeps the count and the shutdown flag
  // in a single total order so the drain wait cannot miss a racing submit.
  pending: AtomicUsize,
  shutdown: AtomicBool,
  idle_lock: Mutex<()>,
  idle: Condvar,
}

impl PoolInner {
  fn job_finished(&self) {
    if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
      let _guard = self.idle_lock.lock();
      self.idle.notify_all();
    }
  }
}

/// Cheap, cloneable submission handle used by the redispatching combinators.
#[derive(Clone)]
pub(crate) struct PoolHandle {
  inner: Arc<PoolInner>,
  sender: Sender<Message>,
}

impl PoolHandle {
  /// Hands a job to the pool. Returns `false` if the pool has stopped
  /// accepting submissions.
  pub(crate) fn execute(&self, job: Job) -> bool {
    self.inner.pending.fetch_add(1, Ordering::SeqCst);
    if self.inner.shutdown.load(Ordering::SeqCst) {
      self.inner.job_finished();
      return false;
    }
    match self.sender.send(Message::Job(job)) {
      Ok(()) => true,
      Err(_) => {
        self.inner.job_finished();
        false
      }
    }
  }
}

/// A bounded set of worker threads executing submitted tasks concurrently.
pub struct WorkerPool {
  inner: Arc<PoolInner>,
  handle: PoolHandle,
  receiver: Receiver<Message>,
  workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkerPool")
      .field("workers", &self.workers.len())
      .field("pending", &self.inner.pending.load(Ordering::Relaxed))
      .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
      .finish()
  }
}

impl WorkerPool {
  /// Spawns a pool of `workers` named threads (`weft-worker-N`).
  ///
  /// `workers` must be at least 1.
  pub fn new(workers: usize) -> io::Result<Self> {
    assert!(workers > 0, "worker pool needs at least one worker");

    let inner = Arc::new(PoolInner {
      pending: AtomicUsize::new(0),
      shutdown: AtomicBool::new(false),
      idle_lock: Mutex::new(()),
      idle: Condvar::new(),
    });
    let (sender, receiver) = crossbeam_channel::unbounded();

    let mut handles = Vec::with_capacity(workers);
    for index in 0..workers {
      let worker_receiver = receiver.clone();
      let worker_inner = Arc::clone(&inner);
      let handle = thread::Builder::new()
        .name(format!("weft-worker-{}", index))
        .spawn(move || worker_loop(worker_receiver, worker_inner))?;
      handles.push(handle);
    }

    let handle = PoolHandle {
      inner: Arc::clone(&inner),
      sender,
    };
    Ok(WorkerPool {
      inner,
      handle,
      receiver,
      workers: handles,
    })
  }

  /// Number of worker threads.
  pub fn size(&self) -> usize {
    self.workers.len()
  }

  pub(crate) fn handle(&self) -> PoolHandle {
    self.handle.clone()
  }

  /// Schedules `task` on the pool and immediately returns a pending future
  /// for its outcome.
  ///
  /// The task's `Err` return and any panic both resolve the future as
  /// `Failed`; an unobserved failure is simply dropped and never crashes the
  /// process. Submitting to a shut-down pool yields an already-failed
  /// future.
  pub fn submit<T, F>(&self, task: F) -> TaskFuture<T>
  where
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<T, TaskError> + Send + 'static,
  {
    let (future, shared) = TaskFuture::pending();
    let dispatched = Arc::clone(&shared);
    let accepted = self.handle.execute(Box::new(move || {
      dispatched.resolve(catch_flat(task));
    }));
    if !accepted {
      shared.resolve(Err(TaskError::pool_shut_down()));
    }
    future
  }

  /// Gracefully shuts the pool down.
  ///
  /// Stops accepting new submissions, waits up to `grace` for queued and
  /// in-flight jobs to finish, then stops the workers. Returns `true` if all
  /// work drained before the deadline. When the deadline expires first, the
  /// remaining jobs still run to completion on the (now detached) workers
  /// before those exit; only intake is cut off.
  pub fn shutdown(mut self, grace: Duration) -> bool {
    self.inner.shutdown.store(true, Ordering::SeqCst);
    let drained = self.wait_for_drain(Some(Instant::now() + grace));
    self.stop_workers(drained);
    tracing::debug!(drained, "worker pool shut down");
    drained
  }

  fn wait_for_drain(&self, deadline: Option<Instant>) -> bool {
    let mut guard = self.inner.idle_lock.lock();
    while self.inner.pending.load(Ordering::SeqCst) > 0 {
      match deadline {
        Some(deadline) => {
          if self.inner.idle.wait_until(&mut guard, deadline).timed_out() {
            break;
          }
        }
        None => self.inner.idle.wait(&mut guard),
      }
    }
    self.inner.pending.load(Ordering::SeqCst) == 0
  }

  fn stop_workers(&mut self, join: bool) {
    for _ in 0..self.workers.len() {
      let _ = self.handle.sender.send(Message::Terminate);
    }
    if join {
      for handle in self.workers.drain(..) {
        let _ = handle.join();
      }
      // A submit racing the shutdown flag may have enqueued a job behind the
      // terminate markers; run any such stragglers here so their futures
      // still resolve.
      while let Ok(Message::Job(job)) = self.receiver.try_recv() {
        let _ = panic::catch_unwind(AssertUnwindSafe(job));
        self.inner.job_finished();
      }
    } else {
      self.workers.drain(..);
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    if self.inner.shutdown.swap(true, Ordering::SeqCst) {
      // Already stopped through shutdown().
      return;
    }
    self.wait_for_drain(None);
    self.stop_workers(true);
  }
}

fn worker_loop(receiver: Receiver<Message>, inner: Arc<PoolInner>) {
  tracing::trace!("worker starting");
  while let Ok(message) = receiver.recv() {
    match message {
      Message::Terminate => break,
      Message::Job(job) => {
        // Task bodies and continuations convert their own panics into a
        // Failed future; this catch keeps an escaped panic from killing the
        // worker.
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
          tracing::debug!("job panicked past its future");
        }
        inner.job_finished();
      }
    }
  }
  tracing::trace!("worker exiting");
}
