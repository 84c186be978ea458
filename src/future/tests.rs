use super::*;
use crate::error::TaskError;
use crate::pool::WorkerPool;
use crate::timer::Timer;

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn map_over_completed_applies_fn() {
  let doubled = TaskFuture::completed(5).map(|x| x * 2);
  assert_eq!(doubled.wait(), Ok(10));
}

#[test]
fn map_over_failed_skips_fn_and_keeps_the_error() {
  let invoked = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&invoked);

  let error = TaskError::computation("upstream broke");
  let mapped = TaskFuture::<i32>::failed(error.clone()).map(move |x| {
    flag.store(true, AtomicOrdering::SeqCst);
    x * 2
  });

  assert_eq!(mapped.wait(), Err(error));
  assert!(!invoked.load(AtomicOrdering::SeqCst));
}

#[test]
fn failure_propagates_unchanged_through_a_chain() {
  let error = TaskError::computation("first failure");
  let out = TaskFuture::<i32>::failed(error.clone())
    .map(|x| x + 1)
    .map_unit(|_| {})
    .run_after(|| {});
  assert_eq!(out.wait(), Err(error));
}

#[test]
fn recover_converts_a_failure() {
  let recovered = TaskFuture::<i32>::failed(TaskError::computation("boom")).recover(|_| Ok(100));
  assert_eq!(recovered.wait(), Ok(100));
}

#[test]
fn recover_passes_success_through_without_invoking_handler() {
  let invoked = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&invoked);

  let out = TaskFuture::completed(7).recover(move |_| {
    flag.store(true, AtomicOrdering::SeqCst);
    Ok(0)
  });

  assert_eq!(out.wait(), Ok(7));
  assert!(!invoked.load(AtomicOrdering::SeqCst));
}

#[test]
fn failure_inside_recover_propagates_as_a_new_failure() {
  let out = TaskFuture::<i32>::failed(TaskError::computation("original"))
    .recover(|_| Err(TaskError::computation("handler also broke")));
  assert_eq!(out.wait(), Err(TaskError::computation("handler also broke")));

  let panicked = TaskFuture::<i32>::failed(TaskError::Timeout)
    .recover(|_| panic!("handler panicked"));
  assert_eq!(
    panicked.wait(),
    Err(TaskError::computation("handler panicked"))
  );
}

#[test]
fn combine_sums_two_completed_futures() {
  let a = TaskFuture::completed(5);
  let b = TaskFuture::completed(7);
  assert_eq!(a.combine(&b, |x, y| x + y).wait(), Ok(12));
}

#[test]
fn combine_fails_when_either_input_failed() {
  let invoked = Arc::new(AtomicBool::new(false));

  let error = TaskError::computation("left broke");
  let left_failed = TaskFuture::<i32>::failed(error.clone());
  let right_ok = TaskFuture::completed(7);
  let flag = Arc::clone(&invoked);
  let out = left_failed.combine(&right_ok, move |x, y| {
    flag.store(true, AtomicOrdering::SeqCst);
    x + y
  });
  assert_eq!(out.wait(), Err(error));

  let error = TaskError::computation("right broke");
  let left_ok = TaskFuture::completed(5);
  let right_failed = TaskFuture::<i32>::failed(error.clone());
  let flag = Arc::clone(&invoked);
  let out = left_ok.combine(&right_failed, move |x, y| {
    flag.store(true, AtomicOrdering::SeqCst);
    x + y
  });
  assert_eq!(out.wait(), Err(error));

  assert!(!invoked.load(AtomicOrdering::SeqCst));
}

#[test]
fn combine_stays_pending_until_both_inputs_are_terminal() {
  let (completer, pending) = pair::<i32>();
  let failed = TaskFuture::<i32>::failed(TaskError::computation("left broke"));

  let out = failed.combine(&pending, |x, y| x + y);
  // One failed input is not enough; the other side has not resolved yet.
  assert!(out.try_get().is_none());

  completer.complete(7).unwrap();
  assert_eq!(out.wait(), Err(TaskError::computation("left broke")));
}

#[test]
fn combine_reports_the_first_observed_failure() {
  let (completer, slow) = pair::<i32>();
  let out =
    TaskFuture::<i32>::failed(TaskError::computation("first")).combine(&slow, |x, y| x + y);

  assert!(out.try_get().is_none());
  completer.fail(TaskError::computation("second")).unwrap();
  assert_eq!(out.wait(), Err(TaskError::computation("first")));
}

#[test]
fn combine_waits_for_the_slower_input() {
  let (completer, slow) = pair::<i32>();
  let fast = TaskFuture::completed(2);
  let out = fast.combine(&slow, |x, y| x * y);

  assert!(out.try_get().is_none());
  completer.complete(21).unwrap();
  assert_eq!(out.wait(), Ok(42));
}

#[test]
fn and_then_flattens_a_submitted_future() {
  let pool = WorkerPool::new(2).unwrap();
  let pool_for_inner = WorkerPool::new(2).unwrap();

  let out = pool
    .submit(|| Ok(5))
    .and_then(move |x| pool_for_inner.submit(move || Ok(x * 10)));
  assert_eq!(out.wait(), Ok(50));
}

#[test]
fn and_then_propagates_failures_from_either_stage() {
  let outer = TaskFuture::<i32>::failed(TaskError::computation("outer"))
    .and_then(|x| TaskFuture::completed(x * 10));
  assert_eq!(outer.wait(), Err(TaskError::computation("outer")));

  let inner = TaskFuture::completed(5)
    .and_then(|_| TaskFuture::<i32>::failed(TaskError::computation("inner")));
  assert_eq!(inner.wait(), Err(TaskError::computation("inner")));

  let panicked = TaskFuture::completed(5).and_then(|_: i32| -> TaskFuture<i32> {
    panic!("no future for you")
  });
  assert_eq!(
    panicked.wait(),
    Err(TaskError::computation("no future for you"))
  );
}

#[test]
fn complete_on_timeout_supplies_the_fallback() {
  let timer = Timer::new().unwrap();
  let (_completer, never) = pair::<i32>();

  let start = Instant::now();
  let out = never.complete_on_timeout(99, Duration::from_millis(250), &timer);
  assert_eq!(out.wait(), Ok(99));

  let elapsed = start.elapsed();
  assert!(elapsed >= Duration::from_millis(250), "fired early: {:?}", elapsed);
  assert!(elapsed < Duration::from_millis(750), "fired late: {:?}", elapsed);
}

#[test]
fn natural_completion_beats_the_timeout_fallback() {
  let timer = Timer::new().unwrap();
  let (completer, future) = pair::<i32>();

  let out = future.complete_on_timeout(99, Duration::from_millis(50), &timer);
  completer.complete(1).unwrap();

  assert_eq!(out.wait(), Ok(1));
  // The fallback deadline passing later must not disturb the outcome.
  thread::sleep(Duration::from_millis(120));
  assert_eq!(out.wait(), Ok(1));
}

#[test]
fn fail_on_timeout_synthesizes_a_timeout_error() {
  let timer = Timer::new().unwrap();
  let (_completer, never) = pair::<i32>();

  let out = never.fail_on_timeout(Duration::from_millis(100), &timer);
  assert_eq!(out.wait(), Err(TaskError::Timeout));
}

#[test]
fn fail_on_timeout_is_ignored_once_resolved() {
  let timer = Timer::new().unwrap();
  let (completer, future) = pair::<i32>();

  let out = future.fail_on_timeout(Duration::from_millis(50), &timer);
  completer.complete(5).unwrap();
  thread::sleep(Duration::from_millis(120));
  assert_eq!(out.wait(), Ok(5));
}

#[test]
fn second_completion_attempt_is_a_reported_no_op() {
  let (completer, future) = pair::<i32>();

  assert!(completer.complete(1).is_ok());
  let rejected = completer.complete(2).unwrap_err();
  assert_eq!(rejected.into_inner(), 2);
  assert_eq!(future.wait(), Ok(1));

  let rejected = completer.fail(TaskError::Timeout).unwrap_err();
  assert_eq!(rejected.into_inner(), TaskError::Timeout);
  assert_eq!(future.wait(), Ok(1));
}

#[test]
fn completer_can_fail_the_future() {
  let (completer, future) = pair::<i32>();
  completer.fail(TaskError::computation("manual failure")).unwrap();
  assert!(completer.is_resolved());
  assert_eq!(future.wait(), Err(TaskError::computation("manual failure")));
}

#[test]
fn run_after_runs_only_on_success() {
  let ran = Arc::new(AtomicBool::new(false));

  let flag = Arc::clone(&ran);
  let out = TaskFuture::completed(5).run_after(move || {
    flag.store(true, AtomicOrdering::SeqCst);
  });
  assert_eq!(out.wait(), Ok(()));
  assert!(ran.load(AtomicOrdering::SeqCst));

  ran.store(false, AtomicOrdering::SeqCst);
  let flag = Arc::clone(&ran);
  let out = TaskFuture::<i32>::failed(TaskError::Timeout).run_after(move || {
    flag.store(true, AtomicOrdering::SeqCst);
  });
  assert_eq!(out.wait(), Err(TaskError::Timeout));
  assert!(!ran.load(AtomicOrdering::SeqCst));
}

#[test]
fn wait_blocks_until_another_thread_completes() {
  let (completer, future) = pair::<String>();

  let producer = thread::spawn(move || {
    thread::sleep(Duration::from_millis(50));
    completer.complete("hello weft".to_string()).unwrap();
  });

  let start = Instant::now();
  assert_eq!(future.wait(), Ok("hello weft".to_string()));
  assert!(start.elapsed() >= Duration::from_millis(40));
  producer.join().unwrap();
}

#[test]
fn try_get_never_blocks() {
  let (completer, future) = pair::<i32>();
  assert!(future.try_get().is_none());
  assert!(!future.is_resolved());

  completer.complete(3).unwrap();
  assert_eq!(future.try_get(), Some(Ok(3)));
  assert!(future.is_resolved());
}

#[test]
fn clones_observe_the_same_resolution() {
  let (completer, future) = pair::<i32>();
  let twin = future.clone();
  let mapped_before = future.map(|x| x + 1);

  completer.complete(10).unwrap();

  let mapped_after = twin.map(|x| x + 2);
  assert_eq!(future.wait(), Ok(10));
  assert_eq!(twin.wait(), Ok(10));
  assert_eq!(mapped_before.wait(), Ok(11));
  assert_eq!(mapped_after.wait(), Ok(12));
}

#[test]
fn an_unobserved_failure_is_dropped_quietly() {
  let pool = WorkerPool::new(1).unwrap();
  // Never waited on, never recovered: must not take anything down.
  let _ = pool.submit::<i32, _>(|| panic!("nobody is watching"));
  assert!(pool.shutdown(Duration::from_secs(1)));
}

#[test]
fn a_waker_that_polls_inline_does_not_deadlock() {
  use parking_lot::Mutex;
  use std::task::{Wake, Waker};

  struct NoopWaker;

  impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
  }

  // Some executors poll again from inside wake(); the commit path must not
  // hold the wakers lock while waking.
  struct InlinePollWaker {
    shared: Arc<FutureShared<i32>>,
    observed: Mutex<Option<Result<i32, TaskError>>>,
  }

  impl Wake for InlinePollWaker {
    fn wake(self: Arc<Self>) {
      let noop = Waker::from(Arc::new(NoopWaker));
      let mut cx = Context::from_waker(&noop);
      if let Poll::Ready(outcome) = self.shared.poll_resolved(&mut cx) {
        *self.observed.lock() = Some(outcome);
      }
    }
  }

  let (completer, future) = pair::<i32>();
  let inline = Arc::new(InlinePollWaker {
    shared: Arc::clone(&future.shared),
    observed: Mutex::new(None),
  });
  let waker = Waker::from(Arc::clone(&inline));
  let mut cx = Context::from_waker(&waker);
  assert!(future.shared.poll_resolved(&mut cx).is_pending());

  completer.complete(9).unwrap();
  assert_eq!(*inline.observed.lock(), Some(Ok(9)));
}

#[tokio::test]
async fn resolved_is_ready_once_terminal() {
  let (completer, future) = pair::<i32>();

  let waiter = {
    let future = future.clone();
    tokio::spawn(async move { future.resolved().await })
  };

  tokio::time::sleep(Duration::from_millis(30)).await;
  completer.complete(8).unwrap();

  assert_eq!(waiter.await.unwrap(), Ok(8));
  assert_eq!(future.resolved().await, Ok(8));
}

#[tokio::test]
async fn resolved_observes_failures() {
  let future = TaskFuture::<i32>::failed(TaskError::computation("async sadness"));
  assert_eq!(
    future.resolved().await,
    Err(TaskError::computation("async sadness"))
  );
}
