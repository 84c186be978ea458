// demos/main.rs

//! Table-driven demonstrations of the weft primitives.
//!
//! Each demo is an independent, named function; run one with
//! `cargo run --example demos -- <name>`, or `-- all` for the whole table.
//! Log lines carry the executing thread's name to make the hand-offs between
//! the caller and the pool workers visible; tune verbosity with `RUST_LOG`.

use weft::counter::{AtomicCounter, PlainCounter};
use weft::{pair, TaskError, Timer, WorkerPool};

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const POOL_WORKERS: usize = 100;
const DRAIN_GRACE: Duration = Duration::from_secs(30);

type DemoFn = fn();

const DEMOS: &[(&str, &str, DemoFn)] = &[
  (
    "sequential",
    "the same computation run inline, occupying the calling thread",
    demo_sequential,
  ),
  (
    "background",
    "fire-and-forget submission next to a blocking wait",
    demo_background,
  ),
  ("chain", "a map / map_unit / run_after pipeline", demo_chain),
  (
    "manual",
    "a pipeline built ahead of time and driven by a Completer",
    demo_manual,
  ),
  ("errors", "failure propagation and recovery", demo_errors),
  (
    "timeout",
    "fallback completion and forced failure on a deadline",
    demo_timeout,
  ),
  ("combine", "fan-out with combine and and_then", demo_combine),
  (
    "async-variants",
    "continuations redispatched through the pool",
    demo_async_variants,
  ),
  (
    "counter-plain",
    "lost updates with the non-atomic counter",
    demo_counter_plain,
  ),
  (
    "counter-atomic",
    "exact totals with the atomic counter",
    demo_counter_atomic,
  ),
];

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_thread_names(true)
    .init();

  let selection: Vec<String> = std::env::args().skip(1).collect();
  match selection.first().map(String::as_str) {
    None | Some("list") => {
      eprintln!("usage: cargo run --example demos -- <name>|all|list\n");
      for (name, blurb, _) in DEMOS {
        eprintln!("  {:<16} {}", name, blurb);
      }
    }
    Some("all") => {
      for (name, _, demo) in DEMOS {
        info!(demo = name, "----- running -----");
        demo();
      }
    }
    Some(name) => match DEMOS.iter().find(|(n, _, _)| n == &name) {
      Some((_, _, demo)) => demo(),
      None => {
        eprintln!("unknown demo '{}'; try 'list'", name);
        std::process::exit(2);
      }
    },
  }
}

fn current_thread() -> String {
  thread::current().name().unwrap_or("<unnamed>").to_string()
}

/// Simulates a slow network call: logs, sleeps, multiplies by ten.
fn long_network_call(value: i32) -> i32 {
  info!(thread = %current_thread(), value, "long network call started");
  thread::sleep(Duration::from_millis(300));
  info!(thread = %current_thread(), "long network call finished");
  value * 10
}

fn demo_sequential() {
  info!(thread = %current_thread(), "process started");
  let solution = long_network_call(5);
  info!(thread = %current_thread(), solution, "process finished");
}

fn demo_background() {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();
  info!(thread = %current_thread(), "process started");

  // Runs on a worker; the caller is free immediately and never looks back.
  let _ = pool.submit(|| Ok(long_network_call(5)));

  // A second submission, this time with the outcome retrieved by blocking.
  let supplied = pool.submit(|| Ok(long_network_call(5)));
  info!(output = ?supplied.wait(), "output retrieved with wait");

  pool.shutdown(DRAIN_GRACE);
}

fn demo_chain() {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();

  let done = pool
    .submit(|| Ok(long_network_call(7)))
    .map(|x| x * 2)
    .map_unit(|result| info!(result, "output after the doubling stage"))
    .run_after(|| info!(thread = %current_thread(), "post-pipeline hook ran"));

  let _ = done.wait();
  pool.shutdown(DRAIN_GRACE);
}

fn demo_manual() {
  let (completer, future) = pair::<i32>();

  // The pipeline exists before the value does.
  let staged = future.map(|x| x * 5).map(|x| x + 20);
  let _ = staged.map_unit(|x| info!(x, "manual pipeline produced"));

  let first = completer.complete(7);
  info!(completed = first.is_ok(), "first completion attempt");

  let second = completer.complete(9);
  if let Err(rejected) = second {
    warn!(
      rejected = rejected.into_inner(),
      "second completion attempt was a no-op"
    );
  }
}

fn demo_errors() {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();

  // Unobserved failure: logs nothing, crashes nothing.
  let _ = pool
    .submit::<i32, _>(|| Err(TaskError::computation("nobody sees this")))
    .map_unit(|x| info!(x, "this is never printed"));

  // Observed through wait.
  let outcome = pool
    .submit::<i32, _>(|| Err(TaskError::computation("backend down")))
    .wait();
  info!(?outcome, "failure surfaced by wait");

  // Recovered with a default value.
  let recovered = pool
    .submit::<i32, _>(|| Err(TaskError::computation("backend down")))
    .recover(|error| {
      warn!(%error, "recovering with a default");
      Ok(100)
    })
    .map(|x| x + 1)
    .wait();
  info!(?recovered, "failure replaced by recover");

  // A second failure mid-chain skips the rest until the next recover.
  let twice = pool
    .submit::<i32, _>(|| Err(TaskError::computation("first")))
    .recover(|_| Ok(100))
    .map(|_| -> i32 { panic!("second") })
    .map(|x| x + 10)
    .recover(|_| Ok(10))
    .wait();
  info!(?twice, "two failures, two recoveries");

  pool.shutdown(DRAIN_GRACE);
}

fn demo_timeout() {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();
  let timer = Timer::new().unwrap();

  let fallback = pool
    .submit(|| Ok(long_network_call(5)))
    .complete_on_timeout(99, Duration::from_millis(100), &timer)
    .wait();
  info!(?fallback, "slow task replaced by the fallback value");

  let failed = pool
    .submit(|| Ok(long_network_call(5)))
    .fail_on_timeout(Duration::from_millis(100), &timer)
    .wait();
  info!(?failed, "slow task force-failed on the deadline");

  let in_time = pool
    .submit(|| Ok(5))
    .complete_on_timeout(99, Duration::from_secs(5), &timer)
    .wait();
  info!(?in_time, "fast task kept its own value");

  pool.shutdown(DRAIN_GRACE);
}

fn demo_combine() {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();
  let user_id = 5;

  let tens = pool.submit(move || Ok(user_id * 10));
  let twenties = pool.submit(move || Ok(user_id * 20));
  let sum = tens.combine(&twenties, |a, b| a + b).wait();
  info!(?sum, "combined two independent lookups");

  let inner_pool = WorkerPool::new(4).unwrap();
  let chained = pool
    .submit(move || Ok(user_id * 10))
    .and_then(move |x| inner_pool.submit(move || Ok(x * 20)))
    .wait();
  info!(?chained, "composed one lookup into the next");

  pool.shutdown(DRAIN_GRACE);
}

fn demo_async_variants() {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();

  let initial = pool.submit(|| Ok(long_network_call(1)));

  // Both continuations hang off the same upstream and are redispatched, so
  // neither blocks the worker that produced the initial value.
  let by_ten = initial.map_async(&pool, |x| {
    info!(thread = %current_thread(), "times-ten continuation");
    x * 10
  });
  let by_two = initial.map_async(&pool, |x| {
    info!(thread = %current_thread(), "times-two continuation");
    x * 2
  });

  let summed = by_ten
    .combine_async(&pool, &by_two, |a, b| {
      info!(thread = %current_thread(), "merge continuation");
      a + b
    })
    .wait();
  info!(?summed, "sum of both continuations");

  pool.shutdown(DRAIN_GRACE);
}

fn run_counter_demo(name: &str, increment: impl Fn() -> u64 + Send + Sync + 'static, total: u64) {
  let pool = WorkerPool::new(POOL_WORKERS).unwrap();
  let increment = Arc::new(increment);

  for _ in 0..total {
    let increment = Arc::clone(&increment);
    let _ = pool.submit(move || Ok(increment()));
  }

  let drained = pool.shutdown(DRAIN_GRACE);
  info!(counter = name, drained, "all incrementing tasks drained");
}

fn demo_counter_plain() {
  let total = 10_000_u64;
  let counter = Arc::new(PlainCounter::new());
  let observed = Arc::clone(&counter);
  run_counter_demo(
    "plain",
    move || {
      observed.increment();
      observed.get()
    },
    total,
  );
  info!(
    expected = total,
    finalized = counter.get(),
    "plain counter total (updates may be lost)"
  );
}

fn demo_counter_atomic() {
  let total = 10_000_u64;
  let counter = Arc::new(AtomicCounter::new());
  let observed = Arc::clone(&counter);
  run_counter_demo("atomic", move || observed.increment(), total);
  info!(
    expected = total,
    finalized = counter.get(),
    "atomic counter total (always exact)"
  );
}
