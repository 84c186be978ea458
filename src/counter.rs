// src/counter.rs

//! Correct and incorrect shared counters under concurrent increment.
//!
//! [`AtomicCounter`] performs an indivisible read-modify-write: N concurrent
//! increments always end at exactly N, with no external locking.
//! [`PlainCounter`] deliberately splits the increment into a separate load
//! and store; concurrent increments can interleave between the two steps and
//! overwrite each other, so the final value may fall short of N. The lost
//! updates are the point of the type: it exists to exhibit the broken
//! pattern next to the correct one. (The split steps use relaxed atomic
//! accesses so the lost-update behavior is observable without the program
//! being undefined.)
//!
//! # Examples
//!
//! ```
//! use weft::counter::AtomicCounter;
//!
//! let counter = AtomicCounter::new();
//! assert_eq!(counter.increment(), 1);
//! assert_eq!(counter.increment(), 2);
//! assert_eq!(counter.get(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free counter whose increments are indivisible.
#[derive(Debug, Default)]
pub struct AtomicCounter {
  value: AtomicU64,
}

impl AtomicCounter {
  /// Creates a counter starting at 0.
  pub fn new() -> Self {
    Self::default()
  }

  /// Atomically adds 1 and returns the new value.
  #[inline]
  pub fn increment(&self) -> u64 {
    self.value.fetch_add(1, Ordering::Relaxed) + 1
  }

  /// Current value. Read it after all incrementing workers have been joined
  /// if an exact total is expected.
  #[inline]
  pub fn get(&self) -> u64 {
    self.value.load(Ordering::Relaxed)
  }
}

/// A counter that increments with a separate load and store, losing updates
/// under concurrent use. See the module docs; prefer [`AtomicCounter`] for
/// anything but demonstrating the race.
#[derive(Debug, Default)]
pub struct PlainCounter {
  value: AtomicU64,
}

impl PlainCounter {
  /// Creates a counter starting at 0.
  pub fn new() -> Self {
    Self::default()
  }

  /// Read-compute-write in three distinct steps. A concurrent increment that
  /// lands between the load and the store is overwritten.
  #[inline]
  pub fn increment(&self) {
    let current = self.value.load(Ordering::Relaxed);
    self.value.store(current + 1, Ordering::Relaxed);
  }

  /// Current value. No relation to the number of `increment` calls is
  /// guaranteed beyond being at most that number.
  #[inline]
  pub fn get(&self) -> u64 {
    self.value.load(Ordering::Relaxed)
  }
}
