// src/error.rs

//! Error types for task outcomes and redundant completion attempts.

use core::fmt;
use std::any::Any;

/// Terminal failure carried by a task future.
///
/// The taxonomy is deliberately small: either the task body failed
/// (`Computation`), or a deadline-based combinator force-failed the future
/// before it reached a terminal state (`Timeout`). The same error value is
/// propagated unchanged through `map`/`and_then`/`combine` chains until a
/// `recover` intercepts it; it is never re-wrapped along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
  /// The task body returned an error or panicked. Carries a human-readable
  /// description of what went wrong.
  Computation(String),
  /// A deadline elapsed before the future reached a terminal state. This
  /// variant is only ever synthesized by the timeout combinators, never by a
  /// task body.
  Timeout,
}

impl TaskError {
  /// Builds a `Computation` error from any displayable message.
  pub fn computation(message: impl Into<String>) -> Self {
    TaskError::Computation(message.into())
  }

  /// Converts a caught panic payload into a `Computation` error, preserving
  /// the panic message when it is a string.
  pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "task panicked".to_string()
    };
    TaskError::Computation(message)
  }

  /// Error used for work handed to a pool that is no longer accepting
  /// submissions.
  pub(crate) fn pool_shut_down() -> Self {
    TaskError::Computation("worker pool is shut down".to_string())
  }
}

impl fmt::Display for TaskError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskError::Computation(message) => write!(f, "task failed: {}", message),
      TaskError::Timeout => write!(f, "deadline elapsed before the future resolved"),
    }
  }
}

impl std::error::Error for TaskError {}

/// Non-fatal report returned by a redundant completion attempt.
///
/// A future transitions from pending to a terminal state exactly once. Any
/// later `complete`/`fail` call (including a timeout force-completion losing
/// the race against natural completion) has no side effect and hands the
/// rejected value back to the caller inside this error.
#[derive(PartialEq, Eq, Clone)]
pub struct CompleteError<V>(pub(crate) V);

impl<V> CompleteError<V> {
  /// Consumes the error, returning the value that was not applied.
  #[inline]
  pub fn into_inner(self) -> V {
    self.0
  }
}

impl<V> fmt::Debug for CompleteError<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "CompleteError(..)")
  }
}

impl<V> fmt::Display for CompleteError<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("future already resolved")
  }
}

impl<V: fmt::Debug> std::error::Error for CompleteError<V> {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn panic_payload_messages_are_preserved() {
    let from_str = TaskError::from_panic(Box::new("boom"));
    assert_eq!(from_str, TaskError::Computation("boom".to_string()));

    let from_string = TaskError::from_panic(Box::new("kaboom".to_string()));
    assert_eq!(from_string, TaskError::Computation("kaboom".to_string()));

    let opaque = TaskError::from_panic(Box::new(17_u32));
    assert_eq!(opaque, TaskError::Computation("task panicked".to_string()));
  }

  #[test]
  fn complete_error_returns_the_rejected_value() {
    let err = CompleteError(41);
    assert_eq!(err.into_inner(), 41);
  }

  #[test]
  fn display_formats() {
    assert_eq!(TaskError::computation("x").to_string(), "task failed: x");
    assert_eq!(
      TaskError::Timeout.to_string(),
      "deadline elapsed before the future resolved"
    );
    assert_eq!(CompleteError(()).to_string(), "future already resolved");
  }
}
