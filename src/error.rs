//! Error type carried by every flow's terminal `error` signal.
//!
//! User callbacks (boundary predicates, signal handlers) report recoverable
//! failures by returning `Err(FlowError)`. Those failures travel downstream as
//! exactly one terminal `error`. Panics are the unrecoverable class: no
//! operator in this crate catches them, so they unwind to whoever delivered
//! the signal that triggered the callback.
//!
//! ```
//! use rxflow::error::FlowError;
//!
//! let err = FlowError::msg("sensor offline");
//! assert_eq!(err.to_string(), "sensor offline");
//! ```

use std::{error::Error as StdError, sync::Arc};

use crate::maybe::SignalKind;

/// Convenience alias used by predicates and handlers.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Root error type of the crate.
///
/// `FlowError` is `Clone` so that one upstream failure can be delivered both
/// to the open window and to the outer consumer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
  /// A plain message, usually produced by user code via [`FlowError::msg`].
  #[error("{0}")]
  Message(String),

  /// An arbitrary error raised by user code.
  #[error("user error: {0}")]
  User(#[source] Arc<dyn StdError + Send + Sync>),

  /// A signal handler returned `Ok(None)` instead of a continuation flow.
  #[error("the {signal} handler returned no continuation flow")]
  MissingContinuation {
    /// Which handler misbehaved.
    signal: SignalKind,
  },

  /// A single-consumer producer was subscribed more than once.
  #[error("this flow admits a single subscriber")]
  AlreadySubscribed,
}

impl FlowError {
  /// Create a message error.
  pub fn msg(message: impl Into<String>) -> Self { Self::Message(message.into()) }

  /// Wrap any error raised by user code.
  pub fn user(error: impl StdError + Send + Sync + 'static) -> Self { Self::User(Arc::new(error)) }

  /// Returns `true` for errors that signal misuse of the subscription
  /// protocol rather than a failure of the data itself.
  pub fn is_protocol_violation(&self) -> bool {
    matches!(self, Self::MissingContinuation { .. } | Self::AlreadySubscribed)
  }
}
