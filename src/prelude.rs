//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.
//! The `publisher` and `maybe` modules come along so that their factory
//! functions read as `publisher::from_iter(..)` and `maybe::just(..)`.

// Error type
pub use crate::error::FlowError;
// Optional-value sources
pub use crate::maybe::{
  MaybeObserver, MaybeSource, MaybeSourceExt, MaybeSubject, Signal, SignalKind,
};
// Operators
pub use crate::ops::{
  flat_map_signal::FlatMapSignal,
  into_stream::IntoStream,
  window_by::{WindowBoundary, WindowBy, WindowConfig},
};
// Core traits
pub use crate::publisher::{BoxedPublisher, Publisher, PublisherExt};
pub use crate::subscriber::{BoxedSubscriber, ConditionalSubscriber, Subscriber};
// Subscription
pub use crate::subscription::{EmptySubscription, Subscription, SubscriptionGuard, SubscriptionRef};
pub use crate::window_sink::Window;
// Factory modules
pub use crate::{maybe, publisher};
