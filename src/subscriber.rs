//! Subscriber traits and their boxed forms
//!
//! A `Subscriber` is the consuming end of the protocol. It first receives a
//! [`Subscription`](crate::subscription::Subscription) through `on_subscribe`,
//! then zero or more `next` values (never more than it requested), then at
//! most one terminal signal.

use crate::{error::FlowError, subscription::SubscriptionRef};

// ============================================================================
// Subscriber Trait
// ============================================================================

/// The consumer of a flow.
pub trait Subscriber<Item> {
  /// Receives the control handle. Called exactly once, before anything else.
  fn on_subscribe(&mut self, subscription: SubscriptionRef);

  /// Receive the next value from the flow.
  fn next(&mut self, value: Item);

  /// Handle an error from the flow
  ///
  /// This consumes the subscriber, as no more values can be emitted after an
  /// error
  fn error(self, err: FlowError);

  /// Handle completion of the flow
  ///
  /// This consumes the subscriber, as no more values can be emitted after
  /// completion
  fn complete(self);
}

// ============================================================================
// ConditionalSubscriber Trait
// ============================================================================

/// A subscriber that can report whether an element used up demand.
///
/// Producers that understand this protocol deliver through `try_next` and
/// only count the elements for which it returned `true` against the
/// outstanding demand. Producers that don't simply call `next`.
pub trait ConditionalSubscriber<Item>: Subscriber<Item> {
  fn try_next(&mut self, value: Item) -> bool;
}

// ============================================================================
// DynSubscriber Trait - Object-safe Subscriber
// ============================================================================

/// Helper trait to enable object-safe subscribers (`Box<dyn Subscriber>`)
///
/// `Subscriber` is not object-safe because the terminal methods take `self`
/// by value. `DynSubscriber` mirrors the interface but adapts it for vtables.
pub trait DynSubscriber<Item> {
  fn box_on_subscribe(&mut self, subscription: SubscriptionRef);
  fn box_next(&mut self, value: Item);
  fn box_error(self: Box<Self>, err: FlowError);
  fn box_complete(self: Box<Self>);
}

impl<T, Item> DynSubscriber<Item> for T
where
  T: Subscriber<Item>,
{
  fn box_on_subscribe(&mut self, subscription: SubscriptionRef) { self.on_subscribe(subscription); }
  fn box_next(&mut self, value: Item) { self.next(value); }
  fn box_error(self: Box<Self>, err: FlowError) { self.error(err); }
  fn box_complete(self: Box<Self>) { self.complete(); }
}

/// Boxed subscriber that can move across threads.
pub type BoxedSubscriber<Item> = Box<dyn DynSubscriber<Item> + Send>;

impl<Item> Subscriber<Item> for BoxedSubscriber<Item> {
  #[inline]
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    (**self).box_on_subscribe(subscription)
  }

  #[inline]
  fn next(&mut self, value: Item) { (**self).box_next(value) }

  #[inline]
  fn error(self, err: FlowError) { self.box_error(err) }

  #[inline]
  fn complete(self) { self.box_complete() }
}

// ============================================================================
// Tests
// ============================================================================
