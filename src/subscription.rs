use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

/// The control handle a producer hands to its consumer in `on_subscribe`.
///
/// Both methods take `&self`: the handle is shared between the consumer and
/// the producer's internals, and may be invoked from any thread.
pub trait Subscription: Send + Sync {
  /// Signals that the consumer accepts `n` more elements. `request(0)` is a
  /// no-op; demand saturates at [`UNBOUNDED`](crate::demand::UNBOUNDED).
  fn request(&self, n: u64);

  /// Stops the producer. Idempotent; after it returns no further signal is
  /// started for this consumer.
  fn cancel(&self);
}

/// Shared, type-erased subscription handle.
pub type SubscriptionRef = Arc<dyn Subscription>;

/// A subscription that ignores every request.
///
/// Handed out together with an immediate terminal signal when a producer
/// refuses a consumer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl EmptySubscription {
  pub fn shared() -> SubscriptionRef { Arc::new(EmptySubscription) }
}

impl Subscription for EmptySubscription {
  #[inline]
  fn request(&self, _n: u64) {}

  #[inline]
  fn cancel(&self) {}
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be cancelled.
#[must_use]
pub struct SubscriptionGuard(SubscriptionRef);

impl SubscriptionGuard {
  /// Wraps an existing subscription with a guard to enable RAII behavior for
  /// it.
  pub fn new(subscription: SubscriptionRef) -> Self { SubscriptionGuard(subscription) }

  pub fn subscription(&self) -> &SubscriptionRef { &self.0 }
}

impl Debug for SubscriptionGuard {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SubscriptionGuard").finish_non_exhaustive()
  }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}
