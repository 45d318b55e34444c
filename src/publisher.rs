//! The producing side of the protocol.
//!
//! A [`Publisher`] is consumed by `subscribe`, so attaching two consumers to
//! the same publisher value is not expressible. Handles that can be cloned
//! (like [`Window`](crate::window_sink::Window)) enforce the single-consumer
//! rule at runtime instead.
//!
//! Operators are available on every publisher through [`PublisherExt`].

mod from_iter;

pub use from_iter::*;

use crate::{
  error::Result,
  ops::{
    into_stream::{IntoStream, DEFAULT_PREFETCH},
    window_by::{WindowBoundary, WindowBy, WindowConfig},
  },
  subscriber::{BoxedSubscriber, ConditionalSubscriber, Subscriber},
};

/// A source of a potentially unbounded number of elements, emitted according
/// to the demand of its single subscriber.
pub trait Publisher<Item>: Sized {
  /// Attaches `subscriber`. The subscriber receives `on_subscribe` first.
  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item> + Send + 'static;

  /// Attaches a subscriber that can report whether an element used up
  /// demand.
  ///
  /// Publishers that know nothing about the conditional protocol fall back to
  /// plain delivery, in which case the subscriber compensates on its own.
  fn subscribe_conditional<S>(self, subscriber: S)
  where
    S: ConditionalSubscriber<Item> + Send + 'static,
  {
    self.subscribe(subscriber)
  }
}

// ============================================================================
// Boxed publishers
// ============================================================================

/// Object-safe mirror of [`Publisher`].
pub trait DynPublisher<Item> {
  fn box_subscribe(self: Box<Self>, subscriber: BoxedSubscriber<Item>);
}

impl<Item, P> DynPublisher<Item> for P
where
  Item: 'static,
  P: Publisher<Item>,
{
  fn box_subscribe(self: Box<Self>, subscriber: BoxedSubscriber<Item>) {
    (*self).subscribe(subscriber)
  }
}

/// A type-erased publisher.
///
/// Useful when the three signal handlers of
/// [`flat_map_signal`](crate::maybe::MaybeSourceExt::flat_map_signal) build
/// different kinds of continuation.
pub struct BoxedPublisher<Item>(Box<dyn DynPublisher<Item> + Send>);

impl<Item: 'static> BoxedPublisher<Item> {
  pub fn new(publisher: impl Publisher<Item> + Send + 'static) -> Self {
    BoxedPublisher(Box::new(publisher))
  }
}

impl<Item: 'static> Publisher<Item> for BoxedPublisher<Item> {
  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item> + Send + 'static,
  {
    self.0.box_subscribe(Box::new(subscriber))
  }
}

// ============================================================================
// Operator methods
// ============================================================================

pub trait PublisherExt<Item>: Publisher<Item> {
  /// Splits the flow into consecutive [`Window`](crate::window_sink::Window)s,
  /// starting a new one whenever `predicate` reports a boundary.
  ///
  /// ```
  /// use rxflow::{prelude::*, testing::{collect_window, TestSubscriber}};
  ///
  /// let (downstream, probe) = TestSubscriber::unbounded();
  /// publisher::from_iter(vec![1, 2, 3, 4, 5])
  ///   .window_by(WindowBoundary::Before, |v: &i32| Ok(*v == 3))
  ///   .subscribe(downstream);
  ///
  /// let windows: Vec<Vec<i32>> = probe.values().into_iter().map(collect_window).collect();
  /// assert_eq!(windows, vec![vec![1, 2], vec![3, 4, 5]]);
  /// ```
  fn window_by<F>(self, boundary: WindowBoundary, predicate: F) -> WindowBy<Self, F>
  where
    F: FnMut(&Item) -> Result<bool>,
  {
    self.window_by_with(WindowConfig::new(boundary), predicate)
  }

  /// Same as [`window_by`](PublisherExt::window_by) with an explicit
  /// configuration.
  fn window_by_with<F>(self, config: WindowConfig, predicate: F) -> WindowBy<Self, F>
  where
    F: FnMut(&Item) -> Result<bool>,
  {
    WindowBy { source: self, predicate, config }
  }

  /// Consumes the flow as a [`futures::Stream`].
  fn into_stream(self) -> IntoStream<Item>
  where
    Item: Send + 'static,
  {
    IntoStream::new(self, DEFAULT_PREFETCH)
  }

  /// Consumes the flow as a [`futures::Stream`], keeping at most `prefetch`
  /// elements requested ahead of the poller.
  fn into_stream_with_prefetch(self, prefetch: u64) -> IntoStream<Item>
  where
    Item: Send + 'static,
  {
    IntoStream::new(self, prefetch)
  }

  fn boxed(self) -> BoxedPublisher<Item>
  where
    Self: Send + 'static,
    Item: 'static,
  {
    BoxedPublisher::new(self)
  }
}

impl<Item, P> PublisherExt<Item> for P where P: Publisher<Item> {}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, testing::TestSubscriber};

  #[rxflow_macro::test]
  fn boxed_publishers_unify_types() {
    let flows: Vec<BoxedPublisher<i32>> =
      vec![publisher::from_iter(vec![1, 2]).boxed(), publisher::from_iter(3..5).boxed()];

    let mut all = vec![];
    for flow in flows {
      let (subscriber, probe) = TestSubscriber::unbounded();
      flow.subscribe(subscriber);
      assert!(probe.is_completed());
      all.extend(probe.values());
    }
    assert_eq!(all, vec![1, 2, 3, 4]);
  }
}
