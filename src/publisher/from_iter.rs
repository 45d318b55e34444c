use std::{
  iter::Peekable,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{
  demand::{Demand, WorkInProgress},
  publisher::Publisher,
  subscriber::{ConditionalSubscriber, Subscriber},
  subscription::Subscription,
};

/// Creates a publisher that produces values from an iterator.
///
/// Values are pulled from the iterator only as the subscriber requests them,
/// and completion is signalled as soon as the iterator is exhausted, even
/// without outstanding demand. Never emits an error.
///
/// # Examples
///
/// ```
/// use rxflow::{prelude::*, testing::TestSubscriber};
///
/// let (subscriber, probe) = TestSubscriber::new(2);
/// publisher::from_iter(0..10).subscribe(subscriber);
/// assert_eq!(probe.values(), vec![0, 1]);
///
/// probe.request(3);
/// assert_eq!(probe.values(), vec![0, 1, 2, 3, 4]);
/// ```
pub fn from_iter<Iter>(iter: Iter) -> FromIter<Iter>
where
  Iter: IntoIterator,
{
  FromIter(iter)
}

#[derive(Clone)]
pub struct FromIter<Iter>(Iter);

impl<Iter> Publisher<Iter::Item> for FromIter<Iter>
where
  Iter: IntoIterator,
  Iter::IntoIter: Send + 'static,
  Iter::Item: Send + 'static,
{
  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Iter::Item> + Send + 'static,
  {
    IterSubscription::start(self.0.into_iter(), Plain(subscriber));
  }

  fn subscribe_conditional<S>(self, subscriber: S)
  where
    S: ConditionalSubscriber<Iter::Item> + Send + 'static,
  {
    IterSubscription::start(self.0.into_iter(), Fused(subscriber));
  }
}

// ============================================================================
// Emission strategies
// ============================================================================

/// How an element is handed over, and whether it used up demand.
trait Emitter<Item>: Subscriber<Item> {
  fn emit(&mut self, value: Item) -> bool;
}

struct Plain<S>(S);

struct Fused<S>(S);

macro_rules! delegate_subscriber {
  ($wrapper:ident, $bound:ident) => {
    impl<Item, S: $bound<Item>> Subscriber<Item> for $wrapper<S> {
      fn on_subscribe(&mut self, subscription: crate::subscription::SubscriptionRef) {
        self.0.on_subscribe(subscription)
      }
      fn next(&mut self, value: Item) { self.0.next(value) }
      fn error(self, err: crate::error::FlowError) { self.0.error(err) }
      fn complete(self) { self.0.complete() }
    }
  };
}

delegate_subscriber!(Plain, Subscriber);
delegate_subscriber!(Fused, ConditionalSubscriber);

impl<Item, S: Subscriber<Item>> Emitter<Item> for Plain<S> {
  #[inline]
  fn emit(&mut self, value: Item) -> bool {
    self.0.next(value);
    true
  }
}

impl<Item, S: ConditionalSubscriber<Item>> Emitter<Item> for Fused<S> {
  #[inline]
  fn emit(&mut self, value: Item) -> bool { self.0.try_next(value) }
}

// ============================================================================
// Subscription
// ============================================================================

struct IterState<It: Iterator, E> {
  iter: Peekable<It>,
  subscriber: Option<E>,
}

struct IterSubscription<It: Iterator, E> {
  state: Mutex<IterState<It, E>>,
  demand: Demand,
  wip: WorkInProgress,
  cancelled: AtomicBool,
}

impl<It, E> IterSubscription<It, E>
where
  It: Iterator + Send + 'static,
  It::Item: Send + 'static,
  E: Emitter<It::Item> + Send + 'static,
{
  fn start(iter: It, mut subscriber: E) {
    let subscription = Arc::new(IterSubscription {
      state: Mutex::new(IterState { iter: iter.peekable(), subscriber: None }),
      demand: Demand::new(),
      wip: WorkInProgress::new(),
      cancelled: AtomicBool::new(false),
    });
    // The subscriber is installed only after `on_subscribe` returns; requests
    // made from inside it are kept in `demand` and served by the drain below.
    subscriber.on_subscribe(subscription.clone());
    subscription.state.lock().subscriber = Some(subscriber);
    subscription.drain();
  }

  fn drain(&self) {
    if !self.wip.enter() {
      return;
    }
    let mut missed = 1;
    loop {
      if self.emit_pass() {
        return;
      }
      missed = self.wip.leave(missed);
      if missed == 0 {
        break;
      }
    }
  }

  /// One pass over the current demand. Returns `true` once the subscription
  /// reached a final state and the drain loop must never run again.
  fn emit_pass(&self) -> bool {
    let mut state = self.state.lock();
    if self.cancelled.load(Ordering::Acquire) {
      state.subscriber = None;
      return true;
    }
    let IterState { iter, subscriber } = &mut *state;
    let Some(emitter) = subscriber.as_mut() else {
      // still inside `on_subscribe`
      return false;
    };

    let requested = self.demand.get();
    let mut consumed = 0;
    while consumed != requested && !self.cancelled.load(Ordering::Acquire) {
      match iter.next() {
        Some(value) => {
          if emitter.emit(value) {
            consumed += 1;
          }
        }
        None => break,
      }
    }

    if self.cancelled.load(Ordering::Acquire) {
      *subscriber = None;
      return true;
    }
    if iter.peek().is_none() {
      self.cancelled.store(true, Ordering::Release);
      let finished = subscriber.take();
      drop(state);
      if let Some(subscriber) = finished {
        subscriber.complete();
      }
      return true;
    }
    if consumed != 0 {
      self.demand.produced(consumed);
    }
    false
  }
}

impl<It, E> Subscription for IterSubscription<It, E>
where
  It: Iterator + Send + 'static,
  It::Item: Send + 'static,
  E: Emitter<It::Item> + Send + 'static,
{
  fn request(&self, n: u64) {
    if n == 0 {
      return;
    }
    self.demand.add(n);
    self.drain();
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      self.drain();
    }
  }
}

#[cfg(test)]
mod test {
  use crate::{prelude::*, testing::TestSubscriber};

  #[rxflow_macro::test]
  fn from_range() {
    let (subscriber, probe) = TestSubscriber::unbounded();
    publisher::from_iter(0..100).subscribe(subscriber);

    assert_eq!(probe.values().len(), 100);
    assert!(probe.is_completed());
  }

  #[rxflow_macro::test]
  fn honours_demand() {
    let (subscriber, probe) = TestSubscriber::new(0);
    publisher::from_iter(vec![1, 2, 3]).subscribe(subscriber);
    assert!(probe.values().is_empty());
    assert!(!probe.is_terminated());

    probe.request(2);
    assert_eq!(probe.values(), vec![1, 2]);
    assert!(!probe.is_terminated());

    probe.request(1);
    assert_eq!(probe.values(), vec![1, 2, 3]);
    assert!(probe.is_completed());
  }

  #[rxflow_macro::test]
  fn empty_iterator_completes_without_demand() {
    let (subscriber, probe) = TestSubscriber::<i32>::new(0);
    publisher::from_iter(Vec::new()).subscribe(subscriber);
    assert!(probe.is_completed());
  }

  #[rxflow_macro::test]
  fn cancel_stops_emission() {
    let (subscriber, probe) = TestSubscriber::new(2);
    publisher::from_iter(0..10).subscribe(subscriber);
    probe.cancel();
    probe.request(5);
    assert_eq!(probe.values(), vec![0, 1]);
    assert!(!probe.is_terminated());
  }

  #[rxflow_macro::test]
  fn reentrant_requests_do_not_recurse() {
    // One element per request, re-requested from inside `next`: a recursive
    // producer would overflow the stack long before 100_000.
    let (subscriber, probe) = TestSubscriber::replenishing(1, 1);
    publisher::from_iter(0..100_000).subscribe(subscriber);
    assert_eq!(probe.values().len(), 100_000);
    assert!(probe.is_completed());
  }
}
