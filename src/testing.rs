//! Test doubles for both ends of the protocol.
//!
//! [`TestSubscriber`] records everything it receives into a [`TestProbe`]
//! that stays with the test after the subscriber was moved into a flow.
//! [`ManualPublisher`] is a plain-path producer driven by hand, recording
//! every request it receives.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  demand::UNBOUNDED,
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{EmptySubscription, Subscription, SubscriptionRef},
  window_sink::Window,
};

// ============================================================================
// TestSubscriber
// ============================================================================

/// One recorded signal.
#[derive(Debug, Clone)]
pub enum Event<T> {
  Subscribed,
  Next(T),
  Error(FlowError),
  Complete,
}

struct ProbeState<T> {
  events: Vec<Event<T>>,
  subscription: Option<SubscriptionRef>,
}

/// The test's view of a [`TestSubscriber`].
pub struct TestProbe<T>(Arc<Mutex<ProbeState<T>>>);

impl<T> Clone for TestProbe<T> {
  fn clone(&self) -> Self { TestProbe(self.0.clone()) }
}

impl<T> TestProbe<T> {
  fn record(&self, event: Event<T>) { self.0.lock().events.push(event); }

  fn subscription(&self) -> Option<SubscriptionRef> { self.0.lock().subscription.clone() }

  pub fn is_subscribed(&self) -> bool { self.0.lock().subscription.is_some() }

  pub fn value_count(&self) -> usize {
    self.0.lock().events.iter().filter(|e| matches!(e, Event::Next(_))).count()
  }

  /// The first error received, if any.
  pub fn error(&self) -> Option<FlowError> {
    self.0.lock().events.iter().find_map(|e| match e {
      Event::Error(err) => Some(err.clone()),
      _ => None,
    })
  }

  pub fn is_completed(&self) -> bool {
    self.0.lock().events.iter().any(|e| matches!(e, Event::Complete))
  }

  pub fn is_terminated(&self) -> bool { self.terminal_count() > 0 }

  /// Number of terminal signals received. Anything but 0 or 1 is a protocol
  /// violation by the producer.
  pub fn terminal_count(&self) -> usize {
    self
      .0
      .lock()
      .events
      .iter()
      .filter(|e| matches!(e, Event::Error(_) | Event::Complete))
      .count()
  }

  /// Requests `n` more elements through the received subscription.
  pub fn request(&self, n: u64) {
    if let Some(subscription) = self.subscription() {
      subscription.request(n);
    }
  }

  pub fn cancel(&self) {
    if let Some(subscription) = self.subscription() {
      subscription.cancel();
    }
  }
}

impl<T: Clone> TestProbe<T> {
  pub fn values(&self) -> Vec<T> {
    self
      .0
      .lock()
      .events
      .iter()
      .filter_map(|e| match e {
        Event::Next(v) => Some(v.clone()),
        _ => None,
      })
      .collect()
  }

  pub fn events(&self) -> Vec<Event<T>> { self.0.lock().events.clone() }
}

/// A subscriber that records every signal.
pub struct TestSubscriber<T> {
  probe: TestProbe<T>,
  initial: u64,
  per_next: u64,
  subscription: Option<SubscriptionRef>,
}

impl<T> TestSubscriber<T> {
  /// Requests `initial` elements on subscription, then waits for the test.
  pub fn new(initial: u64) -> (Self, TestProbe<T>) { Self::replenishing(initial, 0) }

  pub fn unbounded() -> (Self, TestProbe<T>) { Self::new(UNBOUNDED) }

  /// Requests `initial` elements on subscription and `per_next` more from
  /// inside every `next`.
  pub fn replenishing(initial: u64, per_next: u64) -> (Self, TestProbe<T>) {
    let probe = TestProbe(Arc::new(Mutex::new(ProbeState { events: vec![], subscription: None })));
    let subscriber = TestSubscriber { probe: probe.clone(), initial, per_next, subscription: None };
    (subscriber, probe)
  }
}

impl<T> Subscriber<T> for TestSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    {
      let mut state = self.probe.0.lock();
      state.events.push(Event::Subscribed);
      state.subscription = Some(subscription.clone());
    }
    self.subscription = Some(subscription.clone());
    if self.initial > 0 {
      subscription.request(self.initial);
    }
  }

  fn next(&mut self, value: T) {
    self.probe.record(Event::Next(value));
    if self.per_next > 0 {
      if let Some(subscription) = &self.subscription {
        subscription.request(self.per_next);
      }
    }
  }

  fn error(self, err: FlowError) { self.probe.record(Event::Error(err)); }

  fn complete(self) { self.probe.record(Event::Complete); }
}

/// Subscribes to `window` with unbounded demand and returns what it had
/// buffered.
pub fn collect_window<T>(window: Window<T>) -> Vec<T>
where
  T: Clone + Send + 'static,
{
  let (subscriber, probe) = TestSubscriber::unbounded();
  window.subscribe(subscriber);
  probe.values()
}

// ============================================================================
// ManualPublisher
// ============================================================================

struct ManualState<T> {
  subscriber: Option<BoxedSubscriber<T>>,
  attached: bool,
  requests: Vec<u64>,
}

struct ManualCore<T> {
  state: Mutex<ManualState<T>>,
  cancelled: AtomicBool,
}

impl<T: Send> Subscription for ManualCore<T> {
  fn request(&self, n: u64) { self.state.lock().requests.push(n); }

  fn cancel(&self) { self.cancelled.store(true, Ordering::Release); }
}

/// A producer that emits only when the test tells it to.
///
/// It does not police demand: tests emit what they need and assert on
/// [`requests`](ManualPublisher::requests) instead.
pub struct ManualPublisher<T>(Arc<ManualCore<T>>);

impl<T> Clone for ManualPublisher<T> {
  fn clone(&self) -> Self { ManualPublisher(self.0.clone()) }
}

impl<T> Default for ManualPublisher<T> {
  fn default() -> Self { Self::new() }
}

impl<T> ManualPublisher<T> {
  pub fn new() -> Self {
    ManualPublisher(Arc::new(ManualCore {
      state: Mutex::new(ManualState { subscriber: None, attached: false, requests: vec![] }),
      cancelled: AtomicBool::new(false),
    }))
  }

  fn live_subscriber(&self) -> Option<BoxedSubscriber<T>> {
    if self.is_cancelled() {
      return None;
    }
    self.0.state.lock().subscriber.take()
  }

  /// Delivers `value`. Returns `false` if there was nobody to deliver to.
  pub fn emit(&self, value: T) -> bool {
    let Some(mut subscriber) = self.live_subscriber() else {
      return false;
    };
    subscriber.next(value);
    if !self.is_cancelled() {
      self.0.state.lock().subscriber = Some(subscriber);
    }
    true
  }

  pub fn fail(&self, err: FlowError) -> bool {
    let Some(subscriber) = self.live_subscriber() else {
      return false;
    };
    subscriber.error(err);
    true
  }

  pub fn finish(&self) -> bool {
    let Some(subscriber) = self.live_subscriber() else {
      return false;
    };
    subscriber.complete();
    true
  }

  /// Every `request` received, in order.
  pub fn requests(&self) -> Vec<u64> { self.0.state.lock().requests.clone() }

  pub fn total_requested(&self) -> u64 {
    self.requests().into_iter().fold(0, u64::saturating_add)
  }

  pub fn is_cancelled(&self) -> bool { self.0.cancelled.load(Ordering::Acquire) }
}

impl<T: Send + 'static> Publisher<T> for ManualPublisher<T> {
  fn subscribe<S>(self, mut subscriber: S)
  where
    S: Subscriber<T> + Send + 'static,
  {
    if std::mem::replace(&mut self.0.state.lock().attached, true) {
      subscriber.on_subscribe(EmptySubscription::shared());
      subscriber.error(FlowError::AlreadySubscribed);
      return;
    }
    subscriber.on_subscribe(self.0.clone());
    self.0.state.lock().subscriber = Some(Box::new(subscriber));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn manual_publisher_records_requests() {
    let source = ManualPublisher::new();
    let (subscriber, probe) = TestSubscriber::replenishing(3, 1);
    source.clone().subscribe(subscriber);

    assert!(source.emit(10));
    assert!(source.emit(20));
    assert_eq!(source.requests(), vec![3, 1, 1]);
    assert_eq!(source.total_requested(), 5);

    assert!(source.finish());
    assert!(!source.emit(30));
    assert_eq!(probe.values(), vec![10, 20]);
    assert!(probe.is_completed());
    assert_eq!(probe.terminal_count(), 1);
  }

  #[rxflow_macro::test]
  fn manual_publisher_stops_after_cancel() {
    let source = ManualPublisher::new();
    let (subscriber, probe) = TestSubscriber::new(1);
    source.clone().subscribe(subscriber);
    probe.cancel();

    assert!(source.is_cancelled());
    assert!(!source.emit(1));
    assert!(!source.finish());
    assert!(probe.values().is_empty());
  }

  #[rxflow_macro::test]
  fn probe_records_event_order() {
    let source = ManualPublisher::new();
    let (subscriber, probe) = TestSubscriber::unbounded();
    source.clone().subscribe(subscriber);
    source.emit('a');
    source.fail(FlowError::msg("boom"));

    let events = probe.events();
    assert!(matches!(events[0], Event::Subscribed));
    assert!(matches!(events[1], Event::Next('a')));
    assert!(matches!(&events[2], Event::Error(e) if e.to_string() == "boom"));
    assert_eq!(events.len(), 3);
  }
}
