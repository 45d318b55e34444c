//! WindowBy operator
//!
//! Splits a flow into consecutive windows, each itself a flow, starting a new
//! window whenever a predicate reports a boundary element.
//!
//! Behavior summary:
//! - The first window opens lazily with the first element.
//! - [`WindowBoundary`] decides where a boundary element goes: into the new
//!   window (`Before`), into the old one (`After`), or nowhere (`Split`).
//! - A replaced window is completed before its successor is emitted, so at
//!   most one window accepts elements at any time.
//! - Upstream termination reaches the open window first, then the outer
//!   consumer.
//! - A failing predicate cancels upstream and fails the outer consumer only;
//!   the open window is abandoned without a terminal signal.
//!
//! Demand is forwarded to upstream unchanged: one upstream element is one
//! unit of demand, whatever the number of windows it produces.
//!
//! ```rust
//! use rxflow::{prelude::*, testing::{collect_window, TestSubscriber}};
//!
//! let (downstream, probe) = TestSubscriber::unbounded();
//! publisher::from_iter(vec![1, 2, 3, 4, 5])
//!   .window_by(WindowBoundary::Split, |v: &i32| Ok(*v == 3))
//!   .subscribe(downstream);
//!
//! let windows: Vec<Vec<i32>> = probe.values().into_iter().map(collect_window).collect();
//! assert_eq!(windows, vec![vec![1, 2], vec![4, 5]]);
//! ```

use tracing::{debug, trace};

use crate::{
  error::{FlowError, Result},
  publisher::Publisher,
  subscriber::{ConditionalSubscriber, Subscriber},
  subscription::SubscriptionRef,
  window_sink::{self, Window, WindowPush, DEFAULT_CAPACITY_HINT},
};

/// Where a boundary element ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowBoundary {
  /// The boundary element starts the new window.
  Before,
  /// The boundary element ends the old window; the new one starts empty.
  After,
  /// The boundary element belongs to neither window.
  Split,
}

/// Configuration of [`window_by_with`](crate::publisher::PublisherExt::window_by_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
  boundary: WindowBoundary,
  capacity_hint: usize,
}

impl WindowConfig {
  /// Splits at `boundary` elements with [`DEFAULT_CAPACITY_HINT`].
  pub fn new(boundary: WindowBoundary) -> Self {
    WindowConfig { boundary, capacity_hint: DEFAULT_CAPACITY_HINT }
  }

  /// Pre-sizes each window's buffer. Advisory only.
  ///
  /// # Panics
  ///
  /// Panics if `hint` is 0.
  pub fn capacity_hint(mut self, hint: usize) -> Self {
    assert!(hint > 0, "window_by: capacity hint must be positive");
    self.capacity_hint = hint;
    self
  }

  /// Where boundary elements end up.
  pub fn boundary(&self) -> WindowBoundary { self.boundary }

  /// The capacity hint every window is created with.
  pub fn hint(&self) -> usize { self.capacity_hint }
}

/// WindowBy operator, see the [module docs](self).
#[derive(Clone)]
pub struct WindowBy<S, F> {
  pub(crate) source: S,
  pub(crate) predicate: F,
  pub(crate) config: WindowConfig,
}

impl<Item, S, F> Publisher<Window<Item>> for WindowBy<S, F>
where
  S: Publisher<Item>,
  F: FnMut(&Item) -> Result<bool> + Send + 'static,
  Item: Send + 'static,
{
  fn subscribe<O>(self, downstream: O)
  where
    O: Subscriber<Window<Item>> + Send + 'static,
  {
    self
      .source
      .subscribe_conditional(WindowBySubscriber::new(downstream, self.predicate, self.config));
  }
}

// ============================================================================
// WindowBySubscriber
// ============================================================================

/// The upstream-facing half of the operator.
///
/// `downstream` is `None` once a terminal signal went out; everything arriving
/// later is dropped.
pub struct WindowBySubscriber<O, F, Item> {
  downstream: Option<O>,
  predicate: F,
  config: WindowConfig,
  window: Option<WindowPush<Item>>,
  upstream: Option<SubscriptionRef>,
}

impl<O, F, Item> WindowBySubscriber<O, F, Item>
where
  O: Subscriber<Window<Item>>,
  F: FnMut(&Item) -> Result<bool>,
{
  fn new(downstream: O, predicate: F, config: WindowConfig) -> Self {
    WindowBySubscriber { downstream: Some(downstream), predicate, config, window: None, upstream: None }
  }

  fn open_window(&mut self) {
    let Some(downstream) = self.downstream.as_mut() else {
      return;
    };
    let (push, window) = window_sink::create(self.config.capacity_hint);
    trace!(window = %push.id(), "window opened");
    self.window = Some(push);
    downstream.next(window);
  }

  fn close_window(&mut self) {
    if let Some(push) = self.window.take() {
      push.finish();
      trace!(window = %push.id(), "window closed");
    }
  }

  fn push(&self, value: Item) {
    if let Some(push) = &self.window {
      push.emit(value);
    }
  }

  fn abort(&mut self, err: FlowError) {
    debug!(error = %err, "boundary predicate failed, cancelling upstream");
    if let Some(upstream) = self.upstream.take() {
      upstream.cancel();
    }
    if let Some(abandoned) = self.window.take() {
      trace!(window = %abandoned.id(), "window abandoned");
    }
    if let Some(downstream) = self.downstream.take() {
      downstream.error(err);
    }
  }
}

impl<O, F, Item> ConditionalSubscriber<Item> for WindowBySubscriber<O, F, Item>
where
  O: Subscriber<Window<Item>>,
  F: FnMut(&Item) -> Result<bool>,
{
  /// Returns whether `value` was a boundary element.
  fn try_next(&mut self, value: Item) -> bool {
    if self.downstream.is_none() {
      trace!("element dropped: splitter already terminated");
      return true;
    }
    if self.window.is_none() {
      self.open_window();
    }

    let is_boundary = match (self.predicate)(&value) {
      Ok(is_boundary) => is_boundary,
      Err(err) => {
        self.abort(err);
        return true;
      }
    };
    if !is_boundary {
      self.push(value);
      return false;
    }

    match self.config.boundary {
      WindowBoundary::Before => {
        self.close_window();
        self.open_window();
        self.push(value);
      }
      WindowBoundary::After => {
        self.push(value);
        self.close_window();
        self.open_window();
      }
      WindowBoundary::Split => {
        self.close_window();
        self.open_window();
      }
    }
    true
  }
}

impl<O, F, Item> Subscriber<Item> for WindowBySubscriber<O, F, Item>
where
  O: Subscriber<Window<Item>>,
  F: FnMut(&Item) -> Result<bool>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.upstream = Some(subscription.clone());
    if let Some(downstream) = self.downstream.as_mut() {
      downstream.on_subscribe(subscription);
    }
  }

  fn next(&mut self, value: Item) {
    // Only a boundary may use up the outer consumer's demand.
    if !self.try_next(value) {
      if let Some(upstream) = &self.upstream {
        upstream.request(1);
      }
    }
  }

  fn error(mut self, err: FlowError) {
    let Some(downstream) = self.downstream.take() else {
      trace!(error = %err, "error dropped: splitter already terminated");
      return;
    };
    if let Some(push) = self.window.take() {
      push.fail(err.clone());
    }
    downstream.error(err);
  }

  fn complete(mut self) {
    let Some(downstream) = self.downstream.take() else {
      trace!("completion dropped: splitter already terminated");
      return;
    };
    self.close_window();
    downstream.complete();
  }
}

#[cfg(test)]
mod tests {
  use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
  };

  use parking_lot::Mutex;

  use super::*;
  use crate::{
    prelude::*,
    subscription::EmptySubscription,
    testing::{collect_window, ManualPublisher, TestSubscriber},
  };

  fn split(input: Vec<i32>, boundary: WindowBoundary) -> Vec<Vec<i32>> {
    let (downstream, probe) = TestSubscriber::unbounded();
    publisher::from_iter(input)
      .window_by(boundary, |v: &i32| Ok(*v == 3))
      .subscribe(downstream);
    assert!(probe.is_completed());
    probe.values().into_iter().map(collect_window).collect()
  }

  #[rxflow_macro::test]
  fn boundary_placement() {
    let input = vec![1, 2, 3, 4, 5];
    assert_eq!(split(input.clone(), WindowBoundary::Before), vec![vec![1, 2], vec![3, 4, 5]]);
    assert_eq!(split(input.clone(), WindowBoundary::After), vec![vec![1, 2, 3], vec![4, 5]]);
    assert_eq!(split(input, WindowBoundary::Split), vec![vec![1, 2], vec![4, 5]]);
  }

  #[rxflow_macro::test]
  fn one_window_per_boundary_plus_one() {
    let input = vec![3, 1, 3, 3, 2, 3];
    for boundary in [WindowBoundary::Before, WindowBoundary::After, WindowBoundary::Split] {
      let windows = split(input.clone(), boundary);
      assert_eq!(windows.len(), 5, "{boundary:?}");

      let flattened: Vec<i32> = windows.concat();
      let expected: Vec<i32> = match boundary {
        WindowBoundary::Split => input.iter().copied().filter(|v| *v != 3).collect(),
        _ => input.clone(),
      };
      assert_eq!(flattened, expected, "{boundary:?}");
    }
  }

  #[rxflow_macro::test]
  fn empty_source_opens_no_window() {
    let (downstream, probe) = TestSubscriber::<Window<i32>>::unbounded();
    publisher::from_iter(Vec::<i32>::new())
      .window_by(WindowBoundary::Before, |_| Ok(true))
      .subscribe(downstream);
    assert_eq!(probe.value_count(), 0);
    assert!(probe.is_completed());
  }

  #[rxflow_macro::test]
  fn capacity_hint_reaches_every_window() {
    let (downstream, probe) = TestSubscriber::unbounded();
    publisher::from_iter(0..4)
      .window_by_with(WindowConfig::new(WindowBoundary::After).capacity_hint(4), |v: &i32| {
        Ok(v % 2 == 1)
      })
      .subscribe(downstream);
    let windows = probe.values();
    assert_eq!(windows.len(), 3);
    assert!(windows.iter().all(|w| w.capacity_hint() == 4));
  }

  #[rxflow_macro::test]
  #[should_panic(expected = "capacity hint must be positive")]
  fn zero_capacity_hint_panics() { let _ = WindowConfig::new(WindowBoundary::Split).capacity_hint(0); }

  #[rxflow_macro::test]
  fn config_defaults_and_getters() {
    let config = WindowConfig::new(WindowBoundary::Before);
    assert_eq!(config.boundary(), WindowBoundary::Before);
    assert_eq!(config.hint(), DEFAULT_CAPACITY_HINT);
    assert_eq!(config.capacity_hint(usize::MAX).hint(), usize::MAX);
  }

  #[rxflow_macro::test]
  #[should_panic(expected = "predicate exploded")]
  fn predicate_panic_unwinds_to_the_emitter() {
    let source = ManualPublisher::new();
    let (downstream, probe) = TestSubscriber::<Window<i32>>::unbounded();
    source
      .clone()
      .window_by(WindowBoundary::Before, |v: &i32| {
        if *v == 2 {
          panic!("predicate exploded");
        }
        Ok(false)
      })
      .subscribe(downstream);

    source.emit(1);
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| source.emit(2)));
    assert!(probe.error().is_none());
    assert!(!probe.is_terminated());
    assert_eq!(probe.value_count(), 1);
    if let Err(payload) = unwound {
      panic::resume_unwind(payload);
    }
  }

  #[rxflow_macro::test]
  fn upstream_error_before_any_window() {
    let source = ManualPublisher::new();
    let (downstream, probe) = TestSubscriber::<Window<i32>>::unbounded();
    source
      .clone()
      .window_by(WindowBoundary::After, |_: &i32| Ok(true))
      .subscribe(downstream);

    assert!(source.fail(FlowError::msg("no data")));
    assert_eq!(probe.value_count(), 0);
    assert_eq!(probe.terminal_count(), 1);
    assert_eq!(probe.error().map(|e| e.to_string()), Some("no data".to_owned()));
  }

  #[rxflow_macro::test]
  fn plain_source_is_compensated_per_non_boundary_element() {
    let source = ManualPublisher::new();
    let (downstream, probe) = TestSubscriber::new(5);
    source
      .clone()
      .window_by(WindowBoundary::Before, |v: &i32| Ok(*v % 3 == 0))
      .subscribe(downstream);

    for v in 1..=6 {
      source.emit(v);
    }
    // 1, 2, 4 and 5 are replaced, 3 and 6 are not
    assert_eq!(source.requests(), vec![5, 1, 1, 1, 1]);
    assert_eq!(probe.value_count(), 3);
  }

  #[rxflow_macro::test]
  fn fused_source_counts_only_boundaries() {
    let (downstream, probe) = TestSubscriber::new(1);
    publisher::from_iter(1..=9)
      .window_by(WindowBoundary::Split, |v: &i32| Ok(*v % 3 == 0))
      .subscribe(downstream);

    // the single unit of demand is used up by the boundary 3
    assert_eq!(probe.value_count(), 2);
    assert!(!probe.is_terminated());

    probe.request(1);
    let windows = probe.values();
    assert_eq!(windows.len(), 3);
    assert_eq!(collect_window(windows[0].clone()), vec![1, 2]);
    assert_eq!(collect_window(windows[1].clone()), vec![4, 5]);
  }

  #[rxflow_macro::test]
  fn predicate_failure_cancels_and_abandons_window() {
    let source = ManualPublisher::new();
    let (downstream, probe) = TestSubscriber::unbounded();
    source
      .clone()
      .window_by(WindowBoundary::After, |v: &i32| {
        if *v == 2 { Err(FlowError::msg("bad element")) } else { Ok(false) }
      })
      .subscribe(downstream);

    assert!(source.emit(1));
    let windows = probe.values();
    let (window_subscriber, window_probe) = TestSubscriber::unbounded();
    windows[0].clone().subscribe(window_subscriber);

    source.emit(2);
    assert!(source.is_cancelled());
    assert!(!source.emit(3));
    assert_eq!(probe.error().map(|e| e.to_string()), Some("bad element".to_owned()));
    assert_eq!(probe.terminal_count(), 1);
    assert_eq!(window_probe.values(), vec![1]);
    assert!(!window_probe.is_terminated());
  }

  #[rxflow_macro::test]
  fn signals_after_termination_are_dropped() {
    let (downstream, probe) = TestSubscriber::unbounded();
    let mut splitter = WindowBySubscriber::new(
      downstream,
      |v: &i32| if *v < 0 { Err(FlowError::msg("negative")) } else { Ok(*v == 0) },
      WindowConfig::new(WindowBoundary::Before),
    );
    splitter.on_subscribe(EmptySubscription::shared());
    assert!(!splitter.try_next(1));
    assert!(splitter.try_next(-1));
    assert!(splitter.try_next(0));
    splitter.complete();

    assert_eq!(probe.value_count(), 1);
    assert_eq!(probe.terminal_count(), 1);
    assert!(probe.error().is_some());
  }

  /// Subscribes to every window as it arrives and logs the windows' signals
  /// and the outer flow's terminal in one shared log.
  #[derive(Clone, Default)]
  struct Watcher {
    log: Arc<Mutex<Vec<String>>>,
    open: Arc<Mutex<usize>>,
    overlapped: Arc<Mutex<bool>>,
    windows: usize,
  }

  struct WindowLogger {
    index: usize,
    watcher: Watcher,
  }

  impl WindowLogger {
    fn terminal(self, what: &str) {
      *self.watcher.open.lock() -= 1;
      self.watcher.log.lock().push(format!("w{}:{what}", self.index));
    }
  }

  impl Subscriber<i32> for WindowLogger {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) { subscription.request(u64::MAX); }
    fn next(&mut self, value: i32) { self.watcher.log.lock().push(format!("w{}:{value}", self.index)); }
    fn error(self, _: FlowError) { self.terminal("error") }
    fn complete(self) { self.terminal("complete") }
  }

  impl Subscriber<Window<i32>> for Watcher {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) { subscription.request(u64::MAX); }

    fn next(&mut self, window: Window<i32>) {
      {
        let mut open = self.open.lock();
        if *open > 0 {
          *self.overlapped.lock() = true;
        }
        *open += 1;
      }
      let logger = WindowLogger { index: self.windows, watcher: self.clone() };
      self.windows += 1;
      window.subscribe(logger);
    }

    fn error(self, _: FlowError) { self.log.lock().push("outer:error".to_owned()); }

    fn complete(self) { self.log.lock().push("outer:complete".to_owned()); }
  }

  #[rxflow_macro::test]
  fn windows_never_overlap() {
    let watcher = Watcher::default();
    publisher::from_iter(vec![1, 2, 3, 4, 3, 5])
      .window_by(WindowBoundary::After, |v: &i32| Ok(*v == 3))
      .subscribe(watcher.clone());

    assert!(!*watcher.overlapped.lock());
    assert_eq!(
      *watcher.log.lock(),
      vec![
        "w0:1", "w0:2", "w0:3", "w0:complete", "w1:4", "w1:3", "w1:complete", "w2:5",
        "w2:complete", "outer:complete",
      ]
    );
  }

  #[rxflow_macro::test]
  fn upstream_error_reaches_window_first() {
    let source = ManualPublisher::new();
    let watcher = Watcher::default();
    source
      .clone()
      .window_by(WindowBoundary::Before, |_: &i32| Ok(false))
      .subscribe(watcher.clone());

    source.emit(1);
    source.fail(FlowError::msg("gone"));
    assert_eq!(*watcher.log.lock(), vec!["w0:1", "w0:error", "outer:error"]);
  }
}
