//! Optional-value sources
//!
//! A [`MaybeSource`] produces exactly one [`Signal`]: a success value, a
//! failure, or completion without a value. It is the input of
//! [`flat_map_signal`](MaybeSourceExt::flat_map_signal).
//!
//! ```
//! use rxflow::{prelude::*, testing::TestSubscriber};
//!
//! let (subscriber, probe) = TestSubscriber::unbounded();
//! maybe::just(3)
//!   .flat_map_signal(
//!     |n| Ok(Some(publisher::from_iter(0..n).boxed())),
//!     |_err| Ok(Some(publisher::from_iter(vec![-1]).boxed())),
//!     || Ok(Some(publisher::from_iter(Vec::new()).boxed())),
//!   )
//!   .subscribe(subscriber);
//!
//! assert_eq!(probe.values(), vec![0, 1, 2]);
//! assert!(probe.is_completed());
//! ```

use std::{
  fmt::{Display, Formatter},
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
  error::{FlowError, Result},
  ops::flat_map_signal::FlatMapSignal,
  subscription::{EmptySubscription, Subscription, SubscriptionRef},
};

// ============================================================================
// Signal
// ============================================================================

/// The single outcome of an optional-value source.
#[derive(Debug)]
pub enum Signal<T> {
  Success(T),
  Failure(FlowError),
  Complete,
}

/// The shape of a [`Signal`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
  Success,
  Failure,
  Complete,
}

impl Display for SignalKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      SignalKind::Success => "success",
      SignalKind::Failure => "error",
      SignalKind::Complete => "complete",
    })
  }
}

impl<T> Signal<T> {
  pub fn kind(&self) -> SignalKind {
    match self {
      Signal::Success(_) => SignalKind::Success,
      Signal::Failure(_) => SignalKind::Failure,
      Signal::Complete => SignalKind::Complete,
    }
  }
}

impl<T> From<Option<T>> for Signal<T> {
  fn from(value: Option<T>) -> Self { value.map_or(Signal::Complete, Signal::Success) }
}

impl<T> From<Result<Option<T>>> for Signal<T> {
  fn from(value: Result<Option<T>>) -> Self {
    match value {
      Ok(value) => value.into(),
      Err(err) => Signal::Failure(err),
    }
  }
}

// ============================================================================
// Observer / Source traits
// ============================================================================

/// Consumer of a [`MaybeSource`].
pub trait MaybeObserver<T> {
  /// Receives the cancellation handle. Called exactly once, first. Demand
  /// requested through it is ignored.
  fn on_subscribe(&mut self, subscription: SubscriptionRef);

  /// Receives the single outcome.
  fn on_signal(self, signal: Signal<T>);
}

/// Object-safe mirror of [`MaybeObserver`].
pub trait DynMaybeObserver<T> {
  fn box_on_subscribe(&mut self, subscription: SubscriptionRef);
  fn box_on_signal(self: Box<Self>, signal: Signal<T>);
}

impl<T, O: MaybeObserver<T>> DynMaybeObserver<T> for O {
  fn box_on_subscribe(&mut self, subscription: SubscriptionRef) { self.on_subscribe(subscription) }
  fn box_on_signal(self: Box<Self>, signal: Signal<T>) { self.on_signal(signal) }
}

pub type BoxedMaybeObserver<T> = Box<dyn DynMaybeObserver<T> + Send>;

impl<T> MaybeObserver<T> for BoxedMaybeObserver<T> {
  #[inline]
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    (**self).box_on_subscribe(subscription)
  }

  #[inline]
  fn on_signal(self, signal: Signal<T>) { self.box_on_signal(signal) }
}

/// A source that produces exactly one [`Signal`] per subscription.
pub trait MaybeSource: Sized {
  type Item;

  fn subscribe<O>(self, observer: O)
  where
    O: MaybeObserver<Self::Item> + Send + 'static;
}

pub trait MaybeSourceExt: MaybeSource {
  /// Routes the source's signal to exactly one of three handlers and relays
  /// the continuation flow the handler builds.
  ///
  /// A handler reports failure with `Err`; returning `Ok(None)` is treated as
  /// a protocol violation and surfaces as
  /// [`FlowError::MissingContinuation`]. Either way the failure goes
  /// downstream and no other handler runs.
  fn flat_map_signal<P, FS, FE, FC>(
    self, on_success: FS, on_error: FE, on_complete: FC,
  ) -> FlatMapSignal<Self, P, FS, FE, FC>
  where
    FS: FnOnce(Self::Item) -> Result<Option<P>>,
    FE: FnOnce(FlowError) -> Result<Option<P>>,
    FC: FnOnce() -> Result<Option<P>>,
  {
    FlatMapSignal::new(self, on_success, on_error, on_complete)
  }
}

impl<M: MaybeSource> MaybeSourceExt for M {}

// ============================================================================
// Sources
// ============================================================================

/// Cancellation flag handed to observers of the one-shot sources.
#[derive(Debug, Default)]
struct SignalSubscription {
  cancelled: AtomicBool,
}

impl SignalSubscription {
  fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}

impl Subscription for SignalSubscription {
  fn request(&self, _n: u64) {}

  fn cancel(&self) { self.cancelled.store(true, Ordering::Release); }
}

/// Hands out the subscription first; `signal` is only evaluated if the
/// observer did not cancel inside `on_subscribe`.
fn deliver<T, O, F>(mut observer: O, signal: F)
where
  O: MaybeObserver<T>,
  F: FnOnce() -> Signal<T>,
{
  let subscription = Arc::new(SignalSubscription::default());
  observer.on_subscribe(subscription.clone());
  if subscription.is_cancelled() {
    trace!("signal skipped: observer cancelled");
    return;
  }
  observer.on_signal(signal());
}

/// A source whose signal is known up front.
#[derive(Debug)]
pub struct Ready<T>(Signal<T>);

/// Succeeds with `value`.
pub fn just<T>(value: T) -> Ready<T> { Ready(Signal::Success(value)) }

/// Completes without a value.
pub fn empty<T>() -> Ready<T> { Ready(Signal::Complete) }

/// Fails with `err`.
pub fn error<T>(err: FlowError) -> Ready<T> { Ready(Signal::Failure(err)) }

impl<T> MaybeSource for Ready<T> {
  type Item = T;

  fn subscribe<O>(self, observer: O)
  where
    O: MaybeObserver<T> + Send + 'static,
  {
    deliver(observer, || self.0)
  }
}

/// A source that computes its signal when subscribed.
pub struct FromFn<F, T> {
  func: F,
  _item: PhantomData<fn() -> T>,
}

/// Defers to `func` at subscription time. Anything convertible into a
/// [`Signal`] works: `Option<T>`, `Result<Option<T>>`, or a `Signal` itself.
///
/// ```
/// use rxflow::prelude::*;
///
/// let lookup = maybe::from_fn(|| -> Option<u32> { None });
/// # let _ = lookup;
/// ```
pub fn from_fn<F, S, T>(func: F) -> FromFn<F, T>
where
  F: FnOnce() -> S,
  S: Into<Signal<T>>,
{
  FromFn { func, _item: PhantomData }
}

impl<F, S, T> MaybeSource for FromFn<F, T>
where
  F: FnOnce() -> S,
  S: Into<Signal<T>>,
{
  type Item = T;

  fn subscribe<O>(self, observer: O)
  where
    O: MaybeObserver<T> + Send + 'static,
  {
    deliver(observer, || (self.func)().into())
  }
}

// ============================================================================
// MaybeSubject
// ============================================================================

struct SubjectState<T> {
  observer: Option<BoxedMaybeObserver<T>>,
  pending: Option<Signal<T>>,
  attached: bool,
  signalled: bool,
}

struct SubjectCore<T> {
  state: Mutex<SubjectState<T>>,
  cancelled: AtomicBool,
}

impl<T: Send> Subscription for SubjectCore<T> {
  fn request(&self, _n: u64) {}

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      let observer = self.state.lock().observer.take();
      drop(observer);
    }
  }
}

/// A [`MaybeSource`] whose signal is supplied later, from any thread.
///
/// Handles are cheap to clone; only the first subscriber is accepted. A signal
/// supplied before anyone subscribed is kept for the subscriber.
pub struct MaybeSubject<T>(Arc<SubjectCore<T>>);

impl<T> Clone for MaybeSubject<T> {
  fn clone(&self) -> Self { MaybeSubject(self.0.clone()) }
}

impl<T> Default for MaybeSubject<T> {
  fn default() -> Self { Self::new() }
}

impl<T> MaybeSubject<T> {
  pub fn new() -> Self {
    MaybeSubject(Arc::new(SubjectCore {
      state: Mutex::new(SubjectState {
        observer: None,
        pending: None,
        attached: false,
        signalled: false,
      }),
      cancelled: AtomicBool::new(false),
    }))
  }

  /// Supplies the signal. Only the first call has an effect; returns whether
  /// this call was it.
  pub fn signal(&self, signal: Signal<T>) -> bool {
    let observer = {
      let mut state = self.0.state.lock();
      if state.signalled {
        return false;
      }
      state.signalled = true;
      match state.observer.take() {
        Some(observer) => observer,
        None => {
          state.pending = Some(signal);
          return true;
        }
      }
    };
    if self.0.cancelled.load(Ordering::Acquire) {
      trace!(signal = %signal.kind(), "signal dropped: observer cancelled");
    } else {
      observer.on_signal(signal);
    }
    true
  }

  pub fn success(&self, value: T) -> bool { self.signal(Signal::Success(value)) }

  pub fn fail(&self, err: FlowError) -> bool { self.signal(Signal::Failure(err)) }

  pub fn complete(&self) -> bool { self.signal(Signal::Complete) }

  /// `true` once the subscriber cancelled.
  pub fn is_cancelled(&self) -> bool { self.0.cancelled.load(Ordering::Acquire) }

  pub fn has_observer(&self) -> bool { self.0.state.lock().observer.is_some() }
}

impl<T: Send + 'static> MaybeSource for MaybeSubject<T> {
  type Item = T;

  fn subscribe<O>(self, mut observer: O)
  where
    O: MaybeObserver<T> + Send + 'static,
  {
    if std::mem::replace(&mut self.0.state.lock().attached, true) {
      debug!("maybe subject refused a second observer");
      observer.on_subscribe(EmptySubscription::shared());
      observer.on_signal(Signal::Failure(FlowError::AlreadySubscribed));
      return;
    }
    observer.on_subscribe(self.0.clone());
    if self.0.cancelled.load(Ordering::Acquire) {
      return;
    }
    let pending = {
      let mut state = self.0.state.lock();
      match state.pending.take() {
        Some(signal) => Some(signal),
        None => {
          state.observer = Some(Box::new(observer));
          return;
        }
      }
    };
    if let Some(signal) = pending {
      observer.on_signal(signal);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Record {
    subscribed: bool,
    signal: Option<SignalKind>,
  }

  struct Recorder(Arc<Mutex<Record>>, bool);

  impl MaybeObserver<i32> for Recorder {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
      self.0.lock().subscribed = true;
      if self.1 {
        subscription.cancel();
      }
    }

    fn on_signal(self, signal: Signal<i32>) { self.0.lock().signal = Some(signal.kind()); }
  }

  fn record(source: impl MaybeSource<Item = i32>, cancel_early: bool) -> Option<SignalKind> {
    let record = Arc::new(Mutex::new(Record::default()));
    source.subscribe(Recorder(record.clone(), cancel_early));
    let record = record.lock();
    assert!(record.subscribed);
    record.signal
  }

  #[rxflow_macro::test]
  fn ready_sources_emit_their_shape() {
    assert_eq!(record(just(1), false), Some(SignalKind::Success));
    assert_eq!(record(empty(), false), Some(SignalKind::Complete));
    assert_eq!(record(error(FlowError::msg("x")), false), Some(SignalKind::Failure));
  }

  #[rxflow_macro::test]
  fn cancelled_observer_gets_nothing() {
    assert_eq!(record(just(1), true), None);
  }

  #[rxflow_macro::test]
  fn from_fn_is_not_evaluated_after_cancel() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    let source = from_fn(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Some(1)
    });
    assert_eq!(record(source, true), None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let counter = calls.clone();
    let source = from_fn(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Some(1)
    });
    assert_eq!(record(source, false), Some(SignalKind::Success));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[rxflow_macro::test]
  fn from_fn_converts_options_and_results() {
    assert_eq!(record(from_fn(|| Some(4)), false), Some(SignalKind::Success));
    assert_eq!(record(from_fn(|| None::<i32>), false), Some(SignalKind::Complete));
    assert_eq!(
      record(from_fn(|| -> Result<Option<i32>> { Err(FlowError::msg("no")) }), false),
      Some(SignalKind::Failure)
    );
  }

  #[rxflow_macro::test]
  fn subject_delivers_later_or_replays() {
    let subject = MaybeSubject::new();
    let record = Arc::new(Mutex::new(Record::default()));
    subject.clone().subscribe(Recorder(record.clone(), false));
    assert!(subject.has_observer());
    assert!(record.lock().signal.is_none());
    assert!(subject.complete());
    assert!(!subject.success(1));
    assert_eq!(record.lock().signal, Some(SignalKind::Complete));

    let early = MaybeSubject::new();
    early.success(5);
    assert_eq!(record_subject(early), Some(SignalKind::Success));
  }

  fn record_subject(subject: MaybeSubject<i32>) -> Option<SignalKind> { record(subject, false) }

  #[rxflow_macro::test]
  fn subject_refuses_second_observer() {
    let subject = MaybeSubject::<i32>::new();
    subject.clone().subscribe(Recorder(Arc::new(Mutex::new(Record::default())), false));
    assert_eq!(record(subject, false), Some(SignalKind::Failure));
  }

  #[rxflow_macro::test]
  fn subject_cancel_drops_observer() {
    let subject = MaybeSubject::<i32>::new();
    let record = Arc::new(Mutex::new(Record::default()));
    subject.clone().subscribe(Recorder(record.clone(), true));
    assert!(subject.is_cancelled());
    assert!(!subject.has_observer());
    subject.success(1);
    assert!(record.lock().signal.is_none());
  }
}
