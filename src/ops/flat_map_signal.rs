//! FlatMapSignal operator
//!
//! Routes the single [`Signal`] of a [`MaybeSource`] to one of three handlers
//! and relays the continuation flow that handler builds.
//!
//! Behavior summary:
//! - Exactly one handler runs, synchronously, on the context that delivered
//!   the signal.
//! - The continuation's elements, completion and error are relayed verbatim.
//!   An error from the continuation is never routed into `on_error`.
//! - A failing handler (`Err`, or `Ok(None)` reported as
//!   [`FlowError::MissingContinuation`]) fails the outer consumer directly.
//! - Demand requested before the continuation is subscribed is kept and
//!   forwarded to the continuation in one request.
//! - Cancelling before the signal arrives means no handler runs; cancelling
//!   while a handler runs means its continuation is never subscribed.
//!
//! ```rust
//! use rxflow::{prelude::*, testing::TestSubscriber};
//!
//! let (downstream, probe) = TestSubscriber::unbounded();
//! maybe::empty::<i32>()
//!   .flat_map_signal(
//!     |v| Ok(Some(publisher::from_iter(vec![v]).boxed())),
//!     |_| Ok(Some(publisher::from_iter(vec![-1]).boxed())),
//!     || Ok(Some(publisher::from_iter(vec![0]).boxed())),
//!   )
//!   .subscribe(downstream);
//!
//! assert_eq!(probe.values(), vec![0]);
//! ```

use std::{
  marker::PhantomData,
  sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
  error::{FlowError, Result},
  maybe::{MaybeObserver, MaybeSource, Signal},
  publisher::Publisher,
  subscriber::Subscriber,
  subscription::{Subscription, SubscriptionRef},
};

/// FlatMapSignal operator, created by
/// [`flat_map_signal`](crate::maybe::MaybeSourceExt::flat_map_signal).
#[derive(Clone)]
pub struct FlatMapSignal<M, P, FS, FE, FC> {
  source: M,
  on_success: FS,
  on_error: FE,
  on_complete: FC,
  _continuation: PhantomData<fn() -> P>,
}

impl<M, P, FS, FE, FC> FlatMapSignal<M, P, FS, FE, FC> {
  pub(crate) fn new(source: M, on_success: FS, on_error: FE, on_complete: FC) -> Self {
    FlatMapSignal { source, on_success, on_error, on_complete, _continuation: PhantomData }
  }
}

impl<M, P, R, FS, FE, FC> Publisher<R> for FlatMapSignal<M, P, FS, FE, FC>
where
  M: MaybeSource,
  P: Publisher<R>,
  R: 'static,
  FS: FnOnce(M::Item) -> Result<Option<P>> + Send + 'static,
  FE: FnOnce(FlowError) -> Result<Option<P>> + Send + 'static,
  FC: FnOnce() -> Result<Option<P>> + Send + 'static,
{
  fn subscribe<O>(self, downstream: O)
  where
    O: Subscriber<R> + Send + 'static,
  {
    let router = SignalRouter {
      downstream,
      shared: Arc::new(RouterShared::new()),
      on_success: self.on_success,
      on_error: self.on_error,
      on_complete: self.on_complete,
      _item: PhantomData,
    };
    self.source.subscribe(router);
  }
}

// ============================================================================
// TerminalLink
// ============================================================================

enum Slot {
  Empty,
  Source(SubscriptionRef),
  Continuation(SubscriptionRef),
  Cancelled,
}

struct LinkState {
  slot: Slot,
  // demand received before the continuation's subscription arrived
  pending: u64,
}

/// The currently live upstream subscription: first the source's, then the
/// continuation's.
///
/// Critical sections only swap the slot; subscriptions are always invoked
/// after the lock is released.
struct TerminalLink(Mutex<LinkState>);

impl TerminalLink {
  fn new() -> Self { TerminalLink(Mutex::new(LinkState { slot: Slot::Empty, pending: 0 })) }

  /// Returns `false` (and cancels `subscription`) if a link was installed or
  /// cancelled before.
  fn install_source(&self, subscription: SubscriptionRef) -> bool {
    {
      let mut state = self.0.lock();
      if matches!(state.slot, Slot::Empty) {
        state.slot = Slot::Source(subscription);
        return true;
      }
    }
    subscription.cancel();
    false
  }

  /// Replaces the spent source link and hands over the accumulated demand.
  fn install_continuation(&self, subscription: SubscriptionRef) {
    let pending = {
      let mut state = self.0.lock();
      match state.slot {
        Slot::Cancelled | Slot::Continuation(_) => None,
        Slot::Empty | Slot::Source(_) => {
          state.slot = Slot::Continuation(subscription.clone());
          Some(std::mem::take(&mut state.pending))
        }
      }
    };
    match pending {
      None => {
        trace!("continuation cancelled on arrival");
        subscription.cancel();
      }
      Some(0) => {}
      Some(n) => subscription.request(n),
    }
  }

  fn request(&self, n: u64) {
    if n == 0 {
      return;
    }
    let target = {
      let mut state = self.0.lock();
      match &state.slot {
        Slot::Continuation(subscription) => Some(subscription.clone()),
        Slot::Cancelled => None,
        Slot::Empty | Slot::Source(_) => {
          state.pending = state.pending.saturating_add(n);
          None
        }
      }
    };
    if let Some(subscription) = target {
      subscription.request(n);
    }
  }

  fn cancel(&self) {
    let previous = std::mem::replace(&mut self.0.lock().slot, Slot::Cancelled);
    if let Slot::Source(subscription) | Slot::Continuation(subscription) = previous {
      subscription.cancel();
    }
  }
}

// ============================================================================
// Router state
// ============================================================================

const AWAITING_SIGNAL: u8 = 0;
const ROUTED: u8 = 1;
const DONE: u8 = 2;

/// State shared by the router, the relay and the outer consumer's handle.
struct RouterShared {
  state: AtomicU8,
  link: TerminalLink,
}

impl RouterShared {
  fn new() -> Self { RouterShared { state: AtomicU8::new(AWAITING_SIGNAL), link: TerminalLink::new() } }

  /// Wins the `AwaitingSignal -> Routed` transition at most once.
  fn route(&self) -> bool {
    self
      .state
      .compare_exchange(AWAITING_SIGNAL, ROUTED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Moves to `Done`. Only the first caller gets `true` and may deliver a
  /// terminal signal.
  fn finish(&self) -> bool { self.state.swap(DONE, Ordering::AcqRel) != DONE }

  fn is_done(&self) -> bool { self.state.load(Ordering::Acquire) == DONE }
}

impl Subscription for RouterShared {
  fn request(&self, n: u64) { self.link.request(n); }

  fn cancel(&self) {
    if self.finish() {
      trace!("signal router cancelled");
    }
    self.link.cancel();
  }
}

// ============================================================================
// SignalRouter
// ============================================================================

/// Observes the optional-value source and dispatches its signal.
pub struct SignalRouter<O, FS, FE, FC, R> {
  downstream: O,
  shared: Arc<RouterShared>,
  on_success: FS,
  on_error: FE,
  on_complete: FC,
  _item: PhantomData<fn() -> R>,
}

fn fail<R, O: Subscriber<R>>(downstream: O, shared: &RouterShared, err: FlowError) {
  if shared.finish() {
    debug!(error = %err, "signal handler failed");
    downstream.error(err);
  } else {
    trace!(error = %err, "handler failure dropped: router already done");
  }
}

impl<T, P, R, O, FS, FE, FC> MaybeObserver<T> for SignalRouter<O, FS, FE, FC, R>
where
  O: Subscriber<R> + Send + 'static,
  P: Publisher<R>,
  R: 'static,
  FS: FnOnce(T) -> Result<Option<P>>,
  FE: FnOnce(FlowError) -> Result<Option<P>>,
  FC: FnOnce() -> Result<Option<P>>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    if self.shared.link.install_source(subscription) {
      self.downstream.on_subscribe(self.shared.clone());
    } else {
      debug!("source subscription refused: router already linked");
    }
  }

  fn on_signal(self, signal: Signal<T>) {
    let SignalRouter { downstream, shared, on_success, on_error, on_complete, .. } = self;
    let kind = signal.kind();
    if !shared.route() {
      trace!(signal = %kind, "signal dropped: router cancelled");
      return;
    }
    trace!(signal = %kind, "routing signal");

    let continuation = match signal {
      Signal::Success(value) => on_success(value),
      Signal::Failure(err) => on_error(err),
      Signal::Complete => on_complete(),
    };
    let continuation = match continuation {
      Ok(Some(continuation)) => continuation,
      Ok(None) => return fail(downstream, &shared, FlowError::MissingContinuation { signal: kind }),
      Err(err) => return fail(downstream, &shared, err),
    };
    if shared.is_done() {
      trace!(signal = %kind, "continuation dropped: router cancelled while the handler ran");
      return;
    }
    continuation.subscribe(ContinuationRelay { downstream, shared });
  }
}

// ============================================================================
// ContinuationRelay
// ============================================================================

/// Relays the continuation flow to the outer consumer.
struct ContinuationRelay<O> {
  downstream: O,
  shared: Arc<RouterShared>,
}

impl<R, O: Subscriber<R>> Subscriber<R> for ContinuationRelay<O> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.shared.link.install_continuation(subscription);
  }

  fn next(&mut self, value: R) {
    if !self.shared.is_done() {
      self.downstream.next(value);
    }
  }

  fn error(self, err: FlowError) {
    if self.shared.finish() {
      self.downstream.error(err);
    } else {
      trace!(error = %err, "continuation error dropped: router already done");
    }
  }

  fn complete(self) {
    if self.shared.finish() {
      self.downstream.complete();
    } else {
      trace!("continuation completion dropped: router already done");
    }
  }
}
