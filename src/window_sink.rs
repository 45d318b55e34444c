//! WindowSink: a single-consumer buffered relay
//!
//! [`create`] returns the two halves of one window. The push half
//! ([`WindowPush`]) is driven by the producer; the pull half ([`Window`]) is a
//! [`Publisher`] that admits exactly one subscriber and delivers the buffered
//! elements according to that subscriber's demand.
//!
//! The capacity hint pre-sizes the buffer, up to [`DEFAULT_CAPACITY_HINT`]
//! elements, and sets the saturation mark. Pushing past it still buffers
//! the element; [`WindowPush::is_saturated`] lets a producer that can slow
//! down find out that it should.
//!
//! ```
//! use rxflow::{prelude::*, testing::TestSubscriber, window_sink};
//!
//! let (push, window) = window_sink::create(4);
//! push.emit(1);
//! push.emit(2);
//! push.finish();
//!
//! let (subscriber, probe) = TestSubscriber::new(1);
//! window.subscribe(subscriber);
//! assert_eq!(probe.values(), vec![1]);
//! probe.request(1);
//! assert_eq!(probe.values(), vec![1, 2]);
//! assert!(probe.is_completed());
//! ```

use std::{
  collections::VecDeque,
  fmt::{Debug, Display, Formatter},
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
  demand::{Demand, WorkInProgress},
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{EmptySubscription, Subscription},
};

/// Capacity hint used when none is configured.
pub const DEFAULT_CAPACITY_HINT: usize = 128;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique identity of a window. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(u64);

impl WindowId {
  fn next() -> Self { WindowId(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed)) }

  pub fn get(self) -> u64 { self.0 }
}

impl Display for WindowId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "w{}", self.0) }
}

/// Creates the push and pull halves of a new window.
///
/// # Panics
///
/// Panics if `capacity_hint` is 0.
pub fn create<T>(capacity_hint: usize) -> (WindowPush<T>, Window<T>) {
  assert!(capacity_hint > 0, "window_sink: capacity hint must be positive");
  let core = Arc::new(SinkCore {
    id: WindowId::next(),
    capacity_hint,
    buffer: Mutex::new(SinkBuffer {
      // never pre-size past the default: the hint may be huge
      queue: VecDeque::with_capacity(capacity_hint.min(DEFAULT_CAPACITY_HINT)),
      terminated: false,
      terminal: None,
    }),
    subscriber: Mutex::new(None),
    attached: AtomicBool::new(false),
    cancelled: AtomicBool::new(false),
    demand: Demand::new(),
    wip: WorkInProgress::new(),
  });
  (WindowPush(core.clone()), Window(core))
}

// ============================================================================
// Shared core
// ============================================================================

enum Terminal {
  Completed,
  Failed(FlowError),
}

struct SinkBuffer<T> {
  queue: VecDeque<T>,
  terminated: bool,
  terminal: Option<Terminal>,
}

struct SinkCore<T> {
  id: WindowId,
  capacity_hint: usize,
  buffer: Mutex<SinkBuffer<T>>,
  // Only the drainer locks this while delivering; `request` and `cancel` never
  // touch it, so a subscriber may call them from inside `next`.
  subscriber: Mutex<Option<BoxedSubscriber<T>>>,
  attached: AtomicBool,
  cancelled: AtomicBool,
  demand: Demand,
  wip: WorkInProgress,
}

impl<T> SinkCore<T> {
  fn terminate(&self, terminal: Terminal) -> bool {
    {
      let mut buffer = self.buffer.lock();
      if buffer.terminated {
        return false;
      }
      buffer.terminated = true;
      buffer.terminal = Some(terminal);
    }
    self.drain();
    true
  }

  fn drain(&self) {
    if !self.wip.enter() {
      return;
    }
    let mut missed = 1;
    loop {
      if self.cancelled.load(Ordering::Acquire) {
        self.discard();
      } else {
        self.deliver();
      }
      missed = self.wip.leave(missed);
      if missed == 0 {
        break;
      }
    }
  }

  fn discard(&self) {
    self.buffer.lock().queue.clear();
    self.subscriber.lock().take();
  }

  fn deliver(&self) {
    let mut slot = self.subscriber.lock();
    let Some(subscriber) = slot.as_mut() else {
      return;
    };

    let requested = self.demand.get();
    let mut emitted = 0;
    while emitted != requested {
      if self.cancelled.load(Ordering::Acquire) {
        drop(slot);
        self.discard();
        return;
      }
      let next = self.buffer.lock().queue.pop_front();
      match next {
        Some(value) => {
          subscriber.next(value);
          emitted += 1;
        }
        None => break,
      }
    }
    if emitted != 0 {
      self.demand.produced(emitted);
    }

    if self.cancelled.load(Ordering::Acquire) {
      drop(slot);
      self.discard();
      return;
    }
    let terminal = {
      let mut buffer = self.buffer.lock();
      if buffer.queue.is_empty() { buffer.terminal.take() } else { None }
    };
    if let Some(terminal) = terminal {
      let Some(subscriber) = slot.take() else { return };
      drop(slot);
      match terminal {
        Terminal::Completed => {
          trace!(window = %self.id, "window completed");
          subscriber.complete();
        }
        Terminal::Failed(err) => {
          trace!(window = %self.id, error = %err, "window failed");
          subscriber.error(err);
        }
      }
    }
  }
}

impl<T: Send> Subscription for SinkCore<T> {
  fn request(&self, n: u64) {
    if n == 0 {
      return;
    }
    self.demand.add(n);
    self.drain();
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      trace!(window = %self.id, "window cancelled by its consumer");
      self.drain();
    }
  }
}

// ============================================================================
// Push half
// ============================================================================

/// The producer-facing half of a window.
pub struct WindowPush<T>(Arc<SinkCore<T>>);

impl<T> WindowPush<T> {
  pub fn id(&self) -> WindowId { self.0.id }

  /// Buffers `value` for the consumer. Dropped once the window terminated or
  /// its consumer cancelled.
  pub fn emit(&self, value: T) {
    let core = &self.0;
    {
      let mut buffer = core.buffer.lock();
      if buffer.terminated || core.cancelled.load(Ordering::Acquire) {
        trace!(window = %core.id, "element dropped: window closed");
        return;
      }
      if buffer.queue.len() == core.capacity_hint {
        debug!(window = %core.id, capacity_hint = core.capacity_hint, "window buffer exceeded its capacity hint");
      }
      buffer.queue.push_back(value);
    }
    core.drain();
  }

  /// Terminates the window with `err`, after the already buffered elements.
  /// Returns `false` if the window had already terminated.
  pub fn fail(&self, err: FlowError) -> bool { self.0.terminate(Terminal::Failed(err)) }

  /// Completes the window. Returns `false` if the window had already
  /// terminated.
  pub fn finish(&self) -> bool { self.0.terminate(Terminal::Completed) }

  /// `true` while the buffered element count is at or above the capacity
  /// hint.
  pub fn is_saturated(&self) -> bool { self.0.buffer.lock().queue.len() >= self.0.capacity_hint }

  pub fn is_cancelled(&self) -> bool { self.0.cancelled.load(Ordering::Acquire) }
}

impl<T> Debug for WindowPush<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WindowPush").field("id", &self.0.id).finish_non_exhaustive()
  }
}

// ============================================================================
// Pull half
// ============================================================================

/// The consumer-facing half of a window.
///
/// Cloning a `Window` clones the handle, not the contents: across all clones
/// only the first `subscribe` is accepted.
pub struct Window<T>(Arc<SinkCore<T>>);

impl<T> Window<T> {
  pub fn id(&self) -> WindowId { self.0.id }

  pub fn capacity_hint(&self) -> usize { self.0.capacity_hint }
}

impl<T> Clone for Window<T> {
  fn clone(&self) -> Self { Window(self.0.clone()) }
}

impl<T> Debug for Window<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Window").field("id", &self.0.id).finish_non_exhaustive()
  }
}

impl<T> Publisher<T> for Window<T>
where
  T: Send + 'static,
{
  fn subscribe<S>(self, mut subscriber: S)
  where
    S: Subscriber<T> + Send + 'static,
  {
    if self.0.attached.swap(true, Ordering::AcqRel) {
      debug!(window = %self.0.id, "second subscriber refused");
      subscriber.on_subscribe(EmptySubscription::shared());
      subscriber.error(FlowError::AlreadySubscribed);
      return;
    }
    subscriber.on_subscribe(self.0.clone());
    *self.0.subscriber.lock() = Some(Box::new(subscriber));
    self.0.drain();
  }
}
