//! IntoStream Operator
//!
//! Converts a [`Publisher`] into a [`futures::Stream`], so a flow can be
//! consumed with `while let` loops in async code.
//!
//! The stream keeps at most `prefetch` elements requested ahead of the poller
//! and tops the demand up in batches as elements are polled. Dropping the
//! stream cancels the subscription.
//!
//! # Example
//!
//! ```rust
//! use futures::StreamExt;
//! use rxflow::prelude::*;
//!
//! # async fn example() {
//! let mut stream = publisher::from_iter(vec![1, 2]).into_stream();
//!
//! while let Some(Ok(value)) = stream.next().await {
//!   println!("Received: {}", value);
//! }
//! # }
//! ```

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::Arc,
  task::{Context as AsyncContext, Poll},
};

use futures::{task::AtomicWaker, Stream};
use parking_lot::Mutex;

use crate::{
  demand::UNBOUNDED,
  error::{FlowError, Result},
  publisher::Publisher,
  subscriber::Subscriber,
  subscription::{SubscriptionGuard, SubscriptionRef},
};

/// Demand kept outstanding by [`into_stream`](crate::publisher::PublisherExt::into_stream).
pub const DEFAULT_PREFETCH: u64 = 16;

struct StreamQueue<T> {
  items: VecDeque<Result<T>>,
  closed: bool,
}

/// State shared between the subscriber and the stream.
struct StreamShared<T> {
  queue: Mutex<StreamQueue<T>>,
  waker: AtomicWaker,
  subscription: Mutex<Option<SubscriptionGuard>>,
}

impl<T> StreamShared<T> {
  fn push(&self, item: Option<Result<T>>) {
    {
      let mut queue = self.queue.lock();
      match item {
        Some(Ok(value)) => queue.items.push_back(Ok(value)),
        Some(Err(err)) => {
          queue.items.push_back(Err(err));
          queue.closed = true;
        }
        None => queue.closed = true,
      }
    }
    self.waker.wake();
  }

  fn request(&self, n: u64) {
    let subscription = self.subscription.lock().as_ref().map(|g| g.subscription().clone());
    if let Some(subscription) = subscription {
      subscription.request(n);
    }
  }
}

/// A `Stream` that yields the elements of a [`Publisher`].
///
/// - `Ok(T)` for each element.
/// - `Err(FlowError)` when the publisher fails, followed by `None`.
/// - `None` once the publisher completed.
pub struct IntoStream<T> {
  shared: Arc<StreamShared<T>>,
  limit: u64,
  consumed: u64,
}

impl<T: Send + 'static> IntoStream<T> {
  /// Subscribes to `publisher` right away and requests `prefetch` elements.
  /// A `prefetch` of 0 is treated as 1.
  pub fn new<P>(publisher: P, prefetch: u64) -> Self
  where
    P: Publisher<T>,
  {
    let prefetch = prefetch.max(1);
    let shared = Arc::new(StreamShared {
      queue: Mutex::new(StreamQueue { items: VecDeque::new(), closed: false }),
      waker: AtomicWaker::new(),
      subscription: Mutex::new(None),
    });
    publisher.subscribe(IntoStreamSubscriber { shared: shared.clone(), prefetch });
    let limit = if prefetch == UNBOUNDED { UNBOUNDED } else { prefetch - prefetch / 4 };
    IntoStream { shared, limit, consumed: 0 }
  }
}

impl<T> IntoStream<T> {
  fn replenish(&mut self) {
    if self.limit == UNBOUNDED {
      return;
    }
    self.consumed += 1;
    if self.consumed == self.limit {
      self.consumed = 0;
      self.shared.request(self.limit);
    }
  }
}

impl<T> Stream for IntoStream<T> {
  type Item = Result<T>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut AsyncContext<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    // Registered before looking at the queue so a concurrent push can't be
    // missed.
    this.shared.waker.register(cx.waker());

    let item = {
      let mut queue = this.shared.queue.lock();
      match queue.items.pop_front() {
        Some(item) => item,
        None if queue.closed => return Poll::Ready(None),
        None => return Poll::Pending,
      }
    };
    if item.is_ok() {
      this.replenish();
    }
    Poll::Ready(Some(item))
  }
}

impl<T> Drop for IntoStream<T> {
  fn drop(&mut self) {
    let guard = self.shared.subscription.lock().take();
    drop(guard);
  }
}

/// Forwards a publisher's signals into the shared queue.
struct IntoStreamSubscriber<T> {
  shared: Arc<StreamShared<T>>,
  prefetch: u64,
}

impl<T> Subscriber<T> for IntoStreamSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    *self.shared.subscription.lock() = Some(SubscriptionGuard::new(subscription.clone()));
    subscription.request(self.prefetch);
  }

  fn next(&mut self, value: T) { self.shared.push(Some(Ok(value))); }

  fn error(self, err: FlowError) { self.shared.push(Some(Err(err))); }

  fn complete(self) { self.shared.push(None); }
}
