//! # rxflow: backpressured windowing and signal routing
//!
//! Demand-driven flows in the reactive-streams style: a consumer receives a
//! [`Subscription`] first, then never more elements than it requested, then
//! at most one terminal signal.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxflow::{prelude::*, testing::{collect_window, TestSubscriber}};
//!
//! let (windows, probe) = TestSubscriber::unbounded();
//! publisher::from_iter(vec!["a", "b", "|", "c"])
//!   .window_by(WindowBoundary::Split, |v: &&str| Ok(*v == "|"))
//!   .subscribe(windows);
//!
//! let parts: Vec<Vec<&str>> = probe.values().into_iter().map(collect_window).collect();
//! assert_eq!(parts, vec![vec!["a", "b"], vec!["c"]]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | A demand-driven source of elements |
//! | [`Subscriber`] | Consumes `next`, `error`, and `complete` signals |
//! | [`Subscription`] | Requests more elements or cancels |
//! | [`Window`] | One sub-flow produced by [`window_by`] |
//! | [`MaybeSource`] | A source of exactly one [`Signal`], input of [`flat_map_signal`] |
//!
//! ## Logging
//!
//! Lifecycle events (windows opened and closed, routing decisions, dropped
//! late signals) are reported through `tracing` at `trace` and `debug`
//! level. Installing a subscriber is up to the application.
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`Window`]: window_sink::Window
//! [`window_by`]: publisher::PublisherExt::window_by
//! [`MaybeSource`]: maybe::MaybeSource
//! [`Signal`]: maybe::Signal
//! [`flat_map_signal`]: maybe::MaybeSourceExt::flat_map_signal

pub mod demand;
pub mod error;
pub mod maybe;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub mod subscriber;
pub mod subscription;
pub mod testing;
pub mod window_sink;

// Re-export the prelude module
pub use prelude::*;
