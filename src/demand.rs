//! Demand accounting and the drain guard shared by every producer.
//!
//! `Demand` is the outstanding request count of one consumer. It saturates at
//! [`UNBOUNDED`], which then sticks: an unbounded consumer never has demand
//! subtracted again.
//!
//! `WorkInProgress` serialises emission. Whoever moves the counter off zero
//! owns the drain loop; everyone else only records that another pass is
//! needed. A `request` issued from inside `next` therefore never recurses into
//! the producer.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Demand value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

#[derive(Debug, Default)]
pub struct Demand(AtomicU64);

impl Demand {
  pub fn new() -> Self { Self::default() }

  /// Adds `n` to the outstanding demand and returns the previous value.
  pub fn add(&self, n: u64) -> u64 {
    self
      .0
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        (current != UNBOUNDED).then(|| current.saturating_add(n))
      })
      .unwrap_or_else(|previous| previous)
  }

  /// Records `n` deliveries and returns the remaining demand.
  pub fn produced(&self, n: u64) -> u64 {
    match self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
      (current != UNBOUNDED).then(|| current.saturating_sub(n))
    }) {
      Ok(previous) => previous.saturating_sub(n),
      Err(_) => UNBOUNDED,
    }
  }

  pub fn get(&self) -> u64 { self.0.load(Ordering::Acquire) }

  pub fn is_unbounded(&self) -> bool { self.get() == UNBOUNDED }
}

#[derive(Debug, Default)]
pub struct WorkInProgress(AtomicUsize);

impl WorkInProgress {
  pub fn new() -> Self { Self::default() }

  /// Returns `true` when the caller became the drainer.
  pub fn enter(&self) -> bool { self.0.fetch_add(1, Ordering::AcqRel) == 0 }

  /// Acknowledges `missed` passes. A non-zero result means more work arrived
  /// meanwhile and the drainer must loop again with the returned value.
  pub fn leave(&self, missed: usize) -> usize { self.0.fetch_sub(missed, Ordering::AcqRel) - missed }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn demand_accumulates_and_drains() {
    let demand = Demand::new();
    assert_eq!(demand.add(3), 0);
    assert_eq!(demand.add(2), 3);
    assert_eq!(demand.produced(4), 1);
    assert_eq!(demand.get(), 1);
  }

  #[rxflow_macro::test]
  fn demand_saturates_instead_of_overflowing() {
    let demand = Demand::new();
    demand.add(u64::MAX - 1);
    demand.add(10);
    assert!(demand.is_unbounded());
    assert_eq!(demand.produced(1_000), UNBOUNDED);
    assert_eq!(demand.add(5), UNBOUNDED);
  }

  #[rxflow_macro::test]
  fn demand_never_goes_negative() {
    let demand = Demand::new();
    demand.add(1);
    assert_eq!(demand.produced(5), 0);
    assert_eq!(demand.get(), 0);
  }

  #[rxflow_macro::test]
  fn only_first_entrant_drains() {
    let wip = WorkInProgress::new();
    assert!(wip.enter());
    assert!(!wip.enter());
    assert!(!wip.enter());
    // two passes were missed while draining
    let missed = wip.leave(1);
    assert_eq!(missed, 2);
    assert_eq!(wip.leave(missed), 0);
    assert!(wip.enter());
  }
}
