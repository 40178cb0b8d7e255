//! Standard memory orderings for concurrent node access.
//!
//! These constants keep ordering usage consistent across the engine and make
//! the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading `next`, `right` and value slots during traversal.
/// Pairs with the `Release` half of a successful CAS.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for initialising a link in a node that is not yet published.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for CAS success (value swap, splice, link, head swap).
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only need to see the current value.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for counters that carry no synchronisation (size, link counts on
/// the increment side, debug statistics).
pub const RELAXED: Ordering = Ordering::Relaxed;
