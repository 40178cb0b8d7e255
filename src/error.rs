//! Error taxonomy for skip list operations.
//!
//! Three families of failure exist and none of them is transient: CAS races
//! are always retried inside the operation and never reach the caller.
//!
//! 1. Precondition violations ([`Error::EmptyKey`]), detected before any
//!    mutation is attempted.
//! 2. Range construction and range membership ([`Error::InvertedRange`],
//!    [`Error::KeyOutOfRange`]).
//! 3. Iterator cursor misuse ([`Error::Exhausted`], [`Error::NoLastReturned`]).

use thiserror::Error;

/// Result alias used by every fallible skip list operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`SkipList`](crate::SkipList), its range views and iterators.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The key was empty. Empty byte strings are reserved for the head sentinel.
    #[error("empty keys are not supported")]
    EmptyKey,

    /// A range was requested whose lower bound sorts after its upper bound.
    #[error("inconsistent range: from key sorts after to key")]
    InvertedRange,

    /// A key outside a range view's bounds was passed to that view.
    #[error("key out of range")]
    KeyOutOfRange,

    /// `next_entry` was called on an iterator with nothing buffered.
    #[error("iterator has no next entry")]
    Exhausted,

    /// `remove` was called before any entry was returned, or twice in a row.
    #[error("no entry returned since the last removal")]
    NoLastReturned,
}

/// Reject empty keys before any search or mutation starts.
#[inline]
pub(crate) const fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        Err(Error::EmptyKey)
    } else {
        Ok(())
    }
}
