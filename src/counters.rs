//! Global debug counters.
//!
//! Incremented with relaxed ordering on the slow paths only (retries, helped
//! deletions, head resizing). Stress tests read them to report how much
//! contention a run actually produced.

use std::sync::atomic::AtomicUsize;

use crate::ordering::RELAXED;

/// Operation restarts caused by a lost CAS or a concurrent structural change.
pub static RETRY_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Physical splices completed by a thread other than the remover.
pub static HELP_DELETE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Stale index entries unlinked during traversal.
pub static INDEX_UNLINK_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Successful head growths.
pub static HEAD_GROW_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Successful head reductions (not backed out).
pub static HEAD_REDUCE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Index insertions abandoned because the node was deleted mid-splice.
pub static INDEX_ABORT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Snapshot of every debug counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugCounters {
    /// See [`RETRY_COUNT`].
    pub retries: usize,
    /// See [`HELP_DELETE_COUNT`].
    pub helped_deletes: usize,
    /// See [`INDEX_UNLINK_COUNT`].
    pub index_unlinks: usize,
    /// See [`HEAD_GROW_COUNT`].
    pub head_grows: usize,
    /// See [`HEAD_REDUCE_COUNT`].
    pub head_reductions: usize,
    /// See [`INDEX_ABORT_COUNT`].
    pub index_aborts: usize,
}

#[inline(always)]
pub(crate) fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, RELAXED);
}

/// Read all counters.
#[must_use]
pub fn get_debug_counters() -> DebugCounters {
    DebugCounters {
        retries: RETRY_COUNT.load(RELAXED),
        helped_deletes: HELP_DELETE_COUNT.load(RELAXED),
        index_unlinks: INDEX_UNLINK_COUNT.load(RELAXED),
        head_grows: HEAD_GROW_COUNT.load(RELAXED),
        head_reductions: HEAD_REDUCE_COUNT.load(RELAXED),
        index_aborts: INDEX_ABORT_COUNT.load(RELAXED),
    }
}

/// Reset all counters to zero.
pub fn reset_debug_counters() {
    for counter in [
        &RETRY_COUNT,
        &HELP_DELETE_COUNT,
        &INDEX_UNLINK_COUNT,
        &HEAD_GROW_COUNT,
        &HEAD_REDUCE_COUNT,
        &INDEX_ABORT_COUNT,
    ] {
        counter.store(0, RELAXED);
    }
}
