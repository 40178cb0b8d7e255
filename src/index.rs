//! Index entries: the sparse fast lanes above the data chain.
//!
//! An [`Index`] at level `L` references one data node and links rightward to
//! the next index at the same level. Data-node indexes live in the node's
//! tower (see [`Node::tower_index`]); head indexes are separate allocations
//! whose node is the base sentinel.
//!
//! # Freezing
//!
//! Before an index is unlinked, the low bit of its own `right` pointer is set.
//! A frozen `right` never changes again, so:
//!
//! - nothing can be linked after an index that is being removed,
//! - the successor of an index being removed cannot be unlinked through it,
//! - a traversal that reads a frozen `right` knows its position is stale and
//!   restarts from the head.
//!
//! Only indexes of logically deleted nodes are ever frozen, so head indexes
//! never are.

use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use seize::LocalGuard;

use crate::counters::{INDEX_UNLINK_COUNT, bump};
use crate::node::Node;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, WRITE_ORD};
use crate::tracing_helpers::trace_log;

const FROZEN_TAG: usize = 1;

/// True if `right` carries the freeze tag.
#[inline(always)]
pub(crate) fn is_frozen<V>(right: *mut Index<V>) -> bool {
    right.addr() & FROZEN_TAG != 0
}

/// Strip the freeze tag.
#[inline(always)]
pub(crate) fn untagged<V>(right: *mut Index<V>) -> *mut Index<V> {
    right.map_addr(|addr| addr & !FROZEN_TAG)
}

#[inline(always)]
fn frozen<V>(right: *mut Index<V>) -> *mut Index<V> {
    right.map_addr(|addr| addr | FROZEN_TAG)
}

/// One fast-lane entry.
pub(crate) struct Index<V> {
    /// Referenced node. Never owning.
    node: *mut Node<V>,

    /// Same node one level lower (null at level 1). Fixed after wiring.
    down: *mut Index<V>,

    /// Next index at this level, possibly carrying the freeze tag.
    right: AtomicPtr<Index<V>>,

    level: usize,
}

impl<V> Index<V> {
    /// Tower slot for `level`, wired to its node by [`Index::wire`] once the
    /// node has an address.
    pub(crate) const fn unwired(level: usize) -> Self {
        Self {
            node: StdPtr::null_mut(),
            down: StdPtr::null_mut(),
            right: AtomicPtr::new(StdPtr::null_mut()),
            level,
        }
    }

    pub(crate) const fn wire(&mut self, node: *mut Node<V>, down: *mut Self) {
        self.node = node;
        self.down = down;
    }

    /// Head index at `level` over the base node, with no right neighbour.
    pub(crate) fn new_head(base: *mut Node<V>, down: *mut Self, level: usize) -> Box<Self> {
        Box::new(Self {
            node: base,
            down,
            right: AtomicPtr::new(StdPtr::null_mut()),
            level,
        })
    }

    #[inline(always)]
    pub(crate) const fn node_ptr(&self) -> *mut Node<V> {
        self.node
    }

    #[inline(always)]
    pub(crate) fn node(&self) -> &Node<V> {
        // SAFETY: an index never outlives its node. Tower indexes are part of
        // the node's allocation; head indexes point at the base node, which
        // lives as long as the list.
        unsafe { &*self.node }
    }

    #[inline(always)]
    pub(crate) const fn down(&self) -> *mut Self {
        self.down
    }

    /// Level of this index. Kept for head indexes, informational elsewhere.
    #[inline(always)]
    pub(crate) const fn level(&self) -> usize {
        self.level
    }

    /// Raw `right`, freeze tag included.
    #[inline(always)]
    pub(crate) fn load_right(&self) -> *mut Self {
        self.right.load(READ_ORD)
    }

    /// True once the referenced node is logically deleted.
    #[inline(always)]
    pub(crate) fn indexes_deleted_node(&self) -> bool {
        self.node().is_deleted()
    }

    /// Splice `new` between `self` and `succ`.
    ///
    /// Fails if `self` indexes a deleted node, or if `self.right` is no longer
    /// exactly `succ` (which includes `self` being frozen).
    ///
    /// # Safety
    ///
    /// `new` must be a valid index that is not linked at any level yet.
    pub(crate) unsafe fn link(&self, succ: *mut Self, new: *mut Self) -> bool {
        // SAFETY: caller guarantees `new` is valid and unpublished.
        unsafe { (*new).right.store(succ, WRITE_ORD) };

        !self.indexes_deleted_node()
            && self
                .right
                .compare_exchange(succ, new, CAS_SUCCESS, CAS_FAILURE)
                .is_ok()
    }

    /// Remove the stale successor `succ` from this level.
    ///
    /// Freezes `succ.right` first, then swings `self.right` past it. On
    /// success the structural link `succ` held on its node is released.
    ///
    /// # Safety
    ///
    /// `succ` must have been read from `self.right` under `guard` and must
    /// index a logically deleted node.
    pub(crate) unsafe fn unlink(&self, succ: *mut Self, guard: &LocalGuard<'_>) -> bool {
        if self.indexes_deleted_node() {
            return false;
        }

        // SAFETY: caller guarantees `succ` was reachable under `guard`.
        let succ_ref: &Self = unsafe { &*succ };

        let mut after: *mut Self = succ_ref.load_right();
        while !is_frozen(after) {
            match succ_ref.right.compare_exchange_weak(
                after,
                frozen(after),
                CAS_SUCCESS,
                CAS_FAILURE,
            ) {
                Ok(_) => break,
                Err(current) => after = current,
            }
        }
        let after: *mut Self = untagged(after);

        if self
            .right
            .compare_exchange(succ, after, CAS_SUCCESS, CAS_FAILURE)
            .is_err()
        {
            return false;
        }

        bump(&INDEX_UNLINK_COUNT);
        trace_log!(level = succ_ref.level, key = ?succ_ref.node().key(), "unlinked stale index");

        // SAFETY: `succ` is off this level for good; its link on the node is ours.
        unsafe { Node::release_link(succ_ref.node, guard) };
        true
    }
}
