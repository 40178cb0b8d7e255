//! Data-chain nodes.
//!
//! Every entry of the level-0 chain is a [`Node`]. Three kinds exist and the
//! kind is fixed at allocation:
//!
//! - [`NodeKind::Base`]: the single sentinel every search starts from. It has
//!   an empty key and is never deleted.
//! - [`NodeKind::Data`]: a key with a value slot. A null value slot means the
//!   node is logically deleted.
//! - [`NodeKind::Marker`]: appended after a deleted data node to announce that
//!   its physical splice is pending. A marker has no key or value, and its
//!   `next` never changes.
//!
//! # Deletion lifecycle
//!
//! ```text
//! live ──cas value→null──▶ deleted ──append marker──▶ marked ──splice pred──▶ unlinked
//! ```
//!
//! Each transition is a single CAS that any thread may attempt, and each is
//! idempotent: a lost CAS means someone else already made progress.
//!
//! # Structural link count
//!
//! A data node is referenced by the data chain (one link) and by every index
//! level it has been linked into (one link each). The thread that completes a
//! splice or an index unlink releases one link; the release that reaches zero
//! retires the node through the collector. The node's index tower and its
//! marker are freed together with it.

use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize};

use seize::{Guard, LocalGuard};

use crate::counters::{HELP_DELETE_COUNT, RETRY_COUNT, bump};
use crate::index::Index;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD};
use crate::reclaim::reclaim_node;
use crate::tracing_helpers::trace_log;

/// Tag distinguishing the three node roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// Head sentinel of the data chain.
    Base,
    /// Key/value entry.
    Data,
    /// Deletion marker following a logically deleted data node.
    Marker,
}

/// One entry of the data chain.
pub(crate) struct Node<V> {
    kind: NodeKind,

    /// Immutable key. Empty for base and marker nodes.
    key: Box<[u8]>,

    /// `Arc::into_raw` pointer, null once logically deleted.
    value: AtomicPtr<V>,

    next: AtomicPtr<Node<V>>,

    /// Structural references: data chain plus linked index levels.
    links: AtomicUsize,

    /// Index column, level 1 at position 0. Owned by the node.
    tower: Box<[Index<V>]>,
}

/// Take a new strong reference to a value slot's `Arc`.
///
/// # Safety
///
/// `v` must be a non-null pointer from `Arc::into_raw` that cannot be
/// reclaimed for the duration of the call (loaded under a live guard).
#[inline(always)]
pub(crate) unsafe fn clone_value<V>(v: *mut V) -> Arc<V> {
    let v: *const V = v.cast_const();
    // SAFETY: caller guarantees the Arc allocation is alive.
    unsafe {
        Arc::increment_strong_count(v);
        Arc::from_raw(v)
    }
}

/// Outcome of one validated step along the data chain.
pub(crate) enum Scan<V> {
    /// The predecessor has no successor.
    End,

    /// The chain changed under us, or a deletion had to be helped. The
    /// operation must restart from a fresh predecessor search.
    Restart,

    /// A live data successor `n`, its successor `f`, and the value `v` that was
    /// observed in `n` (never null).
    Next {
        n: *mut Node<V>,
        f: *mut Node<V>,
        v: *mut V,
    },
}

impl<V> Node<V> {
    // ========================================================================
    //  Construction
    // ========================================================================

    /// Allocate the base sentinel.
    pub(crate) fn new_base() -> Box<Self> {
        Box::new(Self {
            kind: NodeKind::Base,
            key: Box::default(),
            value: AtomicPtr::new(StdPtr::null_mut()),
            next: AtomicPtr::new(StdPtr::null_mut()),
            links: AtomicUsize::new(1),
            tower: Box::default(),
        })
    }

    /// Allocate an unpublished data node with a `height`-tall index column.
    ///
    /// The tower's back-pointers are wired after the node has its final
    /// address, so the returned pointer is ready to be spliced into the chain.
    pub(crate) fn new_data(key: &[u8], value: *mut V, next: *mut Self, height: usize) -> *mut Self {
        let tower: Box<[Index<V>]> = (1..=height).map(Index::unwired).collect();

        let node: *mut Self = Box::into_raw(Box::new(Self {
            kind: NodeKind::Data,
            key: key.into(),
            value: AtomicPtr::new(value),
            next: AtomicPtr::new(next),
            links: AtomicUsize::new(1),
            tower,
        }));

        // SAFETY: `node` was just allocated and is not shared yet, so we have
        // exclusive access to its tower.
        unsafe {
            let column: *mut Index<V> = (*node).tower.as_mut_ptr();
            for i in 0..height {
                let down: *mut Index<V> = if i == 0 {
                    StdPtr::null_mut()
                } else {
                    column.add(i - 1)
                };
                (*column.add(i)).wire(node, down);
            }
        }

        node
    }

    fn new_marker(next: *mut Self) -> *mut Self {
        Box::into_raw(Box::new(Self {
            kind: NodeKind::Marker,
            key: Box::default(),
            value: AtomicPtr::new(StdPtr::null_mut()),
            next: AtomicPtr::new(next),
            links: AtomicUsize::new(1),
            tower: Box::default(),
        }))
    }

    /// Free a data node whose insertion CAS failed, handing back its value.
    ///
    /// # Safety
    ///
    /// `node` must come from [`Node::new_data`] and must never have been
    /// published.
    pub(crate) unsafe fn discard_unpublished(node: *mut Self) -> *mut V {
        // SAFETY: caller guarantees exclusive ownership of an unpublished node.
        let node: Box<Self> = unsafe { Box::from_raw(node) };
        node.value.load(READ_ORD)
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    #[inline(always)]
    pub(crate) fn key(&self) -> &[u8] {
        &self.key
    }

    #[inline(always)]
    pub(crate) fn is_marker(&self) -> bool {
        self.kind == NodeKind::Marker
    }

    #[inline(always)]
    pub(crate) fn is_base(&self) -> bool {
        self.kind == NodeKind::Base
    }

    /// True for a data node whose value slot has been cleared.
    #[inline(always)]
    pub(crate) fn is_deleted(&self) -> bool {
        self.kind == NodeKind::Data && self.value.load(READ_ORD).is_null()
    }

    #[inline(always)]
    pub(crate) fn load_value(&self) -> *mut V {
        self.value.load(READ_ORD)
    }

    /// Clone the current value, `None` once deleted (and always for base and
    /// marker nodes).
    #[inline(always)]
    pub(crate) fn value_snapshot(&self, _guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        let v: *mut V = self.load_value();
        // SAFETY: loaded under `guard`, so even a retired value is still allocated.
        (!v.is_null()).then(|| unsafe { clone_value(v) })
    }

    #[inline(always)]
    pub(crate) fn load_next(&self) -> *mut Self {
        self.next.load(READ_ORD)
    }

    /// Height of this node's index column.
    #[inline(always)]
    pub(crate) fn height(&self) -> usize {
        self.tower.len()
    }

    /// Index entry of this node at `level` (1-based).
    ///
    /// The pointer stays valid for as long as the node does.
    #[inline(always)]
    pub(crate) fn tower_index(&self, level: usize) -> *mut Index<V> {
        debug_assert!((1..=self.tower.len()).contains(&level));
        StdPtr::from_ref(&self.tower[level - 1]).cast_mut()
    }

    #[inline(always)]
    pub(crate) fn self_ptr(&self) -> *mut Self {
        StdPtr::from_ref(self).cast_mut()
    }

    // ========================================================================
    //  CAS transitions
    // ========================================================================

    #[inline(always)]
    pub(crate) fn cas_value(&self, expected: *mut V, new: *mut V) -> bool {
        self.value
            .compare_exchange(expected, new, CAS_SUCCESS, CAS_FAILURE)
            .is_ok()
    }

    #[inline(always)]
    pub(crate) fn cas_next(&self, expected: *mut Self, new: *mut Self) -> bool {
        self.next
            .compare_exchange(expected, new, CAS_SUCCESS, CAS_FAILURE)
            .is_ok()
    }

    /// Replace the successor `f` with a fresh marker pointing at `f`.
    ///
    /// Succeeds at most once per node: afterwards `next` is a marker and no
    /// CAS expecting a data successor can match.
    pub(crate) fn append_marker(&self, f: *mut Self) -> bool {
        let marker: *mut Self = Self::new_marker(f);
        if self.cas_next(f, marker) {
            return true;
        }

        // SAFETY: the marker lost its CAS and was never visible to anyone.
        unsafe { drop(Box::from_raw(marker)) };
        false
    }

    /// Push a deletion in progress one step further.
    ///
    /// Called on a logically deleted node `self` observed between `b` and `f`.
    /// If the view is still current, either append the missing marker or
    /// splice `b` past `self` and its marker. The thread whose splice lands
    /// releases the chain link of `self`.
    pub(crate) fn help_delete(&self, b: &Self, f: *mut Self, guard: &LocalGuard<'_>) {
        let this: *mut Self = self.self_ptr();

        if self.load_next() != f || b.load_next() != this {
            return;
        }

        // SAFETY: `self` is still `b`'s successor, so `f` is reachable and was
        // loaded under `guard`.
        let f_is_marker: bool = !f.is_null() && unsafe { (*f).is_marker() };

        if f_is_marker {
            // SAFETY: see above; a marker's `next` never changes.
            let after: *mut Self = unsafe { (*f).load_next() };
            if b.cas_next(this, after) {
                bump(&HELP_DELETE_COUNT);
                trace_log!(key = ?self.key(), "helped splice of deleted node");

                // SAFETY: the splice removed the chain reference to `this`.
                unsafe { Self::release_link(this, guard) };
            }
        } else {
            self.append_marker(f);
        }
    }

    // ========================================================================
    //  Chain stepping
    // ========================================================================

    /// Read `self.next` and classify it for a search positioned at `self`.
    ///
    /// Restarts (helping a pending deletion first if one is found) whenever
    /// the successor cannot be trusted: it moved, it is deleted, it is a
    /// marker, or `self` was deleted in the meantime. `f` is never
    /// dereferenced on a restart path unless `self` still links to the
    /// successor.
    pub(crate) fn scan_next(&self, guard: &LocalGuard<'_>) -> Scan<V> {
        let n: *mut Self = self.load_next();
        if n.is_null() {
            return Scan::End;
        }

        // SAFETY: `n` was loaded from a node reached under `guard`.
        let n_ref: &Self = unsafe { &*n };
        let f: *mut Self = n_ref.load_next();

        if n != self.load_next() {
            bump(&RETRY_COUNT);
            return Scan::Restart;
        }

        let v: *mut V = n_ref.load_value();
        if n_ref.kind == NodeKind::Data && v.is_null() {
            n_ref.help_delete(self, f, guard);
            bump(&RETRY_COUNT);
            return Scan::Restart;
        }

        if n_ref.is_marker() || self.is_deleted() {
            bump(&RETRY_COUNT);
            return Scan::Restart;
        }

        Scan::Next { n, f, v }
    }

    // ========================================================================
    //  Link counting
    // ========================================================================

    /// Take a structural reference for an index level about to be linked.
    ///
    /// Fails once the count has dropped to zero: a retired node is never
    /// brought back.
    pub(crate) fn acquire_link(&self) -> bool {
        self.links
            .fetch_update(CAS_SUCCESS, CAS_FAILURE, |links| {
                (links != 0).then(|| links + 1)
            })
            .is_ok()
    }

    /// Drop one structural reference, retiring the node on the last one.
    ///
    /// # Safety
    ///
    /// `node` must be a published data node and the caller must own one of
    /// its structural references.
    pub(crate) unsafe fn release_link(node: *mut Self, guard: &LocalGuard<'_>) {
        // SAFETY: the caller owns a reference, so the node is alive.
        let previous: usize = unsafe { (*node).links.fetch_sub(1, CAS_SUCCESS) };
        debug_assert!(previous > 0, "link count underflow");

        if previous == 1 {
            // SAFETY: no structure references the node any more; readers that
            // still hold it are protected by their guards.
            unsafe { guard.defer_retire(node, reclaim_node::<V>) };
        }
    }

    #[cfg(test)]
    pub(crate) fn link_count(&self) -> usize {
        self.links.load(READ_ORD)
    }
}
