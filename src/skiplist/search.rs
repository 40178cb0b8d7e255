//! Read-side traversal: predecessor search and the nearest-key queries built
//! on top of it.

use std::cmp::Ordering;
use std::ops::BitOr;
use std::ptr as StdPtr;

use seize::LocalGuard;

use super::SkipList;
use crate::counters::{RETRY_COUNT, bump};
use crate::index::{Index, is_frozen};
use crate::node::{Node, Scan};
use crate::ordering::READ_ORD;

/// Relation between a query key and the key a [`SkipList::find_near`] query
/// should return. Combine with `|`.
///
/// `GT` is the absence of `LT`: a relation without `LT` searches upward.
///
/// | Query | Relation |
/// |---|---|
/// | ceiling (least key `>=`) | `GT \| EQ` |
/// | higher (least key `>`) | `GT` |
/// | floor (greatest key `<=`) | `LT \| EQ` |
/// | lower (greatest key `<`) | `LT` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relation(u8);

impl Relation {
    /// Strictly greater.
    pub const GT: Self = Self(0);
    /// Equal.
    pub const EQ: Self = Self(1);
    /// Strictly less.
    pub const LT: Self = Self(2);

    /// Least key greater than or equal to the query key.
    pub const CEILING: Self = Self(Self::GT.0 | Self::EQ.0);
    /// Greatest key less than or equal to the query key.
    pub const FLOOR: Self = Self(Self::LT.0 | Self::EQ.0);

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline(always)]
    const fn has_eq(self) -> bool {
        self.0 & Self::EQ.0 != 0
    }

    #[inline(always)]
    const fn has_lt(self) -> bool {
        self.0 & Self::LT.0 != 0
    }
}

impl BitOr for Relation {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl<V> SkipList<V> {
    /// Descend from the head to the data chain and return the last node known
    /// to precede `key` (the base node if none does).
    ///
    /// Stale indexes met on the way are unlinked; no data-chain link is ever
    /// modified here.
    pub(crate) fn find_predecessor(&self, key: &[u8], guard: &LocalGuard<'_>) -> *mut Node<V> {
        'restart: loop {
            let mut q: *mut Index<V> = self.head.load(READ_ORD);

            loop {
                // SAFETY: `q` is a head index or was reached from one through
                // an unfrozen link under `guard`.
                let q_ref: &Index<V> = unsafe { &*q };
                let r: *mut Index<V> = q_ref.load_right();

                if is_frozen(r) {
                    bump(&RETRY_COUNT);
                    continue 'restart;
                }

                if !r.is_null() {
                    // SAFETY: `q` was not frozen, so `r` is linked.
                    let r_ref: &Index<V> = unsafe { &*r };
                    let n: &Node<V> = r_ref.node();

                    if n.is_deleted() {
                        // SAFETY: `r` was read from `q.right` and indexes a deleted node.
                        if unsafe { q_ref.unlink(r, guard) } {
                            continue;
                        }
                        bump(&RETRY_COUNT);
                        continue 'restart;
                    }

                    if key > n.key() {
                        q = r;
                        continue;
                    }
                }

                let d: *mut Index<V> = q_ref.down();
                if d.is_null() {
                    return q_ref.node_ptr();
                }
                q = d;
            }
        }
    }

    /// Node holding `key`, or null. The node may be deleted by the time the
    /// caller reads it.
    pub(crate) fn find_node(&self, key: &[u8], guard: &LocalGuard<'_>) -> *mut Node<V> {
        'retry: loop {
            let mut b: *mut Node<V> = self.find_predecessor(key, guard);

            loop {
                // SAFETY: `b` was returned by the search or validated by `scan_next`.
                let n: *mut Node<V> = match unsafe { (*b).scan_next(guard) } {
                    Scan::End => return StdPtr::null_mut(),
                    Scan::Restart => continue 'retry,
                    Scan::Next { n, .. } => n,
                };

                // SAFETY: `scan_next` validated `n` as a live data node.
                match key.cmp(unsafe { (*n).key() }) {
                    Ordering::Equal => return n,
                    Ordering::Less => return StdPtr::null_mut(),
                    Ordering::Greater => b = n,
                }
            }
        }
    }

    /// Node nearest to `key` under `rel`, or null.
    pub(crate) fn find_near_node(
        &self,
        key: &[u8],
        rel: Relation,
        guard: &LocalGuard<'_>,
    ) -> *mut Node<V> {
        'retry: loop {
            let mut b: *mut Node<V> = self.find_predecessor(key, guard);

            loop {
                // SAFETY: `b` was returned by the search or validated by `scan_next`.
                let b_ref: &Node<V> = unsafe { &*b };
                let n: *mut Node<V> = match b_ref.scan_next(guard) {
                    Scan::End => {
                        return if !rel.has_lt() || b_ref.is_base() {
                            StdPtr::null_mut()
                        } else {
                            b
                        };
                    }
                    Scan::Restart => continue 'retry,
                    Scan::Next { n, .. } => n,
                };

                // SAFETY: `scan_next` validated `n` as a live data node.
                let c: Ordering = key.cmp(unsafe { (*n).key() });

                if (c == Ordering::Equal && rel.has_eq()) || (c == Ordering::Less && !rel.has_lt())
                {
                    return n;
                }

                if c != Ordering::Greater && rel.has_lt() {
                    return if b_ref.is_base() { StdPtr::null_mut() } else { b };
                }

                b = n;
            }
        }
    }

    /// First data node, or null. Deleted nodes at the front are helped out
    /// of the way.
    pub(crate) fn find_first(&self, guard: &LocalGuard<'_>) -> *mut Node<V> {
        // SAFETY: the base node lives as long as the list.
        let base: &Node<V> = unsafe { &*self.base };

        loop {
            let n: *mut Node<V> = base.load_next();
            if n.is_null() {
                return n;
            }

            // SAFETY: `n` is the base node's successor, loaded under `guard`.
            let n_ref: &Node<V> = unsafe { &*n };
            if !n_ref.is_deleted() {
                return n;
            }
            n_ref.help_delete(base, n_ref.load_next(), guard);
        }
    }

    /// Last data node, or null. The node may already be deleted.
    pub(crate) fn find_last(&self, guard: &LocalGuard<'_>) -> *mut Node<V> {
        'restart: loop {
            let mut q: *mut Index<V> = self.head.load(READ_ORD);

            loop {
                // SAFETY: same reachability argument as `find_predecessor`.
                let q_ref: &Index<V> = unsafe { &*q };
                let r: *mut Index<V> = q_ref.load_right();

                if is_frozen(r) {
                    bump(&RETRY_COUNT);
                    continue 'restart;
                }

                if !r.is_null() {
                    // SAFETY: `q` was not frozen, so `r` is linked.
                    let r_ref: &Index<V> = unsafe { &*r };
                    if r_ref.indexes_deleted_node() {
                        // SAFETY: `r` was read from `q.right` and indexes a deleted node.
                        unsafe { q_ref.unlink(r, guard) };
                        continue 'restart;
                    }
                    q = r;
                    continue;
                }

                let d: *mut Index<V> = q_ref.down();
                if !d.is_null() {
                    q = d;
                    continue;
                }

                let mut b: *mut Node<V> = q_ref.node_ptr();
                loop {
                    // SAFETY: `b` came from a linked index or from `scan_next`.
                    let b_ref: &Node<V> = unsafe { &*b };
                    match b_ref.scan_next(guard) {
                        Scan::End => {
                            return if b_ref.is_base() { StdPtr::null_mut() } else { b };
                        }
                        Scan::Restart => continue 'restart,
                        Scan::Next { n, .. } => b = n,
                    }
                }
            }
        }
    }
}
