//! Bounded views and weakly consistent iteration.
//!
//! A [`RangeView`] is an immutable pair of optional inclusive bounds plus a
//! direction. Iterators created from it walk the live map:
//!
//! - ascending iteration follows the data chain directly, one hop per step;
//! - descending iteration has no back links to follow, so each step runs a
//!   fresh "strictly less than the last key" search (`O(log n)` per step).
//!
//! Bounds are re-checked on every step, and the value of the next entry is
//! captured when the iterator moves onto it, so an iterator never yields a
//! value that was already removed when it got there.

use std::fmt as StdFmt;
use std::ptr as StdPtr;
use std::sync::Arc;

use seize::LocalGuard;

use crate::error::{Error, Result, check_key};
use crate::node::Node;
use crate::skiplist::{Entry, Relation, SkipList};

// ============================================================================
//  Bounds
// ============================================================================

/// Optional inclusive key bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Bounds {
    lo: Option<Box<[u8]>>,
    hi: Option<Box<[u8]>>,
}

impl Bounds {
    /// Build bounds, rejecting `from > to`.
    pub(crate) fn new(from: Option<&[u8]>, to: Option<&[u8]>) -> Result<Self> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::InvertedRange);
            }
        }

        Ok(Self {
            lo: from.map(Box::from),
            hi: to.map(Box::from),
        })
    }

    #[inline(always)]
    fn too_low(&self, key: &[u8]) -> bool {
        self.lo.as_deref().is_some_and(|lo| key < lo)
    }

    #[inline(always)]
    fn too_high(&self, key: &[u8]) -> bool {
        self.hi.as_deref().is_some_and(|hi| key > hi)
    }

    #[inline(always)]
    fn contains(&self, key: &[u8]) -> bool {
        !self.too_low(key) && !self.too_high(key)
    }
}

// ============================================================================
//  RangeView
// ============================================================================

/// A view of the keys of a [`SkipList`] between two optional inclusive
/// bounds, with a fixed iteration direction.
///
/// The view holds no snapshot: every call reads the live map.
///
/// ```rust
/// use skiplist::SkipList;
///
/// let map: SkipList<u32> = SkipList::new();
/// for (i, key) in [b"a", b"b", b"c", b"d"].into_iter().enumerate() {
///     map.put(key, i as u32)?;
/// }
///
/// let view = map.range(Some(b"b".as_slice()), Some(b"c".as_slice()), true)?;
/// let keys: Vec<Vec<u8>> = view.iter().map(|(k, _)| k).collect();
/// assert_eq!(keys, [b"c".to_vec(), b"b".to_vec()]);
/// # Ok::<(), skiplist::Error>(())
/// ```
pub struct RangeView<'a, V> {
    list: &'a SkipList<V>,
    bounds: Bounds,
    descending: bool,
}

impl<V> StdFmt::Debug for RangeView<'_, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("RangeView")
            .field("lo", &self.bounds.lo)
            .field("hi", &self.bounds.hi)
            .field("descending", &self.descending)
            .finish_non_exhaustive()
    }
}

impl<'a, V: Send + Sync + 'static> RangeView<'a, V> {
    pub(crate) const fn new(list: &'a SkipList<V>, bounds: Bounds, descending: bool) -> Self {
        Self {
            list,
            bounds,
            descending,
        }
    }

    /// Lower bound, if any.
    #[must_use]
    pub fn lower_bound(&self) -> Option<&[u8]> {
        self.bounds.lo.as_deref()
    }

    /// Upper bound, if any.
    #[must_use]
    pub fn upper_bound(&self) -> Option<&[u8]> {
        self.bounds.hi.as_deref()
    }

    /// True if iterators of this view run from high keys to low keys.
    #[must_use]
    pub const fn is_descending(&self) -> bool {
        self.descending
    }

    /// True if `key` sorts below the lower bound.
    #[must_use]
    pub fn too_low(&self, key: &[u8]) -> bool {
        self.bounds.too_low(key)
    }

    /// True if `key` sorts above the upper bound.
    #[must_use]
    pub fn too_high(&self, key: &[u8]) -> bool {
        self.bounds.too_high(key)
    }

    /// True if `key` lies within both bounds.
    #[must_use]
    pub fn in_bounds(&self, key: &[u8]) -> bool {
        self.bounds.contains(key)
    }

    fn check_key_bounds(&self, key: &[u8]) -> Result<()> {
        check_key(key)?;
        if self.in_bounds(key) {
            Ok(())
        } else {
            Err(Error::KeyOutOfRange)
        }
    }

    /// Value for `key`, which must lie within the view.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`] for an empty key, [`Error::KeyOutOfRange`] for a
    /// key outside the bounds.
    pub fn get(&self, key: &[u8]) -> Result<Option<Arc<V>>> {
        self.check_key_bounds(key)?;
        self.list.get(key)
    }

    /// True if `key` is within the bounds and present.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.in_bounds(key) && self.list.contains_key(key)
    }

    /// Remove `key`, which must lie within the view.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`] for an empty key, [`Error::KeyOutOfRange`] for a
    /// key outside the bounds.
    pub fn remove(&self, key: &[u8]) -> Result<Option<Arc<V>>> {
        self.check_key_bounds(key)?;
        self.list.remove(key)
    }

    /// Iterator over the view in its direction.
    #[must_use]
    pub fn iter(&self) -> Iter<'a, V> {
        Iter::new(self.list, self.bounds.clone(), self.descending)
    }
}

impl<'a, V: Send + Sync + 'static> IntoIterator for &RangeView<'a, V> {
    type Item = Entry<V>;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

// ============================================================================
//  Iter
// ============================================================================

/// Weakly consistent iterator over a [`SkipList`] or a [`RangeView`].
///
/// The iterator keeps a reclamation guard for its whole lifetime, so nodes
/// it has seen stay readable even if they are removed meanwhile. Drop
/// long-lived iterators promptly: memory retired while one is alive is not
/// freed until it goes away.
pub struct Iter<'a, V> {
    list: &'a SkipList<V>,
    guard: LocalGuard<'a>,
    bounds: Bounds,
    descending: bool,

    /// Node to return next, null once exhausted.
    next: *mut Node<V>,

    /// Value captured when `next` was reached.
    next_value: Option<Arc<V>>,

    /// Node returned by the last `next_entry`, cleared by `remove`.
    last_returned: *mut Node<V>,
}

impl<V> StdFmt::Debug for Iter<'_, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Iter")
            .field("descending", &self.descending)
            .field("has_next", &!self.next.is_null())
            .finish_non_exhaustive()
    }
}

impl<'a, V: Send + Sync + 'static> Iter<'a, V> {
    pub(crate) fn new(list: &'a SkipList<V>, bounds: Bounds, descending: bool) -> Self {
        let mut iter = Self {
            list,
            guard: list.guard(),
            bounds,
            descending,
            next: StdPtr::null_mut(),
            next_value: None,
            last_returned: StdPtr::null_mut(),
        };
        iter.position_first();
        iter
    }

    /// Move onto the first live node in range, in iteration order.
    fn position_first(&mut self) {
        loop {
            let n: *mut Node<V> = if self.descending {
                self.hi_node()
            } else {
                self.lo_node()
            };
            if n.is_null() {
                return;
            }

            // SAFETY: `n` was found under the iterator's guard.
            let n_ref: &Node<V> = unsafe { &*n };
            if let Some(value) = n_ref.value_snapshot(&self.guard) {
                if self.bounds.contains(n_ref.key()) {
                    self.next = n;
                    self.next_value = Some(value);
                }
                return;
            }
        }
    }

    /// Lowest node at or above the lower bound; may be out of range.
    fn lo_node(&self) -> *mut Node<V> {
        match self.bounds.lo.as_deref() {
            None => self.list.find_first(&self.guard),
            Some(lo) => self.list.find_near_node(lo, Relation::CEILING, &self.guard),
        }
    }

    /// Highest node at or below the upper bound; may be out of range.
    fn hi_node(&self) -> *mut Node<V> {
        match self.bounds.hi.as_deref() {
            None => self.list.find_last(&self.guard),
            Some(hi) => self.list.find_near_node(hi, Relation::FLOOR, &self.guard),
        }
    }

    /// Follow the data chain to the next live node, stopping past the upper bound.
    fn ascend(&mut self) {
        let mut cursor: *mut Node<V> = self.next;
        loop {
            // SAFETY: every node reached from a node seen under the guard is
            // still allocated.
            cursor = unsafe { (*cursor).load_next() };
            if cursor.is_null() {
                break;
            }

            // SAFETY: as above.
            let n_ref: &Node<V> = unsafe { &*cursor };
            if let Some(value) = n_ref.value_snapshot(&self.guard) {
                if self.bounds.too_high(n_ref.key()) {
                    break;
                }
                self.next = cursor;
                self.next_value = Some(value);
                return;
            }
        }

        self.next = StdPtr::null_mut();
        self.next_value = None;
    }

    /// Search for the greatest live key below the last one, stopping past the
    /// lower bound.
    fn descend(&mut self) {
        // SAFETY: `last_returned` is set right before every step.
        let last_key: &[u8] = unsafe { (*self.last_returned).key() };
        loop {
            let n: *mut Node<V> = self.list.find_near_node(last_key, Relation::LT, &self.guard);
            if n.is_null() {
                break;
            }

            // SAFETY: `n` was found under the iterator's guard.
            let n_ref: &Node<V> = unsafe { &*n };
            if let Some(value) = n_ref.value_snapshot(&self.guard) {
                if self.bounds.too_low(n_ref.key()) {
                    break;
                }
                self.next = n;
                self.next_value = Some(value);
                return;
            }
        }

        self.next = StdPtr::null_mut();
        self.next_value = None;
    }

    /// True if [`next_entry`](Self::next_entry) has an entry to return.
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.next.is_null()
    }

    /// Return the buffered entry and advance.
    ///
    /// # Errors
    ///
    /// [`Error::Exhausted`] if there is nothing left to return.
    pub fn next_entry(&mut self) -> Result<Entry<V>> {
        let n: *mut Node<V> = self.next;
        if n.is_null() {
            return Err(Error::Exhausted);
        }
        let Some(value) = self.next_value.take() else {
            return Err(Error::Exhausted);
        };

        // SAFETY: `n` was reached under the iterator's guard.
        let key: Vec<u8> = unsafe { (*n).key().to_vec() };

        self.last_returned = n;
        if self.descending {
            self.descend();
        } else {
            self.ascend();
        }

        Ok((key, value))
    }

    /// Remove the key of the entry last returned by
    /// [`next_entry`](Self::next_entry) from the map.
    ///
    /// Removal is by key: if the key was replaced since it was returned, the
    /// replacement is removed.
    ///
    /// # Errors
    ///
    /// [`Error::NoLastReturned`] if no entry has been returned yet, or if
    /// `remove` was already called for it.
    pub fn remove(&mut self) -> Result<()> {
        let last: *mut Node<V> = self.last_returned;
        if last.is_null() {
            return Err(Error::NoLastReturned);
        }

        // SAFETY: `last` was reached under the iterator's guard.
        let key: &[u8] = unsafe { (*last).key() };
        self.list.remove(key)?;
        self.last_returned = StdPtr::null_mut();
        Ok(())
    }
}

impl<V: Send + Sync + 'static> Iterator for Iter<'_, V> {
    type Item = Entry<V>;

    fn next(&mut self) -> Option<Entry<V>> {
        self.next_entry().ok()
    }
}
