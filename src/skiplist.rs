//! The concurrent skip list map.
//!
//! Structure: a sorted singly linked data chain starting at a base sentinel,
//! plus a stack of sparse index lanes reachable from an atomically swapped
//! head column. Every operation starts with a predecessor search,
//! which walks the index lanes down to the data chain, then finishes with a
//! short validated walk along the chain.
//!
//! Submodules:
//! - `search`: predecessor search and the nearest-key queries
//! - `levels`: index insertion, head growth and reduction

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, AtomicPtr};

use parking_lot::Mutex;
use seize::{Collector, Guard, LocalGuard};

use crate::config::SkipListConfig;
use crate::counters::{RETRY_COUNT, bump};
use crate::error::{Result, check_key};
use crate::index::Index;
use crate::level::{LevelGenerator, XorShiftLevels};
use crate::node::{Node, Scan, clone_value};
use crate::ordering::{READ_ORD, RELAXED};
use crate::range::{Bounds, Iter, RangeView};
use crate::reclaim::{reclaim_value, teardown};
use crate::tracing_helpers::trace_log;

mod levels;
mod search;

pub use search::Relation;

/// A key/value pair copied out of the map.
pub type Entry<V> = (Vec<u8>, Arc<V>);

/// A lock-free concurrent ordered map from byte-string keys to values.
///
/// Values are stored as `Arc<V>` and every read hands out a clone of that
/// `Arc`, so a value stays usable after it has been replaced or removed.
///
/// # Keys
///
/// Keys are arbitrary non-empty byte strings ordered lexicographically. The
/// empty key is reserved for the internal sentinel and rejected with
/// [`Error::EmptyKey`](crate::Error::EmptyKey).
///
/// # Consistency
///
/// Operations on the same key are linearizable. [`len`](Self::len) is an
/// eventually consistent counter, and iteration is weakly consistent: it
/// never fails because of concurrent writes and never yields a removed value,
/// but it may or may not observe writes racing with it.
///
/// # Example
///
/// ```rust
/// use skiplist::SkipList;
///
/// let map: SkipList<u32> = SkipList::new();
/// map.put(b"b", 1)?;
/// map.put(b"a", 2)?;
/// map.put(b"c", 3)?;
///
/// let keys: Vec<Vec<u8>> = map.iter().map(|(k, _)| k).collect();
/// assert_eq!(keys, [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
/// # Ok::<(), skiplist::Error>(())
/// ```
pub struct SkipList<V> {
    /// Memory reclamation collector for safe concurrent access.
    collector: Collector,

    /// Top of the head column.
    head: AtomicPtr<Index<V>>,

    /// Data-chain sentinel. Owned by the list.
    base: *mut Node<V>,

    /// Every head index ever installed, one per level, freed on drop.
    ///
    /// Reduced levels stay here: late inserts may still have linked into them,
    /// and the next growth past that level reinstalls the same column.
    heads: Mutex<Vec<*mut Index<V>>>,

    /// Live entries. Updated apart from the splices, so it may briefly lag
    /// and is clamped at zero when read.
    len: AtomicIsize,

    max_level: usize,

    levels: Box<dyn LevelGenerator>,
}

impl<V> StdFmt::Debug for SkipList<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.len.load(RELAXED))
            .field("height", &self.head_level())
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

// SAFETY: all shared state is reached through atomics or the mutex; raw
// pointers only ever point into allocations owned by the list, and values are
// handed out as `Arc<V>`, which requires `V: Send + Sync` to cross threads.
unsafe impl<V: Send + Sync> Send for SkipList<V> {}
// SAFETY: see above.
unsafe impl<V: Send + Sync> Sync for SkipList<V> {}

impl<V> Drop for SkipList<V> {
    fn drop(&mut self) {
        // No concurrent access is possible here (Drop requires unique access).
        // Retired nodes are already unreachable and go with the collector.
        let heads: Vec<*mut Index<V>> = std::mem::take(self.heads.get_mut());

        // SAFETY: exclusive access; `heads` holds every installed head index.
        unsafe { teardown(self.base, &heads) };
    }
}

impl<V: Send + Sync + 'static> Default for SkipList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync + 'static> SkipList<V> {
    // ========================================================================
    //  Construction
    // ========================================================================

    /// Create an empty map with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SkipListConfig::default())
    }

    /// Create an empty map with `config`, drawing levels from a randomly
    /// seeded [`XorShiftLevels`].
    #[must_use]
    pub fn with_config(config: SkipListConfig) -> Self {
        Self::with_level_generator(config, XorShiftLevels::new())
    }

    /// Create an empty map with an explicit level generator.
    ///
    /// Use a seeded generator to make the index shape reproducible:
    ///
    /// ```rust
    /// use rand::SeedableRng;
    /// use rand::rngs::SmallRng;
    /// use skiplist::{RngLevels, SkipList, SkipListConfig};
    ///
    /// let levels = RngLevels::new(SmallRng::seed_from_u64(1));
    /// let map: SkipList<u8> = SkipList::with_level_generator(SkipListConfig::default(), levels);
    /// assert!(map.is_empty());
    /// ```
    #[must_use]
    pub fn with_level_generator<G>(config: SkipListConfig, levels: G) -> Self
    where
        G: LevelGenerator + 'static,
    {
        let base: *mut Node<V> = Box::into_raw(Node::new_base());
        let head: *mut Index<V> = Box::into_raw(Index::new_head(base, StdPtr::null_mut(), 1));

        Self {
            collector: Collector::new(),
            head: AtomicPtr::new(head),
            base,
            heads: Mutex::new(vec![head]),
            len: AtomicIsize::new(0),
            max_level: config.max_level.max(1),
            levels: Box::new(levels),
        }
    }

    /// Enter a protected region and return a guard.
    ///
    /// Every public operation enters its own guard; this is exposed for
    /// callers that want to observe reclamation behaviour.
    #[must_use]
    #[inline(always)]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    // ========================================================================
    //  Size and shape
    // ========================================================================

    /// Number of entries. Eventually consistent under concurrent writes.
    #[must_use]
    #[inline(always)]
    pub fn len(&self) -> usize {
        usize::try_from(self.len.load(RELAXED)).unwrap_or(0)
    }

    /// True if [`len`](Self::len) is zero.
    #[must_use]
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current number of index levels (the head height).
    #[must_use]
    pub fn height(&self) -> usize {
        self.head_level()
    }

    /// Configured maximum index height.
    #[must_use]
    pub const fn max_level(&self) -> usize {
        self.max_level
    }

    // ========================================================================
    //  Writes
    // ========================================================================

    /// Insert or replace the value for `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn put(&self, key: &[u8], value: V) -> Result<Option<Arc<V>>> {
        check_key(key)?;
        let value: Arc<V> = Arc::new(value);
        Ok(self.do_put(key, false, |_| Arc::clone(&value)))
    }

    /// Insert `value` only if `key` is absent.
    ///
    /// Returns the existing value, untouched, when the key is present, and
    /// `None` when `value` was inserted.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn put_if_absent(&self, key: &[u8], value: V) -> Result<Option<Arc<V>>> {
        check_key(key)?;
        let value: Arc<V> = Arc::new(value);
        Ok(self.do_put(key, true, |_| Arc::clone(&value)))
    }

    /// Atomically replace the value for `key` with `f(current)`, inserting
    /// `f(None)` when the key is absent. Returns the previous value.
    ///
    /// `f` may be called several times when the update races with other
    /// writers, and only the result of the last call is stored. It must be a
    /// pure function of its input.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn update<F>(&self, key: &[u8], f: F) -> Result<Option<Arc<V>>>
    where
        F: Fn(Option<&V>) -> V,
    {
        check_key(key)?;
        Ok(self.do_put(key, false, |current| Arc::new(f(current))))
    }

    /// Insert `f(None)` only if `key` is absent; otherwise return the existing
    /// value without calling `f`.
    ///
    /// The same purity contract as [`update`](Self::update) applies.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn update_if_absent<F>(&self, key: &[u8], f: F) -> Result<Option<Arc<V>>>
    where
        F: Fn(Option<&V>) -> V,
    {
        check_key(key)?;
        Ok(self.do_put(key, true, |current| Arc::new(f(current))))
    }

    /// Shared insert/replace loop.
    ///
    /// `make` produces the value to store from the current one. Its result is
    /// dropped if the CAS that would publish it fails.
    fn do_put<F>(&self, key: &[u8], only_if_absent: bool, make: F) -> Option<Arc<V>>
    where
        F: Fn(Option<&V>) -> Arc<V>,
    {
        let guard: LocalGuard<'_> = self.guard();
        // Drawn once per call so that retries do not skew the distribution.
        let mut level: Option<usize> = None;

        'retry: loop {
            let mut b: *mut Node<V> = self.find_predecessor(key, &guard);

            loop {
                // SAFETY: `b` was returned by the search or validated by `scan_next`.
                let b_ref: &Node<V> = unsafe { &*b };
                let n: *mut Node<V> = match b_ref.scan_next(&guard) {
                    Scan::Restart => continue 'retry,
                    Scan::End => StdPtr::null_mut(),
                    Scan::Next { n, v, .. } => {
                        // SAFETY: `scan_next` validated `n` as a live data node.
                        let n_ref: &Node<V> = unsafe { &*n };
                        match key.cmp(n_ref.key()) {
                            Ordering::Greater => {
                                b = n;
                                continue;
                            }
                            Ordering::Less => n,
                            Ordering::Equal => {
                                // SAFETY: `v` was loaded under `guard`.
                                let current: Arc<V> = unsafe { clone_value(v) };
                                if only_if_absent {
                                    return Some(current);
                                }

                                let fresh: *mut V = Arc::into_raw(make(Some(&*current))).cast_mut();
                                if n_ref.cas_value(v, fresh) {
                                    // SAFETY: `v` left the slot through our CAS.
                                    unsafe { guard.defer_retire(v, reclaim_value::<V>) };
                                    return Some(current);
                                }

                                // SAFETY: `fresh` was never published.
                                unsafe { drop(Arc::from_raw(fresh.cast_const())) };
                                bump(&RETRY_COUNT);
                                trace_log!(key = ?key, "value CAS lost, retrying");
                                continue 'retry;
                            }
                        }
                    }
                };

                // `key` belongs between `b` and `n`.
                let drawn: usize =
                    *level.get_or_insert_with(|| self.levels.random_level(self.max_level));
                let height: usize = drawn.min(self.head_level() + 1).min(self.max_level);

                let value: *mut V = Arc::into_raw(make(None)).cast_mut();
                let z: *mut Node<V> = Node::new_data(key, value, n, height);

                if !b_ref.cas_next(n, z) {
                    // SAFETY: `z` lost its CAS and was never published.
                    unsafe {
                        let value: *mut V = Node::discard_unpublished(z);
                        drop(Arc::from_raw(value.cast_const()));
                    }
                    bump(&RETRY_COUNT);
                    continue 'retry;
                }

                self.len.fetch_add(1, RELAXED);
                self.insert_index(z, &guard);
                return None;
            }
        }
    }

    /// Remove `key`, returning the removed value.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn remove(&self, key: &[u8]) -> Result<Option<Arc<V>>> {
        check_key(key)?;
        Ok(self.do_remove(key, |_| true))
    }

    /// Remove `key` only if its current value equals `expected`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn compare_and_remove(&self, key: &[u8], expected: &V) -> Result<bool>
    where
        V: PartialEq,
    {
        check_key(key)?;
        Ok(self.do_remove(key, |current| current == expected).is_some())
    }

    /// Shared removal loop. Logical deletion (clearing the value slot) is the
    /// linearization point; the physical splice may be finished by a helper.
    fn do_remove<P>(&self, key: &[u8], matches: P) -> Option<Arc<V>>
    where
        P: Fn(&V) -> bool,
    {
        let guard: LocalGuard<'_> = self.guard();

        'retry: loop {
            let mut b: *mut Node<V> = self.find_predecessor(key, &guard);

            loop {
                // SAFETY: `b` was returned by the search or validated by `scan_next`.
                let b_ref: &Node<V> = unsafe { &*b };
                let (n, f, v) = match b_ref.scan_next(&guard) {
                    Scan::End => return None,
                    Scan::Restart => continue 'retry,
                    Scan::Next { n, f, v } => (n, f, v),
                };

                // SAFETY: `scan_next` validated `n` as a live data node.
                let n_ref: &Node<V> = unsafe { &*n };
                match key.cmp(n_ref.key()) {
                    Ordering::Less => return None,
                    Ordering::Greater => {
                        b = n;
                        continue;
                    }
                    Ordering::Equal => {}
                }

                // SAFETY: `v` was loaded under `guard`.
                let current: Arc<V> = unsafe { clone_value(v) };
                if !matches(&current) {
                    return None;
                }

                if !n_ref.cas_value(v, StdPtr::null_mut()) {
                    bump(&RETRY_COUNT);
                    continue 'retry;
                }

                // SAFETY: `v` left the slot through our CAS.
                unsafe { guard.defer_retire(v, reclaim_value::<V>) };
                self.len.fetch_sub(1, RELAXED);

                if n_ref.append_marker(f) && b_ref.cas_next(n, f) {
                    trace_log!(key = ?key, "spliced removed node");
                    // SAFETY: our splice removed the chain reference to `n`.
                    unsafe { Node::release_link(n, &guard) };

                    // Clean the index lanes, then see whether the head can shrink.
                    self.find_predecessor(key, &guard);
                    // SAFETY: head indexes are never freed while the list is alive.
                    if unsafe { (*self.head.load(READ_ORD)).load_right() }.is_null() {
                        self.try_reduce_level();
                    }
                } else {
                    // A concurrent helper owns the splice; make sure it lands.
                    self.find_node(key, &guard);
                }

                return Some(current);
            }
        }
    }

    // ========================================================================
    //  Reads
    // ========================================================================

    /// Value currently stored for `key`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn get(&self, key: &[u8]) -> Result<Option<Arc<V>>> {
        check_key(key)?;
        let guard: LocalGuard<'_> = self.guard();
        let n: *mut Node<V> = self.find_node(key, &guard);
        if n.is_null() {
            return Ok(None);
        }

        // SAFETY: `n` was found under `guard`.
        Ok(unsafe { (*n).value_snapshot(&guard) })
    }

    /// True if `key` is present. The empty key is never present.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        if key.is_empty() {
            return false;
        }

        let guard: LocalGuard<'_> = self.guard();
        let n: *mut Node<V> = self.find_node(key, &guard);

        // SAFETY: `n` was found under `guard`.
        !n.is_null() && unsafe { !(*n).is_deleted() }
    }

    /// Entry with the least key.
    #[must_use]
    pub fn first_entry(&self) -> Option<Entry<V>> {
        let guard: LocalGuard<'_> = self.guard();
        loop {
            let n: *mut Node<V> = self.find_first(&guard);
            if n.is_null() {
                return None;
            }
            // SAFETY: `n` was found under `guard`.
            if let Some(entry) = unsafe { snapshot(&*n, &guard) } {
                return Some(entry);
            }
        }
    }

    /// Entry with the greatest key.
    #[must_use]
    pub fn last_entry(&self) -> Option<Entry<V>> {
        let guard: LocalGuard<'_> = self.guard();
        loop {
            let n: *mut Node<V> = self.find_last(&guard);
            if n.is_null() {
                return None;
            }
            // SAFETY: `n` was found under `guard`.
            if let Some(entry) = unsafe { snapshot(&*n, &guard) } {
                return Some(entry);
            }
        }
    }

    /// Entry nearest to `key` under `rel` (see [`Relation`]).
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn find_near(&self, key: &[u8], rel: Relation) -> Result<Option<Entry<V>>> {
        check_key(key)?;
        let guard: LocalGuard<'_> = self.guard();
        loop {
            let n: *mut Node<V> = self.find_near_node(key, rel, &guard);
            if n.is_null() {
                return Ok(None);
            }
            // SAFETY: `n` was found under `guard`.
            if let Some(entry) = unsafe { snapshot(&*n, &guard) } {
                return Ok(Some(entry));
            }
        }
    }

    /// Least entry with a key `>= key`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn ceiling_entry(&self, key: &[u8]) -> Result<Option<Entry<V>>> {
        self.find_near(key, Relation::CEILING)
    }

    /// Greatest entry with a key `<= key`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn floor_entry(&self, key: &[u8]) -> Result<Option<Entry<V>>> {
        self.find_near(key, Relation::FLOOR)
    }

    /// Least entry with a key `> key`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn higher_entry(&self, key: &[u8]) -> Result<Option<Entry<V>>> {
        self.find_near(key, Relation::GT)
    }

    /// Greatest entry with a key `< key`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`](crate::Error::EmptyKey) if `key` is empty.
    pub fn lower_entry(&self, key: &[u8]) -> Result<Option<Entry<V>>> {
        self.find_near(key, Relation::LT)
    }

    // ========================================================================
    //  Ranges
    // ========================================================================

    /// View of the keys in `[from, to]`; a missing bound is open.
    ///
    /// # Errors
    ///
    /// [`Error::InvertedRange`](crate::Error::InvertedRange) if both bounds
    /// are given and `from > to`.
    pub fn range(
        &self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        descending: bool,
    ) -> Result<RangeView<'_, V>> {
        Ok(RangeView::new(self, Bounds::new(from, to)?, descending))
    }

    /// Ascending iterator over the whole map.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self, Bounds::default(), false)
    }
}

/// Copy out `node`'s key and value, `None` if it is deleted.
pub(crate) fn snapshot<V>(node: &Node<V>, guard: &LocalGuard<'_>) -> Option<Entry<V>> {
    node.value_snapshot(guard)
        .map(|value| (node.key().to_vec(), value))
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::level::RngLevels;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn _assert_send_sync()
    where
        SkipList<u64>: Send + Sync,
        SkipList<String>: Send + Sync,
        XorShiftLevels: Send + Sync,
        RngLevels<SmallRng>: Send + Sync,
    {
    }

    fn seeded() -> SkipList<u64> {
        SkipList::with_level_generator(
            SkipListConfig::default(),
            RngLevels::new(SmallRng::seed_from_u64(0xC0FFEE)),
        )
    }

    #[test]
    fn test_new_list_is_empty() {
        let list: SkipList<u64> = SkipList::new();

        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.height(), 1);
        assert!(list.get(b"missing").unwrap().is_none());
        assert!(list.first_entry().is_none());
        assert!(list.last_entry().is_none());
    }

    #[test]
    fn test_empty_key_rejected() {
        let list: SkipList<u64> = SkipList::new();

        assert_eq!(list.put(b"", 1), Err(Error::EmptyKey));
        assert_eq!(list.put_if_absent(b"", 1), Err(Error::EmptyKey));
        assert_eq!(list.get(b""), Err(Error::EmptyKey));
        assert_eq!(list.remove(b""), Err(Error::EmptyKey));
        assert_eq!(list.compare_and_remove(b"", &1), Err(Error::EmptyKey));
        assert!(list.update(b"", |_| 1).is_err());
        assert!(!list.contains_key(b""));
        assert!(list.is_empty());
    }

    #[test]
    fn test_put_get_round_trip() {
        let list = seeded();

        assert_eq!(list.put(b"k", 7).unwrap(), None);
        assert_eq!(*list.get(b"k").unwrap().unwrap(), 7);
        assert!(list.contains_key(b"k"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_overwrite_returns_prior() {
        let list = seeded();

        list.put(b"k", 1).unwrap();
        let prior = list.put(b"k", 2).unwrap();
        assert_eq!(prior.as_deref(), Some(&1));
        assert_eq!(*list.get(b"k").unwrap().unwrap(), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        let list: SkipList<String> = SkipList::new();

        assert_eq!(list.put_if_absent(b"k", "v1".to_string()).unwrap(), None);
        let existing = list.put_if_absent(b"k", "v2".to_string()).unwrap();
        assert_eq!(existing.as_deref().map(String::as_str), Some("v1"));

        for _ in 0..3 {
            list.put_if_absent(b"k", "v3".to_string()).unwrap();
        }
        assert_eq!(list.get(b"k").unwrap().unwrap().as_str(), "v1");
    }

    #[test]
    fn test_update_applies_function() {
        let list = seeded();

        assert_eq!(list.update(b"n", |v| v.map_or(10, |v| v + 1)).unwrap(), None);
        assert_eq!(*list.get(b"n").unwrap().unwrap(), 10);

        let prior = list.update(b"n", |v| v.map_or(10, |v| v + 1)).unwrap();
        assert_eq!(prior.as_deref(), Some(&10));
        assert_eq!(*list.get(b"n").unwrap().unwrap(), 11);
    }

    #[test]
    fn test_update_if_absent_skips_present_keys() {
        let list = seeded();
        list.put(b"k", 1).unwrap();

        let existing = list
            .update_if_absent(b"k", |_| panic!("must not run for a present key"))
            .unwrap();
        assert_eq!(existing.as_deref(), Some(&1));

        assert_eq!(list.update_if_absent(b"new", |_| 5).unwrap(), None);
        assert_eq!(*list.get(b"new").unwrap().unwrap(), 5);
    }

    #[test]
    fn test_remove_missing_is_absent() {
        let list = seeded();

        assert_eq!(list.remove(b"missing").unwrap(), None);
        list.put(b"a", 1).unwrap();
        assert_eq!(list.remove(b"b").unwrap(), None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_returns_value() {
        let list = seeded();
        list.put(b"a", 1).unwrap();
        list.put(b"b", 2).unwrap();

        assert_eq!(list.remove(b"a").unwrap().as_deref(), Some(&1));
        assert!(list.get(b"a").unwrap().is_none());
        assert!(!list.contains_key(b"a"));
        assert_eq!(list.remove(b"a").unwrap(), None);
        assert_eq!(list.len(), 1);

        // Re-inserting after removal works.
        assert_eq!(list.put(b"a", 3).unwrap(), None);
        assert_eq!(*list.get(b"a").unwrap().unwrap(), 3);
    }

    #[test]
    fn test_compare_and_remove() {
        let list = seeded();
        list.put(b"k", 1).unwrap();

        assert!(!list.compare_and_remove(b"k", &2).unwrap());
        assert_eq!(*list.get(b"k").unwrap().unwrap(), 1);

        assert!(list.compare_and_remove(b"k", &1).unwrap());
        assert!(list.get(b"k").unwrap().is_none());
        assert!(!list.compare_and_remove(b"k", &1).unwrap());
    }

    #[test]
    fn test_iteration_order() {
        let list = seeded();
        list.put(b"b", 1).unwrap();
        list.put(b"a", 2).unwrap();
        list.put(b"c", 3).unwrap();

        let entries: Vec<(Vec<u8>, u64)> = list.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(
            entries,
            vec![(b"a".to_vec(), 2), (b"b".to_vec(), 1), (b"c".to_vec(), 3)]
        );
    }

    #[test]
    fn test_nearest_entries() {
        let list = seeded();
        for key in [b"b", b"d", b"f"] {
            list.put(key, 0).unwrap();
        }

        assert_eq!(list.ceiling_entry(b"c").unwrap().unwrap().0, b"d");
        assert_eq!(list.floor_entry(b"c").unwrap().unwrap().0, b"b");
        assert_eq!(list.higher_entry(b"d").unwrap().unwrap().0, b"f");
        assert_eq!(list.lower_entry(b"d").unwrap().unwrap().0, b"b");
        assert!(list.higher_entry(b"f").unwrap().is_none());
        assert!(list.lower_entry(b"b").unwrap().is_none());
        assert_eq!(list.first_entry().unwrap().0, b"b");
        assert_eq!(list.last_entry().unwrap().0, b"f");
    }

    #[test]
    fn test_many_keys_sorted_and_sized() {
        let list = seeded();
        let n = 2_000u64;

        // Insert in a scrambled order.
        for i in 0..n {
            let k = (i * 7919) % n;
            list.put(format!("{k:06}").as_bytes(), k).unwrap();
        }
        assert_eq!(list.len(), n as usize);

        for k in (0..n).step_by(2) {
            assert!(list.remove(format!("{k:06}").as_bytes()).unwrap().is_some());
        }
        assert_eq!(list.len(), (n / 2) as usize);

        let keys: Vec<u64> = list.iter().map(|(_, v)| *v).collect();
        let expected: Vec<u64> = (0..n).filter(|k| k % 2 == 1).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_values_outlive_removal() {
        let list: SkipList<String> = SkipList::new();
        list.put(b"k", "held".to_string()).unwrap();

        let held = list.get(b"k").unwrap().unwrap();
        list.remove(b"k").unwrap();
        list.put(b"k", "new".to_string()).unwrap();
        drop(list);

        assert_eq!(held.as_str(), "held");
    }

    #[test]
    fn test_drop_releases_values() {
        let value = Arc::new(());
        {
            let list: SkipList<Arc<()>> = SkipList::new();
            for i in 0..100u32 {
                list.put(&i.to_be_bytes(), Arc::clone(&value)).unwrap();
            }
            for i in 0..50u32 {
                list.remove(&i.to_be_bytes()).unwrap();
            }
            list.put(&7u32.to_be_bytes(), Arc::clone(&value)).unwrap();
            list.put(&7u32.to_be_bytes(), Arc::clone(&value)).unwrap();
        }
        assert_eq!(Arc::strong_count(&value), 1);
    }
}
