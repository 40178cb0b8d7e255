//! Index maintenance: head growth, index insertion and head reduction.

use std::cmp::Ordering;

use seize::LocalGuard;

use super::SkipList;
use crate::counters::{HEAD_GROW_COUNT, HEAD_REDUCE_COUNT, INDEX_ABORT_COUNT, RETRY_COUNT, bump};
use crate::index::{Index, is_frozen};
use crate::node::Node;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD};
use crate::tracing_helpers::{debug_log, trace_log};

/// Levels that must be empty at the top of the head before it shrinks.
const REDUCE_MIN_LEVEL: usize = 3;

/// Where a new index goes at one level.
enum Splice<V> {
    /// Link between `q` and `r` (`r` may be null).
    At { q: *mut Index<V>, r: *mut Index<V> },
    /// The head is currently lower than the requested level.
    HeadTooLow,
    /// A live node with the same key is indexed here: ours has been replaced.
    Conflict,
}

impl<V> SkipList<V> {
    /// Current head height.
    pub(crate) fn head_level(&self) -> usize {
        // SAFETY: head indexes are never freed while the list is alive.
        unsafe { (*self.head.load(READ_ORD)).level() }
    }

    /// Link the index column of the freshly spliced node `z`, level 1 first.
    ///
    /// A level is linked only once the level below it is, so a descent
    /// through `z`'s column never reaches an index that is not in its lane.
    /// The insertion is abandoned as soon as `z` is seen deleted.
    pub(crate) fn insert_index(&self, z: *mut Node<V>, guard: &LocalGuard<'_>) {
        // SAFETY: `z` was published by the caller under `guard`.
        let z_ref: &Node<V> = unsafe { &*z };
        let height: usize = z_ref.height();
        let key: &[u8] = z_ref.key();

        for level in 1..=height {
            if z_ref.is_deleted() || !z_ref.acquire_link() {
                self.abort_index(key, guard);
                return;
            }

            let index: *mut Index<V> = z_ref.tower_index(level);
            loop {
                match self.find_splice(key, level, guard) {
                    Splice::HeadTooLow => self.grow_head(height),
                    Splice::Conflict => {
                        // SAFETY: the reference taken above was not used.
                        unsafe { Node::release_link(z, guard) };
                        self.abort_index(key, guard);
                        return;
                    }
                    Splice::At { q, r } => {
                        if z_ref.is_deleted() {
                            // SAFETY: as above.
                            unsafe { Node::release_link(z, guard) };
                            self.abort_index(key, guard);
                            return;
                        }

                        // SAFETY: `q` was reached under `guard`; `index` is
                        // not linked anywhere yet.
                        if unsafe { (*q).link(r, index) } {
                            trace_log!(level = level, key = ?key, "linked index");
                            break;
                        }
                        bump(&RETRY_COUNT);
                    }
                }
            }
        }

        if z_ref.is_deleted() {
            self.find_node(key, guard);
        }
    }

    fn abort_index(&self, key: &[u8], guard: &LocalGuard<'_>) {
        bump(&INDEX_ABORT_COUNT);
        debug_log!(key = ?key, "index insertion abandoned for deleted node");
        self.find_node(key, guard);
    }

    /// Locate the insertion point for `key` at `level`, unlinking stale
    /// indexes on the way down.
    fn find_splice(&self, key: &[u8], level: usize, guard: &LocalGuard<'_>) -> Splice<V> {
        'restart: loop {
            let mut q: *mut Index<V> = self.head.load(READ_ORD);
            // SAFETY: head indexes are never freed while the list is alive.
            let mut j: usize = unsafe { (*q).level() };
            if j < level {
                return Splice::HeadTooLow;
            }

            loop {
                // SAFETY: `q` is a head index or was reached from one through
                // an unfrozen link under `guard`.
                let q_ref: &Index<V> = unsafe { &*q };
                let r: *mut Index<V> = q_ref.load_right();

                if is_frozen(r) {
                    bump(&RETRY_COUNT);
                    continue 'restart;
                }

                let mut order: Ordering = Ordering::Less;
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

                    order = key.cmp(n.key());
                    if order == Ordering::Greater {
                        q = r;
                        continue;
                    }
                }

                if j == level {
                    if order == Ordering::Equal {
                        return Splice::Conflict;
                    }
                    return Splice::At { q, r };
                }

                q = q_ref.down();
                j -= 1;
            }
        }
    }

    /// Raise the head to at least `height` levels.
    ///
    /// A level dropped by [`try_reduce_level`](Self::try_reduce_level) is
    /// reinstalled rather than reallocated, so the registry holds at most one
    /// column per level. Any index linked into it after the drop becomes
    /// reachable again and is unlinked by ordinary traversal.
    pub(crate) fn grow_head(&self, height: usize) {
        // Growers are serialized on the registry so each level has one column.
        let mut heads = self.heads.lock();
        loop {
            let old: *mut Index<V> = self.head.load(READ_ORD);
            // SAFETY: head indexes are never freed while the list is alive.
            let old_level: usize = unsafe { (*old).level() };
            if old_level >= height {
                return;
            }

            let mut fresh: Vec<*mut Index<V>> = Vec::new();
            let mut top: *mut Index<V> = old;
            for level in old_level + 1..=height {
                let below: *mut Index<V> = top;
                top = match registered_column(&heads, level, below) {
                    Some(column) => column,
                    None => {
                        let column = Box::into_raw(Index::new_head(self.base, below, level));
                        fresh.push(column);
                        column
                    }
                };
            }

            if self
                .head
                .compare_exchange(old, top, CAS_SUCCESS, CAS_FAILURE)
                .is_ok()
            {
                heads.extend(fresh);
                bump(&HEAD_GROW_COUNT);
                debug_log!(from = old_level, to = height, "head grown");
                return;
            }

            for index in fresh {
                // SAFETY: the new head column lost its CAS and was never shared.
                unsafe { drop(Box::from_raw(index)) };
            }
            bump(&RETRY_COUNT);
        }
    }

    /// Drop the top head level if the top three levels all look empty.
    ///
    /// A level that gains an entry between the check and the CAS is restored
    /// immediately. Missing a reduction is harmless.
    pub(crate) fn try_reduce_level(&self) {
        let h: *mut Index<V> = self.head.load(READ_ORD);
        // SAFETY: head indexes are never freed while the list is alive.
        let h_ref: &Index<V> = unsafe { &*h };
        if h_ref.level() <= REDUCE_MIN_LEVEL {
            return;
        }

        let d: *mut Index<V> = h_ref.down();
        // SAFETY: a head above level 3 has at least two head levels below it.
        let d_ref: &Index<V> = unsafe { &*d };
        // SAFETY: as above.
        let e_ref: &Index<V> = unsafe { &*d_ref.down() };

        if !e_ref.load_right().is_null()
            || !d_ref.load_right().is_null()
            || !h_ref.load_right().is_null()
        {
            return;
        }

        if self
            .head
            .compare_exchange(h, d, CAS_SUCCESS, CAS_FAILURE)
            .is_err()
        {
            return;
        }

        if h_ref.load_right().is_null() {
            bump(&HEAD_REDUCE_COUNT);
            debug_log!(from = h_ref.level(), to = d_ref.level(), "head reduced");
        } else {
            // Someone linked into the dropped level meanwhile.
            let _ = self
                .head
                .compare_exchange(d, h, CAS_SUCCESS, CAS_FAILURE);
        }
    }
}

/// The registered head index at `level` whose `down` is `below`, if any.
fn registered_column<V>(
    heads: &[*mut Index<V>],
    level: usize,
    below: *mut Index<V>,
) -> Option<*mut Index<V>> {
    heads.iter().copied().find(|&column| {
        // SAFETY: registered head indexes are never freed while the list is alive.
        let column_ref: &Index<V> = unsafe { &*column };
        column_ref.level() == level && column_ref.down() == below
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SkipListConfig;
    use crate::level::LevelGenerator;

    /// Always draws the same level.
    struct FixedLevels(usize);

    impl LevelGenerator for FixedLevels {
        fn random_level(&self, max_level: usize) -> usize {
            self.0.min(max_level)
        }
    }

    #[test]
    fn test_head_grows_one_level_at_a_time() {
        let list: SkipList<u64> =
            SkipList::with_level_generator(SkipListConfig::default(), FixedLevels(10));
        assert_eq!(list.height(), 1);

        // Tower height is capped at one above the current head.
        list.put(b"a", 1).unwrap();
        assert_eq!(list.height(), 2);
        list.put(b"b", 2).unwrap();
        assert_eq!(list.height(), 3);

        for i in 0..20u64 {
            list.put(format!("k{i:02}").as_bytes(), i).unwrap();
        }
        assert_eq!(list.height(), 10);
    }

    #[test]
    fn test_height_respects_max_level() {
        let config = SkipListConfig::default().with_max_level(4);
        let list: SkipList<u64> = SkipList::with_level_generator(config, FixedLevels(32));

        for i in 0..50u64 {
            list.put(format!("k{i:02}").as_bytes(), i).unwrap();
        }
        assert_eq!(list.height(), 4);
    }

    #[test]
    fn test_head_reduces_when_emptied() {
        let list: SkipList<u64> =
            SkipList::with_level_generator(SkipListConfig::default(), FixedLevels(6));

        for i in 0..10u64 {
            list.put(format!("k{i}").as_bytes(), i).unwrap();
        }
        assert_eq!(list.height(), 6);

        for i in 0..10u64 {
            list.remove(format!("k{i}").as_bytes()).unwrap();
        }
        assert!(list.is_empty());

        // Every removal that empties the top lane may drop one level, but
        // never below the point where three empty levels can be observed.
        let height = list.height();
        assert!(height < 6, "height stayed at {height}");
        assert!(height >= REDUCE_MIN_LEVEL);
    }

    #[test]
    fn test_head_registry_bounded_across_grow_reduce_cycles() {
        let list: SkipList<u64> =
            SkipList::with_level_generator(SkipListConfig::default(), FixedLevels(6));

        for round in 0..2_000u64 {
            for i in 0..4u64 {
                list.put(format!("k{i}").as_bytes(), round).unwrap();
            }
            for i in 0..4u64 {
                list.remove(format!("k{i}").as_bytes()).unwrap();
            }
        }

        assert!(list.is_empty());
        assert!(list.height() <= 6);
        // One column per level: dropped levels are reinstalled, not reallocated.
        let registered = list.heads.lock().len();
        assert!(registered <= 6, "registry grew to {registered} columns");

        // Reinstalled levels still route lookups correctly.
        for i in 0..4u64 {
            list.put(format!("k{i}").as_bytes(), i).unwrap();
        }
        for i in 0..4u64 {
            assert_eq!(*list.get(format!("k{i}").as_bytes()).unwrap().unwrap(), i);
        }
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_every_node_indexed_at_level_one() {
        let list: SkipList<u64> =
            SkipList::with_level_generator(SkipListConfig::default(), FixedLevels(1));
        for i in 0..5u64 {
            list.put(format!("k{i}").as_bytes(), i).unwrap();
        }

        let guard = list.guard();
        // SAFETY: head indexes live as long as the list.
        let head: &Index<u64> = unsafe { &*list.head.load(READ_ORD) };
        let mut count = 0;
        let mut r = head.load_right();
        while !r.is_null() {
            count += 1;
            // SAFETY: linked index read under `guard`.
            r = unsafe { (*r).load_right() };
        }
        drop(guard);
        assert_eq!(count, 5);
    }
}
