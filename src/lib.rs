//! # `skiplist`
//!
//! A lock-free concurrent ordered map from byte-string keys to values, built
//! on a multi-level skip list.
//!
//! The map is a sorted singly linked chain of data nodes plus a stack of
//! sparse index lanes. Writers never take a lock: insertion is a CAS on a
//! predecessor's `next` pointer, replacement a CAS on the value slot, and
//! removal a two-phase protocol (clear the value, then append a marker and
//! splice the node out). Any thread that meets a half-finished removal helps
//! finish it.
//!
//! | Feature | Status |
//! |---------|--------|
//! | Point reads and writes | Lock-free, linearizable per key |
//! | Nearest-key queries | Ceiling, floor, higher, lower |
//! | Bounded range views | Ascending and descending, weakly consistent |
//! | Memory reclamation | `seize`, nodes freed once fully unlinked |
//!
//! ## Thread Safety
//!
//! `SkipList<V>` is `Send + Sync` when `V: Send + Sync`. Share it by
//! reference or behind an `Arc`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use skiplist::SkipList;
//!
//! let list: Arc<SkipList<u64>> = Arc::new(SkipList::new());
//!
//! let handles: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let list = Arc::clone(&list);
//!         thread::spawn(move || {
//!             for i in 0..100u64 {
//!                 list.put(format!("{t}-{i:03}").as_bytes(), i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(list.len(), 400);
//! assert_eq!(*list.get(b"2-042").unwrap().unwrap(), 42);
//! ```
//!
//! ## Key Constraints
//!
//! - Keys are byte slices (`&[u8]`) compared lexicographically.
//! - The empty key is reserved and rejected with [`Error::EmptyKey`].
//!
//! ## Value Storage
//!
//! Values are stored as `Arc<V>`. Reads return a clone of the `Arc`, so a
//! value outlives its removal for as long as a caller holds it.
//!
//! ## Range Views
//!
//! ```rust
//! use skiplist::SkipList;
//!
//! let list: SkipList<u32> = SkipList::new();
//! for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
//!     list.put(key.as_bytes(), i as u32).unwrap();
//! }
//!
//! let view = list.range(Some(b"b".as_slice()), None, true).unwrap();
//! let keys: Vec<Vec<u8>> = view.iter().map(|(k, _)| k).collect();
//! assert_eq!(keys, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec()]);
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Hot-path accessors are tiny and called from every traversal step.
#![allow(clippy::inline_always)]

mod tracing_helpers;

pub mod config;
pub mod counters;
pub mod error;
pub mod level;
pub mod ordering;
pub mod range;

mod index;
mod node;
mod reclaim;
mod skiplist;

// Re-export main types for convenience
pub use config::SkipListConfig;
pub use counters::{DebugCounters, get_debug_counters, reset_debug_counters};
pub use error::{Error, Result};
pub use level::{LevelGenerator, RngLevels, XorShiftLevels};
pub use range::{Iter, RangeView};
pub use skiplist::{Entry, Relation, SkipList};
