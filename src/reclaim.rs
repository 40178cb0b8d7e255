//! Reclaim helpers for seize-based memory reclamation.
//!
//! This module provides:
//! - Seize callbacks for retired values and retired nodes
//! - Direct deallocation of a node together with its marker
//! - Whole-list teardown for `Drop`

// This module is private, so pub(crate) is effectively the same as pub.
#![allow(clippy::redundant_pub_crate)]

use std::collections::HashSet;
use std::sync::Arc;

use seize::Collector;

use crate::index::{Index, untagged};
use crate::node::Node;

// ============================================================================
//  Seize Callbacks
// ============================================================================

/// Release a value that was replaced or cleared (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Arc::into_raw` and be retired exactly once.
/// - Must only be called after seize determines it's safe (no readers).
pub(crate) unsafe fn reclaim_value<V>(ptr: *mut V, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr came from Arc::into_raw.
    unsafe { drop(Arc::from_raw(ptr.cast_const())) };
}

/// Free a node whose last structural link was released (seize callback).
///
/// # Safety
///
/// - `ptr` must be a data node allocated by [`Node::new_data`].
/// - No structure may still reference it; seize ensures no readers remain.
pub(crate) unsafe fn reclaim_node<V>(ptr: *mut Node<V>, _collector: &Collector) {
    // SAFETY: Caller guarantees validity and exclusive ownership.
    unsafe { dealloc_node(ptr) };
}

// ============================================================================
//  Direct Deallocation
// ============================================================================

/// Free a node, its tower, its value if still present, and the marker that
/// follows it if it has one.
///
/// # Safety
///
/// `ptr` must be a live data node from `Box::into_raw` that nothing else will
/// touch again.
pub(crate) unsafe fn dealloc_node<V>(ptr: *mut Node<V>) {
    // SAFETY: Caller guarantees ptr is valid, and a marker is reachable only
    // through the node it follows.
    let marker: *mut Node<V> = unsafe { marker_of(ptr) };
    // SAFETY: forwarded from the caller.
    unsafe { free_node(ptr, marker) };
}

/// The marker following `ptr`, or null.
///
/// # Safety
///
/// `ptr` and its successor must both be live.
unsafe fn marker_of<V>(ptr: *mut Node<V>) -> *mut Node<V> {
    // SAFETY: forwarded from the caller.
    let next: *mut Node<V> = unsafe { (*ptr).load_next() };
    // SAFETY: forwarded from the caller.
    if !next.is_null() && unsafe { (*next).is_marker() } {
        next
    } else {
        std::ptr::null_mut()
    }
}

/// # Safety
///
/// `ptr` is uniquely owned; `marker` is null or the marker owned by `ptr`.
unsafe fn free_node<V>(ptr: *mut Node<V>, marker: *mut Node<V>) {
    // SAFETY: Caller guarantees ptr is valid and uniquely owned.
    let node: Box<Node<V>> = unsafe { Box::from_raw(ptr) };

    if !marker.is_null() {
        // SAFETY: the marker belongs to `node` alone.
        unsafe { drop(Box::from_raw(marker)) };
    }

    let value: *mut V = node.load_value();
    if !value.is_null() {
        // SAFETY: a non-null value slot owns one Arc strong count.
        unsafe { drop(Arc::from_raw(value.cast_const())) };
    }
}

// ============================================================================
//  Teardown
// ============================================================================

/// Free every node still reachable from the list, then its head indexes and
/// base node.
///
/// Nodes are collected from the data chain and from every head index chain
/// that was ever installed (a node may stay linked at an index level after it
/// left the data chain). Each node is freed exactly once.
///
/// # Safety
///
/// - Requires exclusive access: no guards may be active on the list.
/// - `heads` must contain every head index ever installed, each exactly once.
/// - Nodes already retired to the collector must be unreachable from `base`
///   and from `heads`.
pub(crate) unsafe fn teardown<V>(base: *mut Node<V>, heads: &[*mut Index<V>]) {
    // Uses ptr.addr() for identity (strict provenance compliant).
    let mut visited: HashSet<usize> = HashSet::new();
    // Markers are resolved while every node is still live.
    let mut doomed: Vec<(*mut Node<V>, *mut Node<V>)> = Vec::new();

    // SAFETY: exclusive access; every node on the chain is live.
    let mut cursor: *mut Node<V> = unsafe { (*base).load_next() };
    while !cursor.is_null() {
        // SAFETY: see above.
        let node: &Node<V> = unsafe { &*cursor };
        if !node.is_marker() && visited.insert(cursor.addr()) {
            // SAFETY: see above.
            doomed.push((cursor, unsafe { marker_of(cursor) }));
        }
        cursor = node.load_next();
    }

    for &head in heads {
        // SAFETY: head indexes are live until freed below.
        let mut index: *mut Index<V> = untagged(unsafe { (*head).load_right() });
        while !index.is_null() {
            // SAFETY: a linked index keeps its node alive.
            let entry: &Index<V> = unsafe { &*index };
            let node: *mut Node<V> = entry.node_ptr();
            if visited.insert(node.addr()) {
                // SAFETY: nothing has been freed yet.
                doomed.push((node, unsafe { marker_of(node) }));
            }
            index = untagged(entry.load_right());
        }
    }

    for (node, marker) in doomed {
        // SAFETY: collected once each; towers go with their nodes, so no index
        // is read after this point.
        unsafe { free_node(node, marker) };
    }

    for &head in heads {
        // SAFETY: registry entries are unique Box allocations.
        unsafe { drop(Box::from_raw(head)) };
    }

    // SAFETY: the base node is a Box allocation owned by the list.
    unsafe { drop(Box::from_raw(base)) };
}
