//! Drop and `clear()` must free every allocated page and drop every stored
//! `(K, V)` exactly once, across single-leaf trees, multi-level trees, and
//! trees that have been shrunk back down by removals.

use bplustree::BPlusTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A wrapper type that tracks construction and destruction. `clone` also
/// increments the counter: the tree clones keys into separators during
/// splits and rebalances, and each such clone is a live, independently
/// dropped instance that must be counted.
struct DropCounter {
    id: usize,
    counter: Arc<AtomicUsize>,
}

impl DropCounter {
    fn new(id: usize, counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { id, counter }
    }
}

impl Clone for DropCounter {
    fn clone(&self) -> Self {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Self {
            id: self.id,
            counter: self.counter.clone(),
        }
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PartialEq for DropCounter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for DropCounter {}

impl PartialOrd for DropCounter {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DropCounter {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

fn tree_with_cap(cap: u16) -> BPlusTreeMap<DropCounter, DropCounter> {
    BPlusTreeMap::with_exact_capacity(bplustree::OrdComparator, cap, cap)
        .expect("exact-capacity config is valid")
}

#[test]
fn drop_frees_all_memory_single_leaf() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let mut tree = tree_with_cap(10);
        for i in 0..5 {
            let key = DropCounter::new(i, counter.clone());
            let val = DropCounter::new(i + 1000, counter.clone());
            tree.insert(key, val).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
    assert_eq!(
        counter.load(Ordering::SeqCst),
        0,
        "memory leak: not all objects were dropped"
    );
}

#[test]
fn drop_frees_all_memory_multi_level_tree() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let mut tree = tree_with_cap(5);
        for i in 0..100 {
            let key = DropCounter::new(i, counter.clone());
            let val = DropCounter::new(i + 10000, counter.clone());
            tree.insert(key, val).unwrap();
        }
        // At least 200 (100 keys + 100 values); a cap-5 tree holding 100 items
        // has several branch levels, each separator an extra live clone.
        assert!(counter.load(Ordering::SeqCst) >= 200);
        tree.check_invariants().unwrap();
    }
    assert_eq!(
        counter.load(Ordering::SeqCst),
        0,
        "memory leak in multi-level tree: not all objects were dropped"
    );
}

#[test]
fn clear_frees_all_memory() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tree = tree_with_cap(5);

    for i in 0..50 {
        let key = DropCounter::new(i, counter.clone());
        let val = DropCounter::new(i + 5000, counter.clone());
        tree.insert(key, val).unwrap();
    }
    assert!(counter.load(Ordering::SeqCst) >= 100);

    tree.clear();
    assert_eq!(
        counter.load(Ordering::SeqCst),
        0,
        "memory leak: clear() did not drop all objects"
    );
    assert_eq!(tree.len(), 0);
    assert!(tree.is_empty());
}

#[test]
fn clear_and_reuse_with_drop_tracking() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tree = tree_with_cap(5);

    for batch_start in [0usize, 100, 200] {
        let batch_len = if batch_start == 200 { 10 } else { 30 };
        for i in batch_start..batch_start + batch_len {
            let key = DropCounter::new(i, counter.clone());
            let val = DropCounter::new(i + 3000, counter.clone());
            tree.insert(key, val).unwrap();
        }
        assert!(counter.load(Ordering::SeqCst) >= batch_len * 2);
        tree.clear();
        assert_eq!(
            counter.load(Ordering::SeqCst),
            0,
            "clear() after batch starting at {batch_start} leaked memory"
        );
    }
}

#[test]
fn drop_after_removes() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let mut tree = tree_with_cap(5);
        for i in 0..50 {
            let key = DropCounter::new(i, counter.clone());
            let val = DropCounter::new(i + 6000, counter.clone());
            tree.insert(key, val).unwrap();
        }
        assert!(counter.load(Ordering::SeqCst) >= 100);

        for i in 10..30 {
            let key = DropCounter::new(i, counter.clone());
            assert!(tree.remove(&key).is_some());
        }
        tree.check_invariants().unwrap();
        assert!(counter.load(Ordering::SeqCst) >= 60);
    }
    assert_eq!(
        counter.load(Ordering::SeqCst),
        0,
        "memory leak after removes and drop"
    );
}

#[test]
fn drop_with_complex_tree_structure() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let mut tree = tree_with_cap(4);
        for i in 0..200 {
            let key = DropCounter::new(i, counter.clone());
            let val = DropCounter::new(i + 20000, counter.clone());
            tree.insert(key, val).unwrap();
        }
        let initial = counter.load(Ordering::SeqCst);
        assert!(initial >= 400);

        for i in (50..150).step_by(2) {
            let key = DropCounter::new(i, counter.clone());
            tree.remove(&key);
        }
        tree.check_invariants().unwrap();
        assert!(counter.load(Ordering::SeqCst) < initial);
    }
    assert_eq!(
        counter.load(Ordering::SeqCst),
        0,
        "memory leak in complex tree structure"
    );
}

#[test]
fn multiple_clear_cycles() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tree = tree_with_cap(5);

    for cycle in 0..10 {
        for i in 0..20 {
            let key = DropCounter::new(cycle * 1000 + i, counter.clone());
            let val = DropCounter::new(cycle * 1000 + i + 50000, counter.clone());
            tree.insert(key, val).unwrap();
        }
        assert!(counter.load(Ordering::SeqCst) >= 40);
        tree.clear();
        assert_eq!(
            counter.load(Ordering::SeqCst),
            0,
            "cycle {cycle} leaked memory after clear"
        );
    }
}

#[test]
fn drop_with_string_values() {
    let mut tree: BPlusTreeMap<i32, String> =
        BPlusTreeMap::with_exact_capacity(bplustree::OrdComparator, 5, 5).unwrap();
    for i in 0..100 {
        tree.insert(i, format!("value_{i}_with_long_string_data")).unwrap();
    }
    assert_eq!(tree.len(), 100);
}

#[test]
fn clear_empty_tree() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tree = tree_with_cap(5);

    tree.clear();
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let key = DropCounter::new(1, counter.clone());
    let val = DropCounter::new(2, counter.clone());
    tree.insert(key, val).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    tree.clear();
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    tree.clear();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn minimal_clear() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tree = tree_with_cap(10);

    for i in 0..3 {
        let key = DropCounter::new(i, counter.clone());
        let val = DropCounter::new(i + 100, counter.clone());
        tree.insert(key, val).unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 6);

    tree.clear();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn clear_with_twenty_items() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tree = tree_with_cap(5);

    for i in 0..20 {
        let key = DropCounter::new(i, counter.clone());
        let val = DropCounter::new(i + 200, counter.clone());
        tree.insert(key, val).unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 40);
    tree.check_invariants().unwrap();

    tree.clear();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
