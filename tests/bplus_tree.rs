use bplustree::BPlusTreeMap;

fn small_tree() -> BPlusTreeMap<i32, String> {
    BPlusTreeMap::with_exact_capacity(bplustree::OrdComparator, 4, 4)
        .expect("exact-capacity config with cap 4 is valid")
}

#[test]
fn empty_tree_reports_empty() {
    let tree: BPlusTreeMap<i32, String> = small_tree();
    assert_eq!(tree.len(), 0);
    assert!(tree.is_empty());
    assert_eq!(tree.get(&1), None);
}

#[test]
fn insert_is_first_write_wins() {
    let mut tree = small_tree();
    assert!(tree.insert(1, "one".into()).unwrap().1);
    assert_eq!(tree.get(&1), Some(&"one".to_string()));

    // Re-inserting an existing key reports no insertion and leaves the
    // stored value untouched.
    assert!(!tree.insert(1, "uno".into()).unwrap().1);
    assert_eq!(tree.get(&1), Some(&"one".to_string()));
    assert_eq!(tree.len(), 1);
}

#[test]
fn insert_and_get_single_item() {
    let mut tree = small_tree();
    tree.insert(1, "one".into()).unwrap();

    assert_eq!(tree.len(), 1);
    assert!(!tree.is_empty());
    assert_eq!(tree.get(&1), Some(&"one".to_string()));
}

#[test]
fn ascending_inserts_trigger_right_edge_splits() {
    let mut tree = small_tree();
    for k in 0..50 {
        tree.insert(k, k.to_string()).unwrap();
    }
    assert_eq!(tree.len(), 50);
    for k in 0..50 {
        assert_eq!(tree.get(&k), Some(&k.to_string()));
    }
    let collected: Vec<i32> = tree.keys().copied().collect();
    assert_eq!(collected, (0..50).collect::<Vec<_>>());
}

#[test]
fn descending_inserts_trigger_left_edge_splits() {
    let mut tree = small_tree();
    for k in (0..50).rev() {
        tree.insert(k, k.to_string()).unwrap();
    }
    let collected: Vec<i32> = tree.keys().copied().collect();
    assert_eq!(collected, (0..50).collect::<Vec<_>>());
}

#[test]
fn shuffled_inserts_keep_ascending_order() {
    let mut tree = small_tree();
    let order = [7, 2, 9, 0, 5, 3, 8, 1, 6, 4, 15, 12, 11, 14, 13, 10];
    for k in order {
        tree.insert(k, k.to_string()).unwrap();
    }
    let collected: Vec<i32> = tree.keys().copied().collect();
    assert_eq!(collected, (0..16).collect::<Vec<_>>());
}

#[test]
fn contains_key_matches_get() {
    let mut tree = small_tree();
    tree.insert(3, "three".into()).unwrap();
    assert!(tree.contains_key(&3));
    assert!(!tree.contains_key(&4));
}

#[test]
fn get_mut_writes_through() {
    let mut tree = small_tree();
    tree.insert(1, "one".into()).unwrap();
    *tree.get_mut(&1).unwrap() = "ONE".into();
    assert_eq!(tree.get(&1), Some(&"ONE".to_string()));
}

#[test]
fn lower_and_upper_bound_cursors() {
    let mut tree = small_tree();
    for k in [10, 20, 30, 40] {
        tree.insert(k, k.to_string()).unwrap();
    }
    let lb = tree.lower_bound(&25);
    assert_eq!(lb.get(&tree), Some((&30, &"30".to_string())));

    let ub = tree.upper_bound(&30);
    assert_eq!(ub.get(&tree), Some((&40, &"40".to_string())));

    let exact = tree.lower_bound(&30);
    assert_eq!(exact.get(&tree), Some((&30, &"30".to_string())));
}

#[test]
fn equal_range_is_empty_or_singleton() {
    let mut tree = small_tree();
    tree.insert(5, "five".into()).unwrap();

    let (lo, hi) = tree.equal_range(&5);
    assert_ne!(lo, hi);
    assert_eq!(lo.get(&tree), Some((&5, &"five".to_string())));

    let (lo, hi) = tree.equal_range(&6);
    assert_eq!(lo, hi);
}
