//! Whole-tree invariant verification. Not on any hot path: this walks every
//! page once, checking key ordering, fanout bounds, separator placement,
//! leaf-ring linkage, and level alignment against invariants (1)-(6). Used
//! by the integration and property tests after each scripted mutation
//! sequence; also exposed to callers as a debugging aid.

use std::ptr::NonNull;

use crate::alloc::PageAllocator;
use crate::comparator::KeyComparator;
use crate::layout::{carve_branch, carve_leaf, NodeTag};
use crate::BPlusTreeMap;

struct ScanState<K> {
    total_items: usize,
    prev_leaf: Option<NonNull<u8>>,
    prev_key: Option<K>,
    leaf_depth: Option<usize>,
}

impl<K: Clone, V, C: KeyComparator<K>, A: PageAllocator> BPlusTreeMap<K, V, C, A> {
    /// Scan the whole tree and check invariants (1)-(6) from the data model.
    /// Returns the first violation found, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut state = ScanState {
            total_items: 0,
            prev_leaf: None,
            prev_key: None,
            leaf_depth: None,
        };

        let root = match self.root {
            None => {
                if self.first_leaf.is_some() || self.last_leaf.is_some() {
                    return Err("empty tree must not cache a first/last leaf".into());
                }
                if self.len != 0 {
                    return Err("empty tree must report len() == 0".into());
                }
                return Ok(());
            }
            Some(root) => root,
        };

        unsafe { self.verify_node(root, None, None, true, 0, &mut state)? };

        if state.total_items != self.len {
            return Err(format!(
                "element counter ({}) does not match the sum of leaf sizes ({})",
                self.len, state.total_items
            ));
        }
        match state.prev_leaf {
            Some(last) => {
                if Some(last) != self.last_leaf {
                    return Err("last_leaf does not match the tail of the leaf ring".into());
                }
                let next = unsafe { *carve_leaf::<(), ()>(last, &self.leaf_layout).next_ptr };
                if !next.is_null() {
                    return Err("tail leaf's next pointer is not null".into());
                }
            }
            None => return Err("a non-empty tree scanned zero leaves".into()),
        }
        Ok(())
    }

    unsafe fn verify_node(
        &self,
        page: NonNull<u8>,
        lower: Option<&K>,
        upper: Option<&K>,
        is_root: bool,
        depth: usize,
        state: &mut ScanState<K>,
    ) -> Result<(), String> {
        match (*(page.as_ptr() as *const crate::layout::NodeHdr)).tag {
            NodeTag::Leaf => self.verify_leaf(page, lower, upper, is_root, depth, state),
            NodeTag::Branch => self.verify_branch(page, lower, upper, is_root, depth, state),
        }
    }

    unsafe fn verify_leaf(
        &self,
        leaf: NonNull<u8>,
        lower: Option<&K>,
        upper: Option<&K>,
        is_root: bool,
        depth: usize,
        state: &mut ScanState<K>,
    ) -> Result<(), String> {
        let parts = carve_leaf::<K, V>(leaf, &self.leaf_layout);
        let len = (*parts.hdr).len as usize;

        if len > self.leaf_layout.cap as usize {
            return Err(format!(
                "leaf holds {len} entries, exceeding LEAF_MAX {}",
                self.leaf_layout.cap
            ));
        }
        if is_root && len == 0 {
            return Err("a leaf root must not be empty; an empty tree has no root".into());
        }
        if !is_root && len < self.leaf_layout.min as usize {
            return Err(format!(
                "non-root leaf holds {len} entries, below LEAF_MIN {}",
                self.leaf_layout.min
            ));
        }

        let keys = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
        for w in keys.windows(2) {
            if !self.cmp.precedes(&w[0], &w[1]) {
                return Err("leaf keys are not strictly ascending".into());
            }
        }
        if let Some(low) = lower {
            if !self.cmp.precedes(low, &keys[0]) && self.cmp.precedes(&keys[0], low) {
                return Err("leaf's first key falls below its governing separator".into());
            }
        }
        if let Some(high) = upper {
            if !self.cmp.precedes(&keys[len - 1], high) {
                return Err("leaf's last key does not fall below its governing separator".into());
            }
        }

        match state.leaf_depth {
            Some(d) if d != depth => return Err("leaves are not all at the same depth".into()),
            Some(_) => {}
            None => state.leaf_depth = Some(depth),
        }

        match state.prev_leaf {
            Some(prev) => {
                let prev_next = *carve_leaf::<(), ()>(prev, &self.leaf_layout).next_ptr;
                if prev_next != leaf.as_ptr() {
                    return Err("leaf ring's forward link is broken".into());
                }
                if *parts.prev_ptr != prev.as_ptr() {
                    return Err("leaf ring's backward link is broken".into());
                }
                if let Some(pk) = &state.prev_key {
                    if !self.cmp.precedes(pk, &keys[0]) {
                        return Err("leaf ring is not globally ascending".into());
                    }
                }
            }
            None => {
                if Some(leaf) != self.first_leaf {
                    return Err("the first leaf visited does not match first_leaf".into());
                }
                if !(*parts.prev_ptr).is_null() {
                    return Err("head leaf's prev pointer is not null".into());
                }
            }
        }

        state.prev_leaf = Some(leaf);
        state.prev_key = Some(keys[len - 1].clone());
        state.total_items += len;
        Ok(())
    }

    unsafe fn verify_branch(
        &self,
        branch: NonNull<u8>,
        lower: Option<&K>,
        upper: Option<&K>,
        is_root: bool,
        depth: usize,
        state: &mut ScanState<K>,
    ) -> Result<(), String> {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;

        if len > self.branch_layout.cap as usize {
            return Err(format!(
                "branch holds {len} separators, exceeding NODE_MAX {}",
                self.branch_layout.cap
            ));
        }
        if is_root && len == 0 {
            return Err("a branch root with one child should have collapsed".into());
        }
        if !is_root && len < self.branch_layout.min as usize {
            return Err(format!(
                "non-root branch holds {len} separators, below NODE_MIN {}",
                self.branch_layout.min
            ));
        }

        let seps = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
        for w in seps.windows(2) {
            if !self.cmp.precedes(&w[0], &w[1]) {
                return Err("branch separators are not strictly ascending".into());
            }
        }

        let children = std::slice::from_raw_parts(parts.children_ptr as *const *mut u8, len + 1);
        for (i, &child_ptr) in children.iter().enumerate() {
            let child =
                NonNull::new(child_ptr).ok_or_else(|| "branch child pointer is null".to_string())?;
            let child_lower = if i == 0 { lower } else { Some(&seps[i - 1]) };
            let child_upper = if i == len { upper } else { Some(&seps[i]) };
            self.verify_node(child, child_lower, child_upper, false, depth + 1, state)?;
        }
        Ok(())
    }
}
