//! Insertion: locate-and-write at a leaf, propagate splits upward one level
//! at a time, grow the root when the split reaches it.
//!
//! Leaf splits copy their separator (the right half's first key) up to the
//! parent, since every key still lives in the leaf chain regardless of what
//! branches point at it. Branch splits instead promote the median separator
//! itself — it is not duplicated anywhere else, so it moves rather than
//! copies.

use std::ptr;
use std::ptr::NonNull;

use crate::alloc::PageAllocator;
use crate::comparator::KeyComparator;
use crate::cursor::Cursor;
use crate::error::BPlusTreeError;
use crate::layout::{carve_branch, carve_leaf, NodeTag};
use crate::node::search_keys;
use crate::BPlusTreeMap;

struct SplitInfo<K> {
    sep: K,
    right: NonNull<u8>,
}

enum InsertOutcome<K, V> {
    /// The key was already present; `value` was dropped unused and nothing
    /// in the tree changed.
    AlreadyPresent,
    Done {
        split: Option<SplitInfo<K>>,
        /// `Some(new_min)` when this subtree's minimum key changed and has
        /// not yet been matched against a governing separator above it.
        front_min: Option<K>,
    },
}

impl<K: Clone, V, C: KeyComparator<K>, A: PageAllocator> BPlusTreeMap<K, V, C, A> {
    /// Insert `key`/`value`. First write wins: if `key` is already present,
    /// the existing value is left untouched and `value` is simply dropped.
    /// Returns a cursor to the entry (newly inserted or already there)
    /// alongside `true` iff the entry was newly inserted.
    pub fn insert(&mut self, key: K, value: V) -> Result<(Cursor<K, V>, bool), BPlusTreeError> {
        if self.root.is_none() {
            let leaf = unsafe { self.allocator.alloc_leaf(&self.leaf_layout) }
                .ok_or(BPlusTreeError::OutOfMemory)?;
            self.root = Some(leaf);
            self.first_leaf = Some(leaf);
            self.last_leaf = Some(leaf);
        }
        self.stamp = self.stamp.wrapping_add(1);
        let root = self.root.unwrap();
        let outcome = unsafe { self.insert_into(root, &key, value)? };
        let inserted = match outcome {
            InsertOutcome::AlreadyPresent => false,
            InsertOutcome::Done { split, .. } => {
                self.len += 1;
                if let Some(SplitInfo { sep, right }) = split {
                    self.grow_root(sep, right)?;
                }
                tracing::trace!(len = self.len, "insert complete");
                true
            }
        };
        let loc = self
            .locate_leaf(&key)
            .expect("key was just inserted or already present");
        let cursor = Cursor::new(Some((loc.leaf, loc.index)), self.stamp);
        Ok((cursor, inserted))
    }

    fn grow_root(&mut self, sep: K, right: NonNull<u8>) -> Result<(), BPlusTreeError> {
        let old_root = self.root.expect("grow_root requires an existing root");
        let level = unsafe { crate::node::page_level(old_root) } + 1;
        let new_root = unsafe { self.allocator.alloc_branch(&self.branch_layout, level) }
            .ok_or(BPlusTreeError::OutOfMemory)?;
        unsafe {
            let parts = carve_branch::<K>(new_root, &self.branch_layout);
            ptr::write(parts.children_ptr as *mut *mut u8, old_root.as_ptr());
            ptr::write((parts.children_ptr as *mut *mut u8).add(1), right.as_ptr());
            ptr::write(parts.keys_ptr as *mut K, sep);
            (*parts.hdr).len = 1;
        }
        self.root = Some(new_root);
        tracing::debug!(new_level = level, "root split, tree grew one level");
        Ok(())
    }

    unsafe fn insert_into(
        &mut self,
        page: NonNull<u8>,
        key: &K,
        value: V,
    ) -> Result<InsertOutcome<K, V>, BPlusTreeError> {
        match (*(page.as_ptr() as *const crate::layout::NodeHdr)).tag {
            NodeTag::Leaf => self.insert_leaf(page, key, value),
            NodeTag::Branch => self.insert_branch(page, key, value),
        }
    }

    unsafe fn insert_leaf(
        &mut self,
        leaf: NonNull<u8>,
        key: &K,
        value: V,
    ) -> Result<InsertOutcome<K, V>, BPlusTreeError> {
        let parts = carve_leaf::<K, V>(leaf, &self.leaf_layout);
        let len = (*parts.hdr).len as usize;
        let keys = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
        match search_keys(keys, key, &self.cmp) {
            // `value` is simply dropped here: first write wins, so a
            // duplicate key never touches the entry already stored.
            Ok(_idx) => Ok(InsertOutcome::AlreadyPresent),
            Err(idx) => {
                let front_min = if idx == 0 { Some(key.clone()) } else { None };
                if len < self.leaf_layout.cap as usize {
                    self.leaf_insert_at(leaf, idx, key.clone(), value);
                    Ok(InsertOutcome::Done {
                        split: None,
                        front_min,
                    })
                } else {
                    let (right, sep) = self.split_leaf_and_insert(leaf, idx, key.clone(), value)?;
                    Ok(InsertOutcome::Done {
                        split: Some(SplitInfo { sep, right }),
                        front_min,
                    })
                }
            }
        }
    }

    unsafe fn leaf_insert_at(&mut self, leaf: NonNull<u8>, idx: usize, key: K, value: V) {
        let parts = carve_leaf::<K, V>(leaf, &self.leaf_layout);
        let len = (*parts.hdr).len as usize;
        let kp = parts.keys_ptr as *mut K;
        let vp = parts.vals_ptr as *mut V;
        if idx < len {
            ptr::copy(kp.add(idx), kp.add(idx + 1), len - idx);
            ptr::copy(vp.add(idx), vp.add(idx + 1), len - idx);
        }
        ptr::write(kp.add(idx), key);
        ptr::write(vp.add(idx), value);
        (*parts.hdr).len = (len + 1) as u16;
    }

    unsafe fn split_leaf_and_insert(
        &mut self,
        leaf: NonNull<u8>,
        idx: usize,
        key: K,
        value: V,
    ) -> Result<(NonNull<u8>, K), BPlusTreeError> {
        let parts = carve_leaf::<K, V>(leaf, &self.leaf_layout);
        let len = (*parts.hdr).len as usize;
        let kp = parts.keys_ptr as *mut K;
        let vp = parts.vals_ptr as *mut V;

        let mut keys: Vec<K> = Vec::with_capacity(len + 1);
        let mut vals: Vec<V> = Vec::with_capacity(len + 1);
        for i in 0..idx {
            keys.push(ptr::read(kp.add(i)));
            vals.push(ptr::read(vp.add(i)));
        }
        keys.push(key);
        vals.push(value);
        for i in idx..len {
            keys.push(ptr::read(kp.add(i)));
            vals.push(ptr::read(vp.add(i)));
        }

        let total = len + 1;
        let mid = total / 2;

        let right = self
            .allocator
            .alloc_leaf(&self.leaf_layout)
            .ok_or(BPlusTreeError::OutOfMemory)?;
        let rparts = carve_leaf::<K, V>(right, &self.leaf_layout);
        let rkp = rparts.keys_ptr as *mut K;
        let rvp = rparts.vals_ptr as *mut V;

        let mut keys_iter = keys.into_iter();
        let mut vals_iter = vals.into_iter();
        for i in 0..mid {
            ptr::write(kp.add(i), keys_iter.next().unwrap());
            ptr::write(vp.add(i), vals_iter.next().unwrap());
        }
        (*parts.hdr).len = mid as u16;

        let mut j = 0usize;
        for (k, v) in keys_iter.zip(vals_iter) {
            ptr::write(rkp.add(j), k);
            ptr::write(rvp.add(j), v);
            j += 1;
        }
        (*rparts.hdr).len = j as u16;

        let old_next = *parts.next_ptr;
        ptr::write(rparts.next_ptr, old_next);
        ptr::write(rparts.prev_ptr, leaf.as_ptr());
        ptr::write(parts.next_ptr, right.as_ptr());
        match NonNull::new(old_next) {
            Some(next) => {
                let nparts = carve_leaf::<(), ()>(next, &self.leaf_layout);
                ptr::write(nparts.prev_ptr, right.as_ptr());
            }
            None => self.last_leaf = Some(right),
        }

        let sep = (&*(rkp as *const K)).clone();
        tracing::trace!(left_len = mid, right_len = j, "leaf split");
        Ok((right, sep))
    }

    unsafe fn insert_branch(
        &mut self,
        branch: NonNull<u8>,
        key: &K,
        value: V,
    ) -> Result<InsertOutcome<K, V>, BPlusTreeError> {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;
        let seps = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
        let child_idx = match search_keys(seps, key, &self.cmp) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        let children = std::slice::from_raw_parts(parts.children_ptr as *const *mut u8, len + 1);
        let child = NonNull::new(children[child_idx]).expect("branch child pointer must be non-null");

        let (child_split, mut front_min) = match self.insert_into(child, key, value)? {
            InsertOutcome::AlreadyPresent => return Ok(InsertOutcome::AlreadyPresent),
            InsertOutcome::Done { split, front_min } => (split, front_min),
        };

        if let Some(new_min) = front_min {
            if child_idx > 0 {
                drop(ptr::replace((parts.keys_ptr as *mut K).add(child_idx - 1), new_min));
                front_min = None;
            } else {
                front_min = Some(new_min);
            }
        }

        let split = match child_split {
            None => None,
            Some(SplitInfo { sep, right }) => {
                if len < self.branch_layout.cap as usize {
                    self.branch_insert_at(branch, child_idx, sep, right);
                    None
                } else {
                    Some(self.split_branch_and_insert(branch, child_idx, sep, right)?)
                }
            }
        };

        Ok(InsertOutcome::Done { split, front_min })
    }

    unsafe fn branch_insert_at(&mut self, branch: NonNull<u8>, idx: usize, sep: K, right: NonNull<u8>) {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;
        let kp = parts.keys_ptr as *mut K;
        let cp = parts.children_ptr as *mut *mut u8;
        if idx < len {
            ptr::copy(kp.add(idx), kp.add(idx + 1), len - idx);
        }
        ptr::write(kp.add(idx), sep);
        if idx + 1 <= len {
            ptr::copy(cp.add(idx + 1), cp.add(idx + 2), len - idx);
        }
        ptr::write(cp.add(idx + 1), right.as_ptr());
        (*parts.hdr).len = (len + 1) as u16;
    }

    unsafe fn split_branch_and_insert(
        &mut self,
        branch: NonNull<u8>,
        idx: usize,
        sep: K,
        right_child: NonNull<u8>,
    ) -> Result<SplitInfo<K>, BPlusTreeError> {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;
        let kp = parts.keys_ptr as *mut K;
        let cp = parts.children_ptr as *mut *mut u8;

        let mut keys: Vec<K> = Vec::with_capacity(len + 1);
        for i in 0..idx {
            keys.push(ptr::read(kp.add(i)));
        }
        keys.push(sep);
        for i in idx..len {
            keys.push(ptr::read(kp.add(i)));
        }

        let mut children: Vec<*mut u8> = Vec::with_capacity(len + 2);
        for i in 0..=idx {
            children.push(ptr::read(cp.add(i)));
        }
        children.push(right_child.as_ptr());
        for i in (idx + 1)..=len {
            children.push(ptr::read(cp.add(i)));
        }

        let total_keys = len + 1;
        let mid = total_keys / 2;

        let mut keys_iter = keys.into_iter();
        let left_keys: Vec<K> = (&mut keys_iter).take(mid).collect();
        let promoted = keys_iter
            .next()
            .expect("a full branch split always has a median separator");
        let right_keys: Vec<K> = keys_iter.collect();

        let mut children_iter = children.into_iter();
        let left_children: Vec<*mut u8> = (&mut children_iter).take(mid + 1).collect();
        let right_children: Vec<*mut u8> = children_iter.collect();

        for (i, k) in left_keys.into_iter().enumerate() {
            ptr::write(kp.add(i), k);
        }
        for (i, c) in left_children.into_iter().enumerate() {
            ptr::write(cp.add(i), c);
        }
        (*parts.hdr).len = mid as u16;

        let level = (*parts.hdr).level;
        let right_branch = self
            .allocator
            .alloc_branch(&self.branch_layout, level)
            .ok_or(BPlusTreeError::OutOfMemory)?;
        let rparts = carve_branch::<K>(right_branch, &self.branch_layout);
        let rkp = rparts.keys_ptr as *mut K;
        let rcp = rparts.children_ptr as *mut *mut u8;
        let right_len = right_keys.len();
        for (i, k) in right_keys.into_iter().enumerate() {
            ptr::write(rkp.add(i), k);
        }
        for (i, c) in right_children.into_iter().enumerate() {
            ptr::write(rcp.add(i), c);
        }
        (*rparts.hdr).len = right_len as u16;

        tracing::trace!(left_len = mid, right_len, level, "branch split");
        Ok(SplitInfo {
            sep: promoted,
            right: right_branch,
        })
    }
}
