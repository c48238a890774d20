//! Removal: locate-and-drop at a leaf, then repair underflow on the way back
//! up by borrowing from a sibling or merging with one. Underflow at a branch
//! only ever happens after a merge absorbs one of its children — borrowing
//! never changes a branch's own child count, so it never needs to propagate
//! further than the level it happened at.

use std::ptr;
use std::ptr::NonNull;

use crate::alloc::PageAllocator;
use crate::comparator::KeyComparator;
use crate::layout::{carve_branch, carve_leaf, NodeTag};
use crate::node::search_keys;
use crate::BPlusTreeMap;

enum RemoveOutcome<K, V> {
    NotFound,
    Removed {
        value: V,
        underflow: bool,
        front_min: Option<K>,
    },
}

impl<K: Clone, V, C: KeyComparator<K>, A: PageAllocator> BPlusTreeMap<K, V, C, A> {
    /// Remove `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let root = self.root?;
        self.stamp = self.stamp.wrapping_add(1);
        match unsafe { self.remove_from(root, key) } {
            RemoveOutcome::NotFound => None,
            RemoveOutcome::Removed { value, .. } => {
                self.len -= 1;
                unsafe { self.collapse_root_if_needed() };
                tracing::trace!(len = self.len, "remove complete");
                Some(value)
            }
        }
    }

    /// Remove every entry, freeing every page.
    pub fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            unsafe { self.free_subtree(root) };
        }
        self.first_leaf = None;
        self.last_leaf = None;
        self.len = 0;
        self.stamp = self.stamp.wrapping_add(1);
    }

    fn is_root(&self, page: NonNull<u8>) -> bool {
        self.root == Some(page)
    }

    unsafe fn collapse_root_if_needed(&mut self) {
        let root = match self.root {
            Some(r) => r,
            None => return,
        };
        if crate::node::is_leaf(root) {
            if crate::node::page_len(root) == 0 {
                self.allocator
                    .free(root, self.leaf_layout.bytes, self.leaf_layout.max_align);
                self.root = None;
                self.first_leaf = None;
                self.last_leaf = None;
            }
            return;
        }
        let parts = carve_branch::<K>(root, &self.branch_layout);
        if (*parts.hdr).len == 0 {
            let only_child = NonNull::new(*(parts.children_ptr as *mut *mut u8))
                .expect("a branch always has at least one child");
            self.allocator
                .free(root, self.branch_layout.bytes, self.branch_layout.max_align);
            self.root = Some(only_child);
            tracing::debug!("root collapsed, tree height decreased");
        }
    }

    unsafe fn remove_from(&mut self, page: NonNull<u8>, key: &K) -> RemoveOutcome<K, V> {
        match (*(page.as_ptr() as *const crate::layout::NodeHdr)).tag {
            NodeTag::Leaf => self.remove_leaf(page, key),
            NodeTag::Branch => self.remove_branch(page, key),
        }
    }

    unsafe fn remove_leaf(&mut self, leaf: NonNull<u8>, key: &K) -> RemoveOutcome<K, V> {
        let parts = carve_leaf::<K, V>(leaf, &self.leaf_layout);
        let len = (*parts.hdr).len as usize;
        let keys = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
        let idx = match search_keys(keys, key, &self.cmp) {
            Err(_) => return RemoveOutcome::NotFound,
            Ok(idx) => idx,
        };

        let kp = parts.keys_ptr as *mut K;
        let vp = parts.vals_ptr as *mut V;
        drop(ptr::read(kp.add(idx)));
        let value = ptr::read(vp.add(idx));
        let tail = len - idx - 1;
        if tail > 0 {
            ptr::copy(kp.add(idx + 1), kp.add(idx), tail);
            ptr::copy(vp.add(idx + 1), vp.add(idx), tail);
        }
        let new_len = len - 1;
        (*parts.hdr).len = new_len as u16;

        let front_min = if idx == 0 && new_len > 0 {
            Some((&*(kp as *const K)).clone())
        } else {
            None
        };
        let underflow = new_len < self.leaf_layout.min as usize && !self.is_root(leaf);
        RemoveOutcome::Removed {
            value,
            underflow,
            front_min,
        }
    }

    unsafe fn remove_branch(&mut self, branch: NonNull<u8>, key: &K) -> RemoveOutcome<K, V> {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;
        let seps = std::slice::from_raw_parts(parts.keys_ptr as *const K, len);
        let child_idx = match search_keys(seps, key, &self.cmp) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        let children = std::slice::from_raw_parts(parts.children_ptr as *const *mut u8, len + 1);
        let child = NonNull::new(children[child_idx]).expect("branch child pointer must be non-null");

        let (value, underflow, mut front_min) = match self.remove_from(child, key) {
            RemoveOutcome::NotFound => return RemoveOutcome::NotFound,
            RemoveOutcome::Removed {
                value,
                underflow,
                front_min,
            } => (value, underflow, front_min),
        };

        if let Some(new_min) = front_min {
            if child_idx > 0 {
                drop(ptr::replace((parts.keys_ptr as *mut K).add(child_idx - 1), new_min));
                front_min = None;
            } else {
                front_min = Some(new_min);
            }
        }

        if underflow {
            self.fix_underflow(branch, child_idx);
        }

        let new_len = (*parts.hdr).len as usize;
        let still_underflow = new_len < self.branch_layout.min as usize && !self.is_root(branch);
        RemoveOutcome::Removed {
            value,
            underflow: still_underflow,
            front_min,
        }
    }

    unsafe fn can_borrow(&self, page: NonNull<u8>) -> bool {
        let len = crate::node::page_len(page);
        if crate::node::is_leaf(page) {
            len > self.leaf_layout.min as usize
        } else {
            len > self.branch_layout.min as usize
        }
    }

    unsafe fn fix_underflow(&mut self, branch: NonNull<u8>, child_idx: usize) {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;
        let cp = parts.children_ptr as *mut *mut u8;

        let has_left = child_idx > 0;
        let has_right = child_idx < len;

        if has_left {
            let left = NonNull::new(*cp.add(child_idx - 1)).unwrap();
            if self.can_borrow(left) {
                self.borrow_from_left(branch, child_idx);
                return;
            }
        }
        if has_right {
            let right = NonNull::new(*cp.add(child_idx + 1)).unwrap();
            if self.can_borrow(right) {
                self.borrow_from_right(branch, child_idx);
                return;
            }
        }
        if has_left {
            self.merge_children(branch, child_idx - 1);
        } else {
            self.merge_children(branch, child_idx);
        }
    }

    unsafe fn borrow_from_left(&mut self, branch: NonNull<u8>, child_idx: usize) {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let kp = parts.keys_ptr as *mut K;
        let cp = parts.children_ptr as *mut *mut u8;
        let left = NonNull::new(*cp.add(child_idx - 1)).unwrap();
        let child = NonNull::new(*cp.add(child_idx)).unwrap();

        if crate::node::is_leaf(child) {
            let lparts = carve_leaf::<K, V>(left, &self.leaf_layout);
            let llen = (*lparts.hdr).len as usize;
            let lkp = lparts.keys_ptr as *mut K;
            let lvp = lparts.vals_ptr as *mut V;
            let bkey = ptr::read(lkp.add(llen - 1));
            let bval = ptr::read(lvp.add(llen - 1));
            (*lparts.hdr).len = (llen - 1) as u16;

            let cparts = carve_leaf::<K, V>(child, &self.leaf_layout);
            let clen = (*cparts.hdr).len as usize;
            let ckp = cparts.keys_ptr as *mut K;
            let cvp = cparts.vals_ptr as *mut V;
            ptr::copy(ckp, ckp.add(1), clen);
            ptr::copy(cvp, cvp.add(1), clen);
            ptr::write(ckp, bkey);
            ptr::write(cvp, bval);
            (*cparts.hdr).len = (clen + 1) as u16;

            drop(ptr::replace(kp.add(child_idx - 1), (&*(ckp as *const K)).clone()));
        } else {
            let lparts = carve_branch::<K>(left, &self.branch_layout);
            let llen = (*lparts.hdr).len as usize;
            let lkp = lparts.keys_ptr as *mut K;
            let lcp = lparts.children_ptr as *mut *mut u8;
            let bkey = ptr::read(lkp.add(llen - 1));
            let bchild = ptr::read(lcp.add(llen));
            (*lparts.hdr).len = (llen - 1) as u16;

            let cparts = carve_branch::<K>(child, &self.branch_layout);
            let clen = (*cparts.hdr).len as usize;
            let ckp = cparts.keys_ptr as *mut K;
            let ccp = cparts.children_ptr as *mut *mut u8;
            ptr::copy(ckp, ckp.add(1), clen);
            ptr::copy(ccp, ccp.add(1), clen + 1);
            let old_sep = ptr::read(kp.add(child_idx - 1));
            ptr::write(ckp, old_sep);
            ptr::write(ccp, bchild);
            (*cparts.hdr).len = (clen + 1) as u16;

            ptr::write(kp.add(child_idx - 1), bkey);
        }
    }

    unsafe fn borrow_from_right(&mut self, branch: NonNull<u8>, child_idx: usize) {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let kp = parts.keys_ptr as *mut K;
        let cp = parts.children_ptr as *mut *mut u8;
        let child = NonNull::new(*cp.add(child_idx)).unwrap();
        let right = NonNull::new(*cp.add(child_idx + 1)).unwrap();

        if crate::node::is_leaf(child) {
            let rparts = carve_leaf::<K, V>(right, &self.leaf_layout);
            let rlen = (*rparts.hdr).len as usize;
            let rkp = rparts.keys_ptr as *mut K;
            let rvp = rparts.vals_ptr as *mut V;
            let bkey = ptr::read(rkp);
            let bval = ptr::read(rvp);
            ptr::copy(rkp.add(1), rkp, rlen - 1);
            ptr::copy(rvp.add(1), rvp, rlen - 1);
            (*rparts.hdr).len = (rlen - 1) as u16;

            let cparts = carve_leaf::<K, V>(child, &self.leaf_layout);
            let clen = (*cparts.hdr).len as usize;
            let ckp = cparts.keys_ptr as *mut K;
            let cvp = cparts.vals_ptr as *mut V;
            ptr::write(ckp.add(clen), bkey);
            ptr::write(cvp.add(clen), bval);
            (*cparts.hdr).len = (clen + 1) as u16;

            drop(ptr::replace(kp.add(child_idx), (&*(rkp as *const K)).clone()));
        } else {
            let rparts = carve_branch::<K>(right, &self.branch_layout);
            let rlen = (*rparts.hdr).len as usize;
            let rkp = rparts.keys_ptr as *mut K;
            let rcp = rparts.children_ptr as *mut *mut u8;
            let bkey = ptr::read(rkp);
            let bchild = ptr::read(rcp);
            ptr::copy(rkp.add(1), rkp, rlen - 1);
            ptr::copy(rcp.add(1), rcp, rlen);
            (*rparts.hdr).len = (rlen - 1) as u16;

            let cparts = carve_branch::<K>(child, &self.branch_layout);
            let clen = (*cparts.hdr).len as usize;
            let ckp = cparts.keys_ptr as *mut K;
            let ccp = cparts.children_ptr as *mut *mut u8;
            let old_sep = ptr::read(kp.add(child_idx));
            ptr::write(ckp.add(clen), old_sep);
            ptr::write(ccp.add(clen + 1), bchild);
            (*cparts.hdr).len = (clen + 1) as u16;

            ptr::write(kp.add(child_idx), bkey);
        }
    }

    /// Merge `children[sep_idx + 1]` into `children[sep_idx]`, dropping
    /// separator `sep_idx` from `branch`.
    unsafe fn merge_children(&mut self, branch: NonNull<u8>, sep_idx: usize) {
        let parts = carve_branch::<K>(branch, &self.branch_layout);
        let len = (*parts.hdr).len as usize;
        let kp = parts.keys_ptr as *mut K;
        let cp = parts.children_ptr as *mut *mut u8;

        let left = NonNull::new(*cp.add(sep_idx)).unwrap();
        let right = NonNull::new(*cp.add(sep_idx + 1)).unwrap();
        let is_leaf_merge = crate::node::is_leaf(left);

        if is_leaf_merge {
            let lparts = carve_leaf::<K, V>(left, &self.leaf_layout);
            let llen = (*lparts.hdr).len as usize;
            let lkp = lparts.keys_ptr as *mut K;
            let lvp = lparts.vals_ptr as *mut V;

            let rparts = carve_leaf::<K, V>(right, &self.leaf_layout);
            let rlen = (*rparts.hdr).len as usize;
            let rkp = rparts.keys_ptr as *mut K;
            let rvp = rparts.vals_ptr as *mut V;

            ptr::copy_nonoverlapping(rkp, lkp.add(llen), rlen);
            ptr::copy_nonoverlapping(rvp, lvp.add(llen), rlen);
            (*lparts.hdr).len = (llen + rlen) as u16;

            let next = *rparts.next_ptr;
            ptr::write(lparts.next_ptr, next);
            match NonNull::new(next) {
                Some(n) => {
                    let nparts = carve_leaf::<(), ()>(n, &self.leaf_layout);
                    ptr::write(nparts.prev_ptr, left.as_ptr());
                }
                None => self.last_leaf = Some(left),
            }
            self.allocator
                .free(right, self.leaf_layout.bytes, self.leaf_layout.max_align);
        } else {
            let lparts = carve_branch::<K>(left, &self.branch_layout);
            let llen = (*lparts.hdr).len as usize;
            let lkp = lparts.keys_ptr as *mut K;
            let lcp = lparts.children_ptr as *mut *mut u8;

            let rparts = carve_branch::<K>(right, &self.branch_layout);
            let rlen = (*rparts.hdr).len as usize;
            let rkp = rparts.keys_ptr as *mut K;
            let rcp = rparts.children_ptr as *mut *mut u8;

            let pulled_sep = ptr::read(kp.add(sep_idx));
            ptr::write(lkp.add(llen), pulled_sep);
            ptr::copy_nonoverlapping(rkp, lkp.add(llen + 1), rlen);
            ptr::copy_nonoverlapping(rcp, lcp.add(llen + 1), rlen + 1);
            (*lparts.hdr).len = (llen + 1 + rlen) as u16;

            self.allocator.free(
                right,
                self.branch_layout.bytes,
                self.branch_layout.max_align,
            );
        }

        if is_leaf_merge {
            // The separator at `sep_idx` was never moved anywhere (unlike the
            // branch case, where it is pulled down into the merged child),
            // so it must be dropped explicitly before its slot is overwritten.
            drop(ptr::read(kp.add(sep_idx)));
        }
        if sep_idx + 1 < len {
            ptr::copy(kp.add(sep_idx + 1), kp.add(sep_idx), len - sep_idx - 1);
        }
        if sep_idx + 2 <= len {
            ptr::copy(cp.add(sep_idx + 2), cp.add(sep_idx + 1), len - sep_idx - 1);
        }
        (*parts.hdr).len = (len - 1) as u16;
        tracing::trace!(sep_idx, "branch children merged");
    }
}

/// Unbounded by `C`: `Drop` needs to free a subtree without requiring a
/// comparator, so this lives in its own impl block.
impl<K, V, C, A: PageAllocator> BPlusTreeMap<K, V, C, A> {
    /// Drop every stored entry and free every page under `page`, post-order.
    ///
    /// # Safety
    /// `page` must be a live page belonging to this tree; it must not be
    /// referenced again afterward.
    pub(crate) unsafe fn free_subtree(&mut self, page: NonNull<u8>) {
        if crate::node::is_leaf(page) {
            let parts = carve_leaf::<K, V>(page, &self.leaf_layout);
            let len = (*parts.hdr).len as usize;
            for i in 0..len {
                drop(ptr::read((parts.keys_ptr as *mut K).add(i)));
                drop(ptr::read((parts.vals_ptr as *mut V).add(i)));
            }
            self.allocator
                .free(page, self.leaf_layout.bytes, self.leaf_layout.max_align);
        } else {
            let parts = carve_branch::<K>(page, &self.branch_layout);
            let len = (*parts.hdr).len as usize;
            for i in 0..len {
                drop(ptr::read((parts.keys_ptr as *mut K).add(i)));
            }
            let children: Vec<NonNull<u8>> = (0..=len)
                .map(|i| NonNull::new(*(parts.children_ptr as *mut *mut u8).add(i)).unwrap())
                .collect();
            self.allocator
                .free(page, self.branch_layout.bytes, self.branch_layout.max_align);
            for child in children {
                self.free_subtree(child);
            }
        }
    }
}
