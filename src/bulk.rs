//! Bulk construction from an already-sorted sequence: partition the input
//! evenly across pages sized to respect `[MIN, MAX]` and build branch levels
//! bottom-up, instead of paying for a split on every few inserts the way
//! `insert` in a loop would.

use std::ptr;
use std::ptr::NonNull;

use crate::alloc::PageAllocator;
use crate::comparator::KeyComparator;
use crate::config::Config;
use crate::error::BPlusTreeError;
use crate::layout::{carve_branch, carve_leaf};
use crate::BPlusTreeMap;

/// Split `total` items across pages, each sized within `[min, max]`.
///
/// A single page holding everything is always preferred when `total <= max`:
/// that page becomes the root, which is exempt from `min`. Otherwise the
/// item count is divided as evenly as possible across
/// `ceil(total / max)` pages, which keeps every page's size within
/// `[min, max]` whenever `min <= ceil(max / 2)` (true of both leaf and
/// branch layouts here).
fn partition_sizes(total: usize, min: usize, max: usize) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    if total <= max {
        return vec![total];
    }
    let pages = (total + max - 1) / max;
    let base = total / pages;
    let extra = total % pages;
    (0..pages)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

impl<K: Clone, V, C: KeyComparator<K>, A: PageAllocator + Default> BPlusTreeMap<K, V, C, A> {
    /// Build a tree from an already-ascending sequence of `(key, value)`
    /// pairs. Fails with [`BPlusTreeError::OutOfOrderInput`] if the sequence
    /// is not strictly ascending under `cmp`, without allocating anything.
    pub fn from_ordered<I>(cmp: C, config: Config, items: I) -> Result<Self, BPlusTreeError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let items: Vec<(K, V)> = items.into_iter().collect();
        let mut tree = Self::with_allocator(cmp, A::default(), config)?;
        if items.is_empty() {
            return Ok(tree);
        }
        for w in items.windows(2) {
            if !tree.cmp.precedes(&w[0].0, &w[1].0) {
                return Err(BPlusTreeError::OutOfOrderInput);
            }
        }
        let count = items.len();
        unsafe { tree.bulk_build(items)? };
        tree.len = count;
        tracing::debug!(len = tree.len, "bulk build complete");
        Ok(tree)
    }

    unsafe fn bulk_build(&mut self, items: Vec<(K, V)>) -> Result<(), BPlusTreeError> {
        let mut allocated: Vec<NonNull<u8>> = Vec::new();
        let leaf_sizes = partition_sizes(
            items.len(),
            self.leaf_layout.min as usize,
            self.leaf_layout.cap as usize,
        );

        let mut level: Vec<(K, NonNull<u8>)> = Vec::new();
        let mut prev_leaf: Option<NonNull<u8>> = None;
        let mut iter = items.into_iter();

        for size in leaf_sizes {
            let batch: Vec<(K, V)> = (&mut iter).take(size).collect();
            let leaf = match self.allocator.alloc_leaf(&self.leaf_layout) {
                Some(p) => p,
                None => {
                    self.cleanup_allocated(&allocated);
                    return Err(BPlusTreeError::OutOfMemory);
                }
            };
            allocated.push(leaf);
            if self.first_leaf.is_none() {
                self.first_leaf = Some(leaf);
            }
            if let Some(prev) = prev_leaf {
                let pparts = carve_leaf::<(), ()>(prev, &self.leaf_layout);
                ptr::write(pparts.next_ptr, leaf.as_ptr());
                let lparts0 = carve_leaf::<(), ()>(leaf, &self.leaf_layout);
                ptr::write(lparts0.prev_ptr, prev.as_ptr());
            }

            let parts = carve_leaf::<K, V>(leaf, &self.leaf_layout);
            let kp = parts.keys_ptr as *mut K;
            let vp = parts.vals_ptr as *mut V;
            let batch_len = batch.len();
            let first_key = batch[0].0.clone();
            for (i, (k, v)) in batch.into_iter().enumerate() {
                ptr::write(kp.add(i), k);
                ptr::write(vp.add(i), v);
            }
            (*parts.hdr).len = batch_len as u16;

            level.push((first_key, leaf));
            prev_leaf = Some(leaf);
        }

        self.last_leaf = prev_leaf;

        let mut cur_level = 0u16;
        while level.len() > 1 {
            cur_level += 1;
            let group_sizes = partition_sizes(
                level.len(),
                self.branch_layout.min as usize + 1,
                self.branch_layout.cap as usize + 1,
            );
            let mut next_level: Vec<(K, NonNull<u8>)> = Vec::new();
            let mut iter = level.into_iter();

            for size in group_sizes {
                let group: Vec<(K, NonNull<u8>)> = (&mut iter).take(size).collect();
                let branch = match self.allocator.alloc_branch(&self.branch_layout, cur_level) {
                    Some(p) => p,
                    None => {
                        self.cleanup_allocated(&allocated);
                        return Err(BPlusTreeError::OutOfMemory);
                    }
                };
                allocated.push(branch);

                let parts = carve_branch::<K>(branch, &self.branch_layout);
                let kp = parts.keys_ptr as *mut K;
                let cp = parts.children_ptr as *mut *mut u8;
                let group_first_key = group[0].0.clone();
                let n_children = group.len();
                for (i, (k, child)) in group.into_iter().enumerate() {
                    ptr::write(cp.add(i), child.as_ptr());
                    if i > 0 {
                        ptr::write(kp.add(i - 1), k);
                    }
                }
                (*parts.hdr).len = (n_children - 1) as u16;
                next_level.push((group_first_key, branch));
            }
            level = next_level;
        }

        self.root = level.into_iter().next().map(|(_, page)| page);
        Ok(())
    }

    unsafe fn cleanup_allocated(&mut self, allocated: &[NonNull<u8>]) {
        for &page in allocated {
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
                self.allocator.free(
                    page,
                    self.branch_layout.bytes,
                    self.branch_layout.max_align,
                );
            }
        }
    }
}
