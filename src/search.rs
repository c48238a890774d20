//! Read-only traversal: descending from the root to the leaf that does or
//! would hold a key, and the cursor-producing operations built on top of it.

use std::ptr::NonNull;

use crate::alloc::PageAllocator;
use crate::comparator::KeyComparator;
use crate::cursor::{Cursor, Iter, Keys, Values};
use crate::layout::{carve_branch, carve_leaf, NodeTag};
use crate::node::search_keys;
use crate::BPlusTreeMap;

/// Where a key sits (or would sit) in a leaf: the leaf page, the index, and
/// whether an equivalent key is actually present there.
pub(crate) struct Located {
    pub(crate) leaf: NonNull<u8>,
    pub(crate) index: usize,
    pub(crate) found: bool,
}

impl<K, V, C: KeyComparator<K>, A: PageAllocator> BPlusTreeMap<K, V, C, A> {
    /// Descend from the root to the leaf that holds `key`, or that would
    /// hold it if it were inserted.
    pub(crate) fn locate_leaf(&self, key: &K) -> Option<Located> {
        let mut page = self.root?;
        loop {
            let tag = unsafe { (*(page.as_ptr() as *const crate::layout::NodeHdr)).tag };
            match tag {
                NodeTag::Leaf => {
                    let parts = unsafe { carve_leaf::<K, V>(page, &self.leaf_layout) };
                    let len = unsafe { (*parts.hdr).len as usize };
                    let keys =
                        unsafe { std::slice::from_raw_parts(parts.keys_ptr as *const K, len) };
                    return Some(match search_keys(keys, key, &self.cmp) {
                        Ok(i) => Located {
                            leaf: page,
                            index: i,
                            found: true,
                        },
                        Err(i) => Located {
                            leaf: page,
                            index: i,
                            found: false,
                        },
                    });
                }
                NodeTag::Branch => {
                    let parts = unsafe { carve_branch::<K>(page, &self.branch_layout) };
                    let len = unsafe { (*parts.hdr).len as usize };
                    let seps =
                        unsafe { std::slice::from_raw_parts(parts.keys_ptr as *const K, len) };
                    let child_idx = match search_keys(seps, key, &self.cmp) {
                        Ok(i) => i + 1,
                        Err(i) => i,
                    };
                    let children = unsafe {
                        std::slice::from_raw_parts(parts.children_ptr as *const *mut u8, len + 1)
                    };
                    page = NonNull::new(children[child_idx])
                        .expect("branch child pointer must be non-null");
                }
            }
        }
    }

    /// `true` if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        matches!(self.locate_leaf(key), Some(l) if l.found)
    }

    /// Reference to the value stored for `key`, if present.
    pub fn get(&self, key: &K) -> Option<&V> {
        let loc = self.locate_leaf(key)?;
        if !loc.found {
            return None;
        }
        let parts = unsafe { carve_leaf::<K, V>(loc.leaf, &self.leaf_layout) };
        Some(unsafe { &*(parts.vals_ptr.add(loc.index) as *const V) })
    }

    /// Mutable reference to the value stored for `key`, if present.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let loc = self.locate_leaf(key)?;
        if !loc.found {
            return None;
        }
        let parts = unsafe { carve_leaf::<K, V>(loc.leaf, &self.leaf_layout) };
        Some(unsafe { &mut *(parts.vals_ptr.add(loc.index) as *mut V) })
    }

    /// A cursor at the first entry whose key is not less than `key`.
    pub fn lower_bound(&self, key: &K) -> Cursor<K, V> {
        match self.locate_leaf(key) {
            Some(loc) => self.cursor_at_boundary(loc.leaf, loc.index),
            None => Cursor::new(None, self.stamp),
        }
    }

    /// A cursor at the first entry whose key is greater than `key`.
    pub fn upper_bound(&self, key: &K) -> Cursor<K, V> {
        match self.locate_leaf(key) {
            Some(loc) => {
                let idx = if loc.found { loc.index + 1 } else { loc.index };
                self.cursor_at_boundary(loc.leaf, idx)
            }
            None => Cursor::new(None, self.stamp),
        }
    }

    /// `(lower_bound(key), upper_bound(key))`: a cursor pair bracketing zero
    /// or one entries, since keys are unique.
    pub fn equal_range(&self, key: &K) -> (Cursor<K, V>, Cursor<K, V>) {
        (self.lower_bound(key), self.upper_bound(key))
    }

    /// Normalize a `(leaf, index)` position into the canonical boundary form
    /// used throughout iteration: `index == len` on a leaf with no next page
    /// collapses to the tree-wide end.
    pub(crate) fn advance_boundary(&self, leaf: NonNull<u8>, index: usize) -> (NonNull<u8>, usize) {
        let len = unsafe { crate::node::page_len(leaf) };
        if index < len {
            (leaf, index)
        } else {
            let parts = unsafe { carve_leaf::<(), ()>(leaf, &self.leaf_layout) };
            match unsafe { NonNull::new(*parts.next_ptr) } {
                Some(next) => (next, 0),
                None => (leaf, len),
            }
        }
    }

    fn cursor_at_boundary(&self, leaf: NonNull<u8>, index: usize) -> Cursor<K, V> {
        let pos = self.advance_boundary(leaf, index);
        let is_end = Some(pos.0) == self.last_leaf && pos.1 == unsafe { crate::node::page_len(pos.0) };
        Cursor::new(if is_end { None } else { Some(pos) }, self.stamp)
    }

    /// Borrow-checked iterator over every entry, in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V, C, A> {
        Iter::full(self)
    }

    /// Borrow-checked iterator over every entry, in descending key order.
    pub fn iter_rev(&self) -> std::iter::Rev<Iter<'_, K, V, C, A>> {
        self.iter().rev()
    }

    /// Borrow-checked iterator over keys, ascending.
    pub fn keys(&self) -> Keys<'_, K, V, C, A> {
        Keys { inner: self.iter() }
    }

    /// Borrow-checked iterator over values, ascending by key.
    pub fn values(&self) -> Values<'_, K, V, C, A> {
        Values { inner: self.iter() }
    }

    /// Borrow-checked iterator over the half-open key range `[start, end)`.
    /// Either bound may be omitted via [`std::ops::Bound::Unbounded`].
    pub fn range<R: std::ops::RangeBounds<K>>(&self, bounds: R) -> Iter<'_, K, V, C, A> {
        use std::ops::Bound;

        let front = match bounds.start_bound() {
            Bound::Unbounded => match self.first_leaf {
                Some(first) => (first, 0),
                None => return Iter { tree: self, front: None, back: None },
            },
            Bound::Included(k) => match self.locate_leaf(k) {
                Some(loc) => self.advance_boundary(loc.leaf, loc.index),
                None => return Iter { tree: self, front: None, back: None },
            },
            Bound::Excluded(k) => match self.locate_leaf(k) {
                Some(loc) => {
                    let idx = if loc.found { loc.index + 1 } else { loc.index };
                    self.advance_boundary(loc.leaf, idx)
                }
                None => return Iter { tree: self, front: None, back: None },
            },
        };

        let back = match bounds.end_bound() {
            Bound::Unbounded => match self.last_leaf {
                Some(last) => (last, unsafe { crate::node::page_len(last) }),
                None => return Iter { tree: self, front: None, back: None },
            },
            Bound::Excluded(k) => match self.locate_leaf(k) {
                Some(loc) => self.advance_boundary(loc.leaf, loc.index),
                None => return Iter { tree: self, front: None, back: None },
            },
            Bound::Included(k) => match self.locate_leaf(k) {
                Some(loc) => {
                    let idx = if loc.found { loc.index + 1 } else { loc.index };
                    self.advance_boundary(loc.leaf, idx)
                }
                None => return Iter { tree: self, front: None, back: None },
            },
        };

        Iter::bounded(self, front, back)
    }
}
