//! Small primitives shared by search, insertion, and deletion: binary search
//! over a page's key array under an arbitrary [`KeyComparator`], and cheap
//! reads of a page's header fields.

use std::ptr::NonNull;

use crate::comparator::KeyComparator;
use crate::layout::NodeHdr;

/// Binary search `keys` for `key` under `cmp`. Mirrors `[T]::binary_search`:
/// `Ok(i)` if `keys[i]` is equivalent to `key`, `Err(i)` for the insertion
/// point that keeps `keys` ascending otherwise.
#[inline]
pub(crate) fn search_keys<K, C: KeyComparator<K>>(
    keys: &[K],
    key: &K,
    cmp: &C,
) -> Result<usize, usize> {
    let mut lo = 0usize;
    let mut hi = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp.precedes(&keys[mid], key) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo < keys.len() && !cmp.precedes(key, &keys[lo]) {
        Ok(lo)
    } else {
        Err(lo)
    }
}

/// # Safety
/// `page` must point to a live, initialized page header.
#[inline(always)]
pub(crate) unsafe fn page_len(page: NonNull<u8>) -> usize {
    (*(page.as_ptr() as *const NodeHdr)).len as usize
}

/// # Safety
/// `page` must point to a live, initialized page header.
#[inline(always)]
pub(crate) unsafe fn is_leaf(page: NonNull<u8>) -> bool {
    (*(page.as_ptr() as *const NodeHdr)).tag == crate::layout::NodeTag::Leaf
}

/// # Safety
/// `page` must point to a live, initialized page header.
#[inline(always)]
pub(crate) unsafe fn page_level(page: NonNull<u8>) -> u16 {
    (*(page.as_ptr() as *const NodeHdr)).level
}
