//! Ordered `K -> V` map backed by a B+ tree of fixed-size, raw-allocated
//! pages: entries live only in leaves, which are threaded into a doubly
//! linked ring for fast ordered and reverse iteration; branch pages hold
//! nothing but separator keys and child pointers.
//!
//! Ordering is supplied by the caller as a [`KeyComparator`] value rather
//! than assumed to be `K`'s own [`Ord`] impl, so the same key type can be
//! ordered one way by one tree and another way by a different tree.
//! [`OrdComparator`] recovers the usual `Ord`-based behavior.

use std::marker::PhantomData;
use std::ptr::NonNull;

mod alloc;
mod bulk;
mod comparator;
mod config;
mod cursor;
mod delete;
mod error;
mod graph;
mod insert;
mod layout;
mod node;
mod search;
mod verify;

pub use alloc::{DefaultPageAllocator, PageAllocator};
pub use comparator::{KeyComparator, OrdComparator};
pub use config::Config;
pub use cursor::{Cursor, Iter, Keys, Values};
pub use error::{BPlusTreeError, Result};
pub use layout::{align_up, BranchLayout, LeafLayout, NodeHdr, NodeTag};

/// Raw-memory B+ tree map with fixed-size leaf and branch pages.
///
/// `C` is the comparator used to order `K`; it defaults to [`OrdComparator`],
/// which defers to `K: Ord`. `A` is the page allocator; it defaults to
/// [`DefaultPageAllocator`], which carves pages out of the global allocator.
pub struct BPlusTreeMap<K, V, C = OrdComparator, A = DefaultPageAllocator> {
    pub(crate) root: Option<NonNull<u8>>,
    pub(crate) first_leaf: Option<NonNull<u8>>,
    pub(crate) last_leaf: Option<NonNull<u8>>,
    pub(crate) len: usize,
    /// Bumped on every structural mutation; an owned [`Cursor`] compares its
    /// stamp against this to detect staleness instead of dereferencing
    /// through a freed or repurposed page.
    pub(crate) stamp: u64,
    pub(crate) leaf_layout: LeafLayout,
    pub(crate) branch_layout: BranchLayout,
    pub(crate) allocator: A,
    pub(crate) cmp: C,
    _marker: PhantomData<(K, V)>,
}

// SAFETY: a `BPlusTreeMap` owns every `K`/`V` it stores (behind raw pointers
// into pages it alone controls) and never shares page access across threads
// on its own; it is `Send` exactly when its contents and collaborators are,
// and is never `Sync` (see `Config`'s doc note on the concurrency model).
unsafe impl<K: Send, V: Send, C: Send, A: Send> Send for BPlusTreeMap<K, V, C, A> {}

impl<K: Ord, V> BPlusTreeMap<K, V, OrdComparator, DefaultPageAllocator> {
    /// An empty tree ordered by `K`'s own [`Ord`] implementation, using the
    /// default [`Config`].
    pub fn ordered() -> Self {
        Self::new(OrdComparator)
    }
}

impl<K, V, C, A> BPlusTreeMap<K, V, C, A>
where
    C: KeyComparator<K>,
    A: PageAllocator + Default,
{
    /// An empty tree ordered by `cmp`, using the default [`Config`].
    pub fn new(cmp: C) -> Self {
        Self::with_config(cmp, Config::default())
            .expect("Config::default() is always a valid configuration")
    }

    /// An empty tree ordered by `cmp`, with an explicit [`Config`].
    pub fn with_config(cmp: C, config: Config) -> Result<Self> {
        Self::with_allocator(cmp, A::default(), config)
    }

    /// An empty tree with an exact, caller-chosen fanout rather than one
    /// derived from a byte budget. Mainly useful for tests that need a
    /// small, deterministic `LEAF_MAX`/`NODE_MAX` to exercise splits and
    /// merges without inserting thousands of entries.
    pub fn with_exact_capacity(cmp: C, leaf_cap: u16, branch_cap: u16) -> Result<Self> {
        Self::with_exact_capacity_and_allocator(cmp, A::default(), leaf_cap, branch_cap)
    }
}

impl<K, V, C, A> BPlusTreeMap<K, V, C, A>
where
    C: KeyComparator<K>,
    A: PageAllocator,
{
    /// An empty tree ordered by `cmp`, using `allocator` for pages.
    pub fn with_allocator(cmp: C, allocator: A, config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(BPlusTreeError::InvalidConfig)?;
        let leaf_layout = LeafLayout::compute::<K, V>(config.page_bytes, config.min_fanout_floor);
        let branch_layout = BranchLayout::compute::<K>(config.page_bytes, config.min_fanout_floor);
        Ok(Self::assemble(cmp, allocator, leaf_layout, branch_layout))
    }

    /// Like [`BPlusTreeMap::with_exact_capacity`], but with an explicit
    /// allocator.
    pub fn with_exact_capacity_and_allocator(
        cmp: C,
        allocator: A,
        leaf_cap: u16,
        branch_cap: u16,
    ) -> Result<Self> {
        if leaf_cap < 2 || branch_cap < 2 {
            return Err(BPlusTreeError::InvalidConfig(
                "leaf_cap and branch_cap must each be at least 2",
            ));
        }
        let leaf_layout = LeafLayout::for_capacity::<K, V>(leaf_cap);
        let branch_layout = BranchLayout::for_capacity::<K>(branch_cap);
        Ok(Self::assemble(cmp, allocator, leaf_layout, branch_layout))
    }

    fn assemble(cmp: C, allocator: A, leaf_layout: LeafLayout, branch_layout: BranchLayout) -> Self {
        BPlusTreeMap {
            root: None,
            first_leaf: None,
            last_leaf: None,
            len: 0,
            stamp: 0,
            leaf_layout,
            branch_layout,
            allocator,
            cmp,
            _marker: PhantomData,
        }
    }

    /// Number of entries stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The leaf fanout this tree was built with (`LEAF_MAX`).
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_layout.cap as usize
    }

    /// The branch fanout this tree was built with (`NODE_MAX`).
    pub fn branch_capacity(&self) -> usize {
        self.branch_layout.cap as usize
    }

    /// A cursor at the first entry, or an end cursor if the tree is empty.
    pub fn begin(&self) -> Cursor<K, V> {
        match self.first_leaf {
            Some(first) if self.len > 0 => Cursor::new(Some((first, 0)), self.stamp),
            _ => Cursor::new(None, self.stamp),
        }
    }

    /// The end cursor: one past the last entry.
    pub fn end(&self) -> Cursor<K, V> {
        Cursor::new(None, self.stamp)
    }

    /// Swap the entire contents of two trees in constant time.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.root, &mut other.root);
        std::mem::swap(&mut self.first_leaf, &mut other.first_leaf);
        std::mem::swap(&mut self.last_leaf, &mut other.last_leaf);
        std::mem::swap(&mut self.len, &mut other.len);
        std::mem::swap(&mut self.leaf_layout, &mut other.leaf_layout);
        std::mem::swap(&mut self.branch_layout, &mut other.branch_layout);
        std::mem::swap(&mut self.allocator, &mut other.allocator);
        std::mem::swap(&mut self.cmp, &mut other.cmp);
        self.stamp = self.stamp.wrapping_add(1);
        other.stamp = other.stamp.wrapping_add(1);
    }
}

impl<K, V, C, A> Drop for BPlusTreeMap<K, V, C, A>
where
    A: PageAllocator,
{
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            unsafe { self.free_subtree(root) };
        }
    }
}

impl<K, V, C, A> PartialEq for BPlusTreeMap<K, V, C, A>
where
    K: PartialEq,
    V: PartialEq,
    C: KeyComparator<K>,
    A: PageAllocator,
{
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<K, V, C, A> PartialOrd for BPlusTreeMap<K, V, C, A>
where
    K: PartialOrd,
    V: PartialOrd,
    C: KeyComparator<K>,
    A: PageAllocator,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<K, V, C, A> std::fmt::Debug for BPlusTreeMap<K, V, C, A>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
    C: KeyComparator<K>,
    A: PageAllocator,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
