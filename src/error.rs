use thiserror::Error;

/// Errors surfaced by [`crate::BPlusTreeMap`].
///
/// `NotFound` is deliberately absent: lookups and removals of a missing key
/// are reported through `Option::None`, never as an error variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BPlusTreeError {
    /// The page allocator refused to hand out a page.
    #[error("out of memory while allocating a page")]
    OutOfMemory,

    /// `from_ordered` was given an input that was not strictly ascending
    /// under the tree's comparator.
    #[error("bulk-build input was not strictly ascending")]
    OutOfOrderInput,

    /// `with_config` was given a byte budget / fanout floor pair that cannot
    /// host even a single key-value pair or separator.
    #[error("invalid tree configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = core::result::Result<T, BPlusTreeError>;
