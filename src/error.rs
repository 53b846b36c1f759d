use thiserror::Error;

/// Errors surfaced by [`InternPool::intern`](crate::InternPool::intern) and the arena beneath it.
///
/// A failed call leaves the pool exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InternError {
    /// The value is too long to be stored in a chunk.
    #[error("value of {len} bytes is too large to intern")]
    ValueTooLarge { len: usize },

    /// The backing allocator refused to hand out a new chunk.
    #[error("failed to allocate an arena chunk of {capacity} bytes")]
    ChunkAllocation { capacity: usize },
}
