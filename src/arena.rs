use std::alloc::Layout;
use std::cmp;
use std::convert::TryFrom;
use std::ptr::{self, NonNull};

use bumpalo::Bump;

use crate::error::InternError;
use crate::growth::checked_nearest_pow2_gte;
use crate::stats::ArenaStats;

/// Default chunk capacity in bytes.
pub const DEFAULT_CHUNK_CAPACITY: u32 = 32488;

/// Append-only byte storage made of chunks, oldest first.
///
/// Chunk memory comes from a [`Bump`] and is only given back when the whole
/// arena is dropped, so a pointer returned by [`Arena::append`] stays valid and
/// unchanged for as long as the arena lives.
pub struct Arena {
    bump: Bump,
    /// Sizes of the chunks handed out so far, oldest first. Their bytes never move.
    chunks: Vec<usize>,
    /// Start of the chunk being filled. Dangling until the first chunk exists.
    current: NonNull<u8>,
    /// Bump cursor into `current`: bytes `[tail, end)` are still free.
    tail: usize,
    end: usize,
    chunk_capacity: u32,
    used: usize,
}

// SAFETY: `current` points into memory owned by `bump`, which is Send, and
// nothing else aliases it mutably.
unsafe impl Send for Arena {}

impl Arena {
    pub fn new(chunk_capacity: u32) -> Self {
        Self::with_limit(chunk_capacity, None)
    }

    /// Creates an arena whose total chunk memory may not exceed `limit` bytes.
    pub fn with_limit(chunk_capacity: u32, limit: Option<usize>) -> Self {
        let bump = Bump::new();
        bump.set_allocation_limit(limit);

        Arena {
            bump,
            chunks: Vec::new(),
            current: NonNull::dangling(),
            tail: 0,
            end: 0,
            chunk_capacity: cmp::max(chunk_capacity, 1),
            used: 0,
        }
    }

    /// Copies `bytes` into the arena and returns where the copy lives.
    ///
    /// The current chunk is abandoned for a fresh one when the value would
    /// reach its end. A fresh chunk holds at least sixteen values of this size,
    /// so one large value does not starve the small ones that follow it.
    pub fn append(&mut self, bytes: &[u8]) -> Result<NonNull<u8>, InternError> {
        let len = bytes.len();

        if self.tail + len >= self.end {
            let wanted = u32::try_from(len)
                .ok()
                .and_then(|len| len.checked_mul(16))
                .and_then(checked_nearest_pow2_gte)
                .ok_or(InternError::ValueTooLarge { len })?;
            self.allocate_chunk(cmp::max(self.chunk_capacity, wanted) as usize)?;
        }

        // SAFETY: `tail + len < end`, the size of the chunk at `current`, so
        // the destination range lies inside that chunk and has never been
        // handed out. Being fresh, it cannot overlap `bytes`.
        let dest = unsafe {
            let dest = self.current.as_ptr().add(self.tail);
            ptr::copy_nonoverlapping(bytes.as_ptr(), dest, len);
            NonNull::new_unchecked(dest)
        };

        self.tail += len;
        self.used += len;
        Ok(dest)
    }

    /// Starts a new zeroed chunk of `capacity` bytes and moves the cursor to it.
    ///
    /// On failure nothing changes.
    fn allocate_chunk(&mut self, capacity: usize) -> Result<(), InternError> {
        let layout = Layout::from_size_align(capacity, 1)
            .map_err(|_| InternError::ChunkAllocation { capacity })?;
        let block = self
            .bump
            .try_alloc_layout(layout)
            .map_err(|_| InternError::ChunkAllocation { capacity })?;

        // SAFETY: `block` is a fresh allocation of `capacity` bytes.
        unsafe { ptr::write_bytes(block.as_ptr(), 0, capacity) };

        log::debug!(
            "allocated arena chunk #{} of {} bytes",
            self.chunks.len() + 1,
            capacity
        );

        self.chunks.push(capacity);
        self.current = block;
        self.tail = 0;
        self.end = capacity;
        Ok(())
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            chunks: self.chunks.len(),
            reserved: self.chunks.iter().sum(),
            used: self.used,
            largest_chunk: self.chunks.iter().copied().max().unwrap_or(0),
        }
    }
}
