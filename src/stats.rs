use std::fmt;

/// Memory accounting for an arena at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of chunks allocated so far.
    pub chunks: usize,
    /// Total bytes reserved across all chunks.
    pub reserved: usize,
    /// Bytes holding interned values.
    pub used: usize,
    pub largest_chunk: usize,
}

impl ArenaStats {
    /// Reserved bytes that hold no value: chunk tails that were skipped plus
    /// the free space left in the current chunk.
    pub fn slack(&self) -> usize {
        self.reserved - self.used
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunks: {}, reserved: {}, used: {}, slack: {}, largest chunk: {}",
            self.chunks,
            self.reserved,
            self.used,
            self.slack(),
            self.largest_chunk
        )
    }
}

/// Snapshot of an intern pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Distinct values currently interned.
    pub values: u32,
    pub table_size: u32,
    pub threadsafe: bool,
    pub arena: ArenaStats,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pool stats:")?;
        writeln!(f, "  values: {}", self.values)?;
        writeln!(f, "  table size: {}", self.table_size)?;
        writeln!(f, "  threadsafe: {}", self.threadsafe)?;
        write!(f, "  arena: {}", self.arena)
    }
}
