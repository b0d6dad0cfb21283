//! Raw address-range allocation for one memory region.
//!
//! Two strategies:
//! - **Arena**: monotonic cursor, conceptually unbounded, never reclaims a
//!   single object. Used for compiler-internal bookkeeping.
//! - **Heap**: fixed hardware capacity with a coalescing free pool and
//!   non-contiguous placement under fragmentation.

use tpc_core::types::{MemorySpan, SpaceTag, SpanRun};

use crate::error::{Error, Result};
use crate::span_alloc::{FreeRanges, MemorySpanAllocator};
use crate::tracking::SpaceStats;

#[derive(Debug, Clone)]
enum Strategy {
    Arena { cursor: usize },
    Heap { free: FreeRanges },
}

#[derive(Debug, Clone)]
pub struct MemorySpace {
    tag: SpaceTag,
    capacity: usize,
    strategy: Strategy,
    stats: SpaceStats,
}

impl MemorySpace {
    /// Unbounded monotonic space.
    pub fn arena(tag: SpaceTag) -> Self {
        Self {
            tag,
            capacity: usize::MAX,
            strategy: Strategy::Arena { cursor: 0 },
            stats: SpaceStats::new(tag, usize::MAX),
        }
    }

    /// Fixed-capacity reclaiming space covering `[0, capacity)`.
    pub fn heap(tag: SpaceTag, capacity: usize) -> Self {
        Self {
            tag,
            capacity,
            strategy: Strategy::Heap {
                free: FreeRanges::with_capacity(capacity),
            },
            stats: SpaceStats::new(tag, capacity),
        }
    }

    pub fn tag(&self) -> SpaceTag {
        self.tag
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_heap(&self) -> bool {
        matches!(self.strategy, Strategy::Heap { .. })
    }

    /// Vectors that can still be placed.
    pub fn available(&self) -> usize {
        match &self.strategy {
            Strategy::Arena { cursor } => self.capacity - cursor,
            Strategy::Heap { free } => free.total(),
        }
    }

    /// The free pool, for Heap spaces.
    pub fn free_ranges(&self) -> Option<&FreeRanges> {
        match &self.strategy {
            Strategy::Heap { free } => Some(free),
            Strategy::Arena { .. } => None,
        }
    }

    pub fn stats(&self) -> SpaceStats {
        self.stats
    }

    pub fn allocate(&mut self, count: usize) -> Result<MemorySpan> {
        let span = match &mut self.strategy {
            Strategy::Arena { cursor } => {
                let available = self.capacity - *cursor;
                if count > available {
                    return Err(Error::OutOfMemory {
                        tag: self.tag,
                        requested: count,
                        available,
                    });
                }
                let mut span = MemorySpan::new();
                span.push_run(SpanRun::new(self.tag, *cursor, count));
                *cursor += count;
                span
            }
            Strategy::Heap { free } => MemorySpanAllocator::allocate(free, self.tag, count)?,
        };
        self.stats.record_alloc(count);
        Ok(span)
    }

    /// Return every run of `span` to this space.
    ///
    /// Arena spaces accept and ignore the call; their memory is reclaimed
    /// only when the compile ends.
    pub fn free(&mut self, span: &MemorySpan) -> Result<()> {
        let capacity = self.capacity;
        let tag = self.tag;
        match &mut self.strategy {
            Strategy::Arena { .. } => Ok(()),
            Strategy::Heap { free } => {
                for run in span.runs() {
                    if run.tag != tag {
                        return Err(Error::Invariant(format!(
                            "cannot free {} run at {} into {tag}",
                            run.tag, run.start
                        )));
                    }
                    free.release(tag, run.start, run.len, capacity)?;
                    self.stats.record_free(run.len);
                }
                Ok(())
            }
        }
    }
}
