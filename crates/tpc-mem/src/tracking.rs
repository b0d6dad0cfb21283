//! Per-space usage tracking in vectors.
//!
//! Read-only for reporting; the allocator never consults these numbers.

use serde::{Deserialize, Serialize};

use tpc_core::manifest::SpaceUsage;
use tpc_core::types::SpaceTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceStats {
    pub tag: SpaceTag,
    pub capacity: usize,
    /// Vectors currently placed.
    pub used: usize,
    /// High-water mark of `used`.
    pub peak: usize,
    /// Vectors ever handed out (frees do not subtract).
    pub aggregate: usize,
    pub allocations: usize,
}

impl SpaceStats {
    pub fn new(tag: SpaceTag, capacity: usize) -> Self {
        Self {
            tag,
            capacity,
            used: 0,
            peak: 0,
            aggregate: 0,
            allocations: 0,
        }
    }

    pub fn record_alloc(&mut self, vectors: usize) {
        self.used += vectors;
        self.aggregate += vectors;
        self.allocations += 1;
        if self.used > self.peak {
            self.peak = self.used;
        }
        tracing::trace!(tag = %self.tag, used = self.used, peak = self.peak, "space usage");
    }

    pub fn record_free(&mut self, vectors: usize) {
        self.used = self.used.saturating_sub(vectors);
    }

    pub fn usage(&self) -> SpaceUsage {
        SpaceUsage {
            tag: self.tag,
            capacity: self.capacity,
            peak: self.peak,
            aggregate: self.aggregate,
        }
    }
}
