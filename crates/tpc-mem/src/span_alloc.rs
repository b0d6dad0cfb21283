//! Free-range pool and span placement for Heap spaces.
//!
//! Placement is first-fit over address-ordered free runs. When no single run
//! is large enough, the request is satisfied by concatenating free runs in
//! increasing address order; only the last run taken is split.

use std::collections::BTreeMap;

use tpc_core::types::{MemorySpan, SpaceTag, SpanRun};

use crate::error::{Error, Result};

/// Address-ordered free runs (`start -> len`), always coalesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeRanges {
    runs: BTreeMap<usize, usize>,
    total: usize,
}

impl FreeRanges {
    /// A pool covering `[0, capacity)`.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut runs = BTreeMap::new();
        if capacity > 0 {
            runs.insert(0, capacity);
        }
        Self {
            runs,
            total: capacity,
        }
    }

    /// Sum of all free run lengths.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Largest single free run.
    pub fn largest(&self) -> usize {
        self.runs.values().copied().max().unwrap_or(0)
    }

    pub fn runs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.runs.iter().map(|(&s, &l)| (s, l))
    }

    /// Remove `len` addresses from the front of the run starting at `start`.
    fn take_front(&mut self, start: usize, len: usize) {
        if let Some(run_len) = self.runs.remove(&start) {
            debug_assert!(run_len >= len);
            if run_len > len {
                self.runs.insert(start + len, run_len - len);
            }
            self.total -= len;
        }
    }

    /// Return `[start, start + len)` to the pool, merging with neighbours.
    ///
    /// Fails with `InvalidFree` if any address is already free or lies beyond
    /// `capacity`.
    pub fn release(&mut self, tag: SpaceTag, start: usize, len: usize, capacity: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let end = start + len;
        if end > capacity {
            return Err(Error::InvalidFree {
                tag,
                address: capacity.max(start),
            });
        }

        let pred = self.runs.range(..=start).next_back().map(|(&s, &l)| (s, l));
        if let Some((ps, pl)) = pred {
            if ps + pl > start {
                return Err(Error::InvalidFree { tag, address: start });
            }
        }
        let succ = self.runs.range(start..).next().map(|(&s, &l)| (s, l));
        if let Some((ss, _)) = succ {
            if ss < end {
                return Err(Error::InvalidFree { tag, address: ss });
            }
        }

        let mut new_start = start;
        let mut new_len = len;
        if let Some((ps, pl)) = pred {
            if ps + pl == start {
                self.runs.remove(&ps);
                new_start = ps;
                new_len += pl;
            }
        }
        if let Some((ss, sl)) = succ {
            if ss == end {
                self.runs.remove(&ss);
                new_len += sl;
            }
        }
        self.runs.insert(new_start, new_len);
        self.total += len;
        Ok(())
    }
}

/// Produces placements over a [`FreeRanges`] pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySpanAllocator;

impl MemorySpanAllocator {
    pub fn allocate(pool: &mut FreeRanges, tag: SpaceTag, count: usize) -> Result<MemorySpan> {
        let mut span = MemorySpan::new();
        if count == 0 {
            return Ok(span);
        }
        if pool.total() < count {
            return Err(Error::OutOfMemory {
                tag,
                requested: count,
                available: pool.total(),
            });
        }

        let fit = pool
            .runs()
            .find(|&(_, len)| len >= count)
            .map(|(start, _)| start);
        if let Some(start) = fit {
            pool.take_front(start, count);
            span.push_run(SpanRun::new(tag, start, count));
            return Ok(span);
        }

        let mut remaining = count;
        let mut picks = Vec::new();
        for (start, len) in pool.runs() {
            let take = len.min(remaining);
            picks.push((start, take));
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
        for (start, take) in picks {
            pool.take_front(start, take);
            span.push_run(SpanRun::new(tag, start, take));
        }
        tracing::trace!(%tag, count, runs = span.runs().len(), "non-contiguous placement");
        Ok(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: SpaceTag = SpaceTag::Local;

    #[test]
    fn test_first_fit_contiguous() {
        let mut pool = FreeRanges::with_capacity(8);
        let a = MemorySpanAllocator::allocate(&mut pool, TAG, 3).unwrap();
        let b = MemorySpanAllocator::allocate(&mut pool, TAG, 3).unwrap();
        assert_eq!(a.runs(), &[SpanRun::new(TAG, 0, 3)]);
        assert_eq!(b.runs(), &[SpanRun::new(TAG, 3, 3)]);
        assert_eq!(pool.total(), 2);
    }

    #[test]
    fn test_fragmented_request_concatenates_runs_in_address_order() {
        let mut pool = FreeRanges::with_capacity(10);
        let spans: Vec<_> = (0..5)
            .map(|_| MemorySpanAllocator::allocate(&mut pool, TAG, 2).unwrap())
            .collect();
        // Free 0..2, 4..6, 8..10 leaving three disjoint holes.
        for i in [0, 2, 4] {
            let run = spans[i].runs()[0];
            pool.release(TAG, run.start, run.len, 10).unwrap();
        }
        assert_eq!(pool.run_count(), 3);

        let s = MemorySpanAllocator::allocate(&mut pool, TAG, 5).unwrap();
        assert_eq!(
            s.runs(),
            &[
                SpanRun::new(TAG, 0, 2),
                SpanRun::new(TAG, 4, 2),
                SpanRun::new(TAG, 8, 1),
            ]
        );
        assert_eq!(pool.runs().collect::<Vec<_>>(), vec![(9, 1)]);
    }

    #[test]
    fn test_release_coalesces_both_neighbours() {
        let mut pool = FreeRanges::with_capacity(9);
        for _ in 0..3 {
            MemorySpanAllocator::allocate(&mut pool, TAG, 3).unwrap();
        }
        pool.release(TAG, 0, 3, 9).unwrap();
        pool.release(TAG, 6, 3, 9).unwrap();
        assert_eq!(pool.run_count(), 2);
        pool.release(TAG, 3, 3, 9).unwrap();
        assert_eq!(pool.runs().collect::<Vec<_>>(), vec![(0, 9)]);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool = FreeRanges::with_capacity(4);
        MemorySpanAllocator::allocate(&mut pool, TAG, 4).unwrap();
        pool.release(TAG, 1, 2, 4).unwrap();
        assert!(matches!(
            pool.release(TAG, 2, 1, 4),
            Err(Error::InvalidFree { address: 2, .. })
        ));
        assert!(matches!(
            pool.release(TAG, 3, 2, 4),
            Err(Error::InvalidFree { .. })
        ));
        assert_eq!(pool.total(), 2);
    }

    #[test]
    fn test_out_of_memory_reports_available() {
        let mut pool = FreeRanges::with_capacity(4);
        MemorySpanAllocator::allocate(&mut pool, TAG, 3).unwrap();
        let err = MemorySpanAllocator::allocate(&mut pool, TAG, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfMemory {
                tag: SpaceTag::Local,
                requested: 2,
                available: 1
            }
        ));
    }
}
