#![forbid(unsafe_code)]
//! tpc-mem: memory allocation for the tensor program compiler.
//!
//! Layers, bottom up:
//! - [`space::MemorySpace`]: raw address ranges of one region (Arena or Heap).
//! - [`span_alloc::MemorySpanAllocator`]: first-fit, possibly non-contiguous
//!   placement over a Heap's free pool.
//! - [`object::MemoryObjectAllocator`]: named objects with consumer-counted
//!   liveness, address lookup, and zero-copy blends.
//! - [`manager::MemoryManager`]: the four concrete spaces, staged constants,
//!   the constants stream, and tracepoints.
//!
//! Everything is single-threaded and deterministic: the same sequence of
//! calls yields the same addresses.

pub mod consts;
pub mod encode;
pub mod error;
pub mod manager;
pub mod object;
pub mod space;
pub mod span_alloc;
pub mod trace;
pub mod tracking;

pub use consts::{ConstStats, PendingConsts};
pub use encode::ConstStream;
pub use error::{Error, Result};
pub use manager::{MemoryManager, OutputPlacement, ProgramMemory};
pub use object::{MemoryObject, MemoryObjectAllocator, CONSTS_CONSUMER, IO_CONSUMER};
pub use space::MemorySpace;
pub use span_alloc::{FreeRanges, MemorySpanAllocator};
pub use trace::{NoTrace, RecordingTrace, TraceAnnotation, TraceContext, TraceEvent};
pub use tracking::SpaceStats;
