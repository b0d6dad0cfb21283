#![forbid(unsafe_code)]
//! tpc-driver: the compile loop, deterministic replay digests, and metrics.
//!
//! One traversal stages constants and yields per-layer emitters; each
//! emitter runs against the shared memory manager and is followed by a
//! liveness sweep.

pub mod compiler;
pub mod metrics;
pub mod replay;

pub use compiler::{
    emitter, CompileError, CompileOutput, Compiler, EmitContext, Emitter, Frontend, LayerStats,
};
