//! Convenient re-exports for downstream crates.

pub use crate::arch::{Architecture, DataType};
pub use crate::config::{CompilerConfig, Tracepoint};
pub use crate::error::{Error, Result};
pub use crate::id::{LayerId, ObjectId};
pub use crate::manifest::{CompileManifest, IoEntry};
pub use crate::types::{
    InstructionPosition, MemoryDimensions, MemoryRef, MemorySpan, ScalarKind, SpaceTag, SpanRun,
    TensorData, TensorValues,
};
