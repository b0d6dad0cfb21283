#![forbid(unsafe_code)]
//! tpc-core: shared vocabulary for the tensor program compiler.
//!
//! Everything here is plain data: memory space tags, address refs and spans,
//! tensor dimensions, staged tensor values, the accelerator description and
//! its scalar encodings, compiler configuration, and provenance hashing.
//! The allocator lives in `tpc-mem`; the compile loop lives in `tpc-driver`.

pub mod arch;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod types;

/// Compiler version recorded in manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
