//! Deterministic replay & provenance helpers.
//!
//! Allocation is a pure function of the call sequence, so compiling the
//! same model twice must give the same constants blob and the same I/O
//! placement. These digests make that checkable from manifests alone.

use tpc_core::hash::{hash_bytes, hash_parts, hash_serde, Hash256};
use tpc_core::manifest::{CompileManifest, IoEntry};

use crate::CompileError;

pub fn hash_consts(consts: &[u8]) -> Hash256 {
    hash_bytes(consts)
}

/// Hash the input and output tables into one digest.
pub fn hash_layout(inputs: &[IoEntry], outputs: &[IoEntry]) -> Result<Hash256, CompileError> {
    let a = hash_serde(&inputs).map_err(|e| CompileError::Hash(e.to_string()))?;
    let b = hash_serde(&outputs).map_err(|e| CompileError::Hash(e.to_string()))?;
    Ok(hash_parts([a.0.as_slice(), b.0.as_slice()]))
}

/// True when two manifests describe byte-identical programs memory-wise.
pub fn same_program(a: &CompileManifest, b: &CompileManifest) -> bool {
    a.arch == b.arch
        && a.consts_hash == b.consts_hash
        && a.consts_size_bytes == b.consts_size_bytes
        && a.layout_hash == b.layout_hash
}
