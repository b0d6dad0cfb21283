//! Compile manifest for audit/replay.
//!
//! The driver emits a manifest after a successful compile. Recompiling the
//! same model with the same config must reproduce `consts_hash` and
//! `layout_hash` exactly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arch::Architecture;
use crate::hash::Hash256;
use crate::types::{MemorySpan, SpaceTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

/// One program-visible input or output buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoEntry {
    pub name: String,
    pub tag: SpaceTag,
    pub span: MemorySpan,
}

/// Per-space usage summary in vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceUsage {
    pub tag: SpaceTag,
    pub capacity: usize,
    pub peak: usize,
    pub aggregate: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileManifest {
    pub id: ManifestId,

    /// Compiler version string for provenance.
    pub compiler_version: String,

    pub arch: Architecture,

    /// Digest of the constants blob.
    pub consts_hash: Hash256,
    pub consts_size_bytes: usize,

    /// Digest of the I/O tables (names and spans).
    pub layout_hash: Hash256,

    pub inputs: Vec<IoEntry>,
    pub outputs: Vec<IoEntry>,
    pub spaces: Vec<SpaceUsage>,

    /// Constants statistics: true scalars over padded vector lanes.
    pub consts_true_scalars: usize,
    pub consts_vectors: usize,
    pub consts_utilization: f64,

    pub layers: usize,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl CompileManifest {
    pub fn new(arch: Architecture, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            compiler_version: crate::VERSION.to_string(),
            arch,
            consts_hash: Hash256([0; 32]),
            consts_size_bytes: 0,
            layout_hash: Hash256([0; 32]),
            inputs: vec![],
            outputs: vec![],
            spaces: vec![],
            consts_true_scalars: 0,
            consts_vectors: 0,
            consts_utilization: 0.0,
            layers: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64) -> Self {
        self.finished_ms = finished_ms;
        self
    }
}
