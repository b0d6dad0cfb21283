//! Memory and tensor vocabulary shared by the allocator, the driver, and the
//! external frontend/backend collaborators.
//!
//! Addresses are counted in *vectors*: one vector holds `array_size` scalars
//! of the accelerator's native data type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Physical (or compiler-internal) memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceTag {
    /// Off-chip region 0: program I/O and spilled intermediate activations.
    Dram0,
    /// Off-chip region 1: materialized constants (write-once).
    Dram1,
    /// On-chip scratch for intra-layer intermediates.
    Local,
    /// Unbounded compiler-internal arena; never reaches the program.
    Temp,
}

impl SpaceTag {
    pub const ALL: [SpaceTag; 4] = [
        SpaceTag::Dram0,
        SpaceTag::Dram1,
        SpaceTag::Local,
        SpaceTag::Temp,
    ];
}

impl fmt::Display for SpaceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpaceTag::Dram0 => "DRAM0",
            SpaceTag::Dram1 => "DRAM1",
            SpaceTag::Local => "Local",
            SpaceTag::Temp => "Temp",
        };
        f.write_str(s)
    }
}

/// Address-level pointer into one space. Never implies ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryRef {
    pub tag: SpaceTag,
    pub address: usize,
}

impl MemoryRef {
    pub const fn new(tag: SpaceTag, address: usize) -> Self {
        Self { tag, address }
    }
}

impl fmt::Display for MemoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.tag, self.address)
    }
}

/// One contiguous run of addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanRun {
    pub tag: SpaceTag,
    pub start: usize,
    pub len: usize,
}

impl SpanRun {
    pub const fn new(tag: SpaceTag, start: usize, len: usize) -> Self {
        Self { tag, start, len }
    }

    /// One past the last address of the run.
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn contains(&self, r: MemoryRef) -> bool {
        r.tag == self.tag && r.address >= self.start && r.address < self.end()
    }
}

/// Ordered placement of an object's vectors, possibly split into several
/// disjoint runs when the space was fragmented.
///
/// Adjacent runs of the same tag are always merged, so a contiguous
/// placement is exactly one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemorySpan {
    runs: Vec<SpanRun>,
}

impl MemorySpan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a span from an ordered address list (used by blends).
    pub fn from_refs<I: IntoIterator<Item = MemoryRef>>(refs: I) -> Self {
        let mut span = Self::new();
        for r in refs {
            span.push_run(SpanRun::new(r.tag, r.address, 1));
        }
        span
    }

    /// Append a run, extending the last one when it continues it.
    pub fn push_run(&mut self, run: SpanRun) {
        if run.len == 0 {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if last.tag == run.tag && last.end() == run.start {
                last.len += run.len;
                return;
            }
        }
        self.runs.push(run);
    }

    /// Append every run of `other` in order.
    pub fn extend(&mut self, other: &MemorySpan) {
        for run in &other.runs {
            self.push_run(*run);
        }
    }

    pub fn runs(&self) -> &[SpanRun] {
        &self.runs
    }

    /// Number of addresses covered.
    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn is_contiguous(&self) -> bool {
        self.runs.len() <= 1
    }

    pub fn first(&self) -> Option<MemoryRef> {
        self.runs.first().map(|r| MemoryRef::new(r.tag, r.start))
    }

    pub fn contains(&self, r: MemoryRef) -> bool {
        self.runs.iter().any(|run| run.contains(r))
    }

    /// Addresses in logical order.
    pub fn iter(&self) -> impl Iterator<Item = MemoryRef> + '_ {
        self.runs
            .iter()
            .flat_map(|run| (run.start..run.end()).map(move |a| MemoryRef::new(run.tag, a)))
    }
}

/// Declared shape of an object in scalars and in (padded) vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryDimensions {
    pub scalars: usize,
    pub vectors: usize,
}

impl MemoryDimensions {
    pub const fn new(scalars: usize, vectors: usize) -> Self {
        Self { scalars, vectors }
    }

    /// Dims of `vectors` fully used vectors.
    pub const fn full(vectors: usize, array_size: usize) -> Self {
        Self {
            scalars: vectors * array_size,
            vectors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors == 0
    }
}

/// Scalar numeric kind of a staged constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    I32,
    I64,
    F32,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarKind::I32 => "int32",
            ScalarKind::I64 => "int64",
            ScalarKind::F32 => "float32",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorValues {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
}

impl TensorValues {
    pub fn kind(&self) -> ScalarKind {
        match self {
            TensorValues::I32(_) => ScalarKind::I32,
            TensorValues::I64(_) => ScalarKind::I64,
            TensorValues::F32(_) => ScalarKind::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorValues::I32(v) => v.len(),
            TensorValues::I64(v) => v.len(),
            TensorValues::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Constant tensor extracted from the model, before placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    shape: Vec<usize>,
    values: TensorValues,
}

impl TensorData {
    pub fn new(shape: Vec<usize>, values: TensorValues) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(Error::Shape(format!(
                "shape {:?} holds {} elements, got {} values",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    pub fn f32(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        Self::new(shape, TensorValues::F32(values))
    }

    pub fn i32(shape: Vec<usize>, values: Vec<i32>) -> Result<Self> {
        Self::new(shape, TensorValues::I32(values))
    }

    pub fn i64(shape: Vec<usize>, values: Vec<i64>) -> Result<Self> {
        Self::new(shape, TensorValues::I64(values))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &TensorValues {
        &self.values
    }

    pub fn kind(&self) -> ScalarKind {
        self.values.kind()
    }

    /// Number of scalar elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Where a trace annotation applies in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstructionPosition {
    /// Memory state before the first instruction executes.
    BeforeProgram,
    Instruction(u64),
}
