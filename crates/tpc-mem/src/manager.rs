//! Tensor-level memory API used by frontends and the driver.
//!
//! The manager owns the four concrete spaces:
//! - DRAM0 (Heap): program I/O and spilled activations, swept per layer.
//! - DRAM1 (Heap): materialized constants, never swept.
//! - Local (Heap): on-chip scratch, swept per layer.
//! - Temp (Arena): scheduler bookkeeping that never reaches the program.
//!
//! It also owns the staged constants, the constants stream, and the trace
//! context.

use std::collections::BTreeMap;
use std::sync::Arc;

use tpc_core::arch::Architecture;
use tpc_core::config::{CompilerConfig, Tracepoint};
use tpc_core::id::ObjectId;
use tpc_core::manifest::IoEntry;
use tpc_core::types::{
    InstructionPosition, MemoryDimensions, MemoryRef, SpaceTag, TensorData,
};

use crate::consts::{ConstStats, PendingConsts};
use crate::encode::ConstStream;
use crate::error::{Error, Result};
use crate::object::{MemoryObject, MemoryObjectAllocator, CONSTS_CONSUMER, IO_CONSUMER};
use crate::space::MemorySpace;
use crate::trace::{TraceAnnotation, TraceContext, TraceEvent};
use crate::tracking::SpaceStats;

/// Result of [`MemoryManager::emit_output_object`].
#[derive(Debug, Clone)]
pub struct OutputPlacement {
    /// The program-visible DRAM0 output buffer.
    pub object: MemoryObject,
    /// Set when the producer left the result in on-chip scratch: the caller
    /// must emit a copy from this object into `object`.
    pub relocate_from: Option<MemoryObject>,
}

/// Everything the backend and reporting need once emission is done.
#[derive(Debug, Clone)]
pub struct ProgramMemory {
    pub consts: Vec<u8>,
    pub inputs: Vec<IoEntry>,
    pub outputs: Vec<IoEntry>,
    pub spaces: Vec<SpaceStats>,
    pub const_stats: ConstStats,
    pub trace: Vec<TraceEvent>,
}

pub struct MemoryManager {
    arch: Architecture,
    tracepoints: Vec<Tracepoint>,
    dram0: MemorySpace,
    dram1: MemorySpace,
    local: MemorySpace,
    temp: MemorySpace,
    allocator: MemoryObjectAllocator,
    pending: PendingConsts,
    consts: ConstStream,
    const_stats: ConstStats,
    trace: Box<dyn TraceContext>,
    inputs: Vec<(String, ObjectId)>,
    outputs: Vec<(String, ObjectId)>,
}

impl MemoryManager {
    pub fn new(config: &CompilerConfig, trace: Box<dyn TraceContext>) -> Result<Self> {
        config.validate()?;
        let arch = config.arch.clone();
        Ok(Self {
            dram0: MemorySpace::heap(SpaceTag::Dram0, arch.dram0_depth),
            dram1: MemorySpace::heap(SpaceTag::Dram1, arch.dram1_depth),
            local: MemorySpace::heap(SpaceTag::Local, arch.local_depth),
            temp: MemorySpace::arena(SpaceTag::Temp),
            allocator: MemoryObjectAllocator::new(),
            pending: PendingConsts::new(),
            consts: ConstStream::new(arch.clone()),
            const_stats: ConstStats::default(),
            tracepoints: config.tracepoints.clone(),
            trace,
            inputs: vec![],
            outputs: vec![],
            arch,
        })
    }

    pub fn arch(&self) -> &Architecture {
        &self.arch
    }

    pub fn space(&self, tag: SpaceTag) -> &MemorySpace {
        match tag {
            SpaceTag::Dram0 => &self.dram0,
            SpaceTag::Dram1 => &self.dram1,
            SpaceTag::Local => &self.local,
            SpaceTag::Temp => &self.temp,
        }
    }

    // ----- staged constants -----

    pub fn add_pending_const(&mut self, name: &str, data: TensorData) -> Result<()> {
        self.pending.add(name, data)
    }

    pub fn has_pending_const(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    pub fn get_pending_const(&self, name: &str) -> Result<Arc<TensorData>> {
        self.pending.get(name)
    }

    pub fn pending_f32(&self, name: &str) -> Result<&[f32]> {
        self.pending.f32(name)
    }

    pub fn pending_i32(&self, name: &str) -> Result<&[i32]> {
        self.pending.i32(name)
    }

    pub fn pending_i64(&self, name: &str) -> Result<&[i64]> {
        self.pending.i64(name)
    }

    pub fn alias_pending_const(&mut self, name: &str, alias: &str) {
        self.pending.alias(name, alias)
    }

    /// Reuse the constant object `name`, or materialize it from the staged
    /// tensor into DRAM1.
    ///
    /// `broadcast` requests specific dims; a staged tensor with exactly one
    /// scalar is replicated to fill them, anything else must already have
    /// those dims.
    pub fn get_or_emit_const_object(
        &mut self,
        name: &str,
        broadcast: Option<MemoryDimensions>,
    ) -> Result<MemoryObject> {
        if self.allocator.has_object(name) {
            return Ok(self.allocator.consume_object(name, &[])?.clone());
        }

        let tensor = self.pending.get(name)?;
        ConstStream::ensure_encodable(name, tensor.kind())?;

        let natural = self.arch.make_dims(tensor.shape());
        let (dims, replicate) = match broadcast {
            Some(requested) if requested != natural => {
                if tensor.len() != 1 {
                    return Err(Error::Configuration(format!(
                        "cannot broadcast constant '{name}' of {} scalars into {} vectors",
                        tensor.len(),
                        requested.vectors
                    )));
                }
                (requested, true)
            }
            _ => (natural, false),
        };

        let object = self.allocate_in(SpaceTag::Dram1, name, dims, &[CONSTS_CONSUMER])?;
        if let Some(first) = object.span.first() {
            let expected = first.address * self.consts.vector_bytes();
            if !object.span.is_contiguous() || expected != self.consts.len() {
                return Err(Error::Invariant(format!(
                    "constant '{name}' placed at {first} but the stream is at byte {}",
                    self.consts.len()
                )));
            }
        }
        if replicate {
            self.consts.write_broadcast(name, &tensor, dims.vectors)?;
        } else {
            self.consts.write_tensor(name, &tensor)?;
        }
        self.const_stats.record(dims);
        tracing::debug!(name, vectors = dims.vectors, broadcast = replicate, "materialized constant");
        Ok(object)
    }

    pub fn get_or_emit_weights_and_bias_objects(
        &mut self,
        weights: &str,
        bias: Option<&str>,
    ) -> Result<(MemoryObject, Option<MemoryObject>)> {
        let w = self.get_or_emit_const_object(weights, None)?;
        let b = bias
            .map(|b| self.get_or_emit_const_object(b, None))
            .transpose()?;
        Ok((w, b))
    }

    // ----- program I/O -----

    /// Reserve a DRAM0 input buffer, pinned for the whole compile.
    pub fn emit_input_object(
        &mut self,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
    ) -> Result<MemoryObject> {
        let mut pinned: Vec<&str> = consumers.to_vec();
        pinned.push(IO_CONSUMER);
        let object = self.allocate_in(SpaceTag::Dram0, name, dims, &pinned)?;
        self.inputs.push((name.to_string(), object.id));
        Ok(object)
    }

    /// Register the object `name` as a program output.
    ///
    /// A DRAM0 result is pinned in place with [`IO_CONSUMER`]. A result
    /// left in on-chip scratch gets a fresh pinned DRAM0 buffer named
    /// `"{name}:output"` and is returned as the relocation source.
    pub fn emit_output_object(&mut self, name: &str) -> Result<OutputPlacement> {
        let produced = self.allocator.consume_object(name, &[])?.clone();
        match produced.tag {
            SpaceTag::Dram0 => {
                let object = self.allocator.pin_object(name, IO_CONSUMER)?.clone();
                self.outputs.push((name.to_string(), object.id));
                Ok(OutputPlacement {
                    object,
                    relocate_from: None,
                })
            }
            SpaceTag::Local => {
                let final_name = format!("{name}:output");
                let object =
                    self.allocate_in(SpaceTag::Dram0, &final_name, produced.dims, &[IO_CONSUMER])?;
                self.outputs.push((name.to_string(), object.id));
                Ok(OutputPlacement {
                    object,
                    relocate_from: Some(produced),
                })
            }
            other => Err(Error::Configuration(format!(
                "output '{name}' cannot be produced in {other}"
            ))),
        }
    }

    // ----- activations and scratch -----

    pub fn allocate_vars_object(
        &mut self,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
    ) -> Result<MemoryObject> {
        self.allocate_in(SpaceTag::Dram0, name, dims, consumers)
    }

    pub fn allocate_local_object(
        &mut self,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
    ) -> Result<MemoryObject> {
        self.allocate_in(SpaceTag::Local, name, dims, consumers)
    }

    pub fn allocate_temp_object(
        &mut self,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
    ) -> Result<MemoryObject> {
        self.allocate_in(SpaceTag::Temp, name, dims, consumers)
    }

    // ----- object registry pass-throughs -----

    pub fn has_object(&self, name: &str) -> bool {
        self.allocator.has_object(name)
    }

    pub fn get_object(&self, name: &str) -> Result<&MemoryObject> {
        self.allocator.get_object(name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &MemoryObject> {
        self.allocator.objects()
    }

    pub fn consume_object(&mut self, name: &str, consumers: &[&str]) -> Result<MemoryObject> {
        Ok(self.allocator.consume_object(name, consumers)?.clone())
    }

    pub fn consume_all_objects(&mut self, consumers: &[&str]) {
        self.allocator.consume_all_objects(consumers)
    }

    pub fn blend_objects(
        &mut self,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
        blendees: &[&str],
        addresses: &[MemoryRef],
    ) -> Result<MemoryObject> {
        let object = self
            .allocator
            .blend_objects(name, dims, consumers, blendees, addresses)?
            .clone();
        self.trace.blend_objects(&object, blendees);
        Ok(object)
    }

    pub fn resolve_ref_to_object(&self, r: MemoryRef) -> Option<(&MemoryObject, usize)> {
        self.allocator.resolve_ref_to_object(r)
    }

    /// Reclaim fully consumed objects in DRAM0 and Local.
    ///
    /// DRAM1 is left out on purpose: constants are written once and stay
    /// resident for the whole program.
    pub fn free_consumed_objects(&mut self) -> Result<usize> {
        let freed = self
            .allocator
            .free_consumed_objects(&mut [&mut self.dram0, &mut self.local])?;
        if freed > 0 {
            tracing::debug!(
                freed,
                dram0_available = self.dram0.available(),
                local_available = self.local.available(),
                "swept consumed objects"
            );
        }
        Ok(freed)
    }

    // ----- diagnostics -----

    /// Record annotations for every address of `object` matched by a
    /// configured tracepoint, positioned before the first instruction.
    pub fn emit_initial_tracepoints(&mut self, object: &MemoryObject) {
        if self.tracepoints.is_empty() {
            return;
        }
        let mut annotations = BTreeMap::new();
        for (offset, r) in object.span.iter().enumerate() {
            if self.tracepoints.iter().any(|tp| tp.matches(r, &object.name)) {
                annotations.insert(
                    r,
                    TraceAnnotation {
                        name: object.name.clone(),
                        offset,
                    },
                );
            }
        }
        if !annotations.is_empty() {
            tracing::trace!(name = %object.name, hits = annotations.len(), "tracepoints matched");
            self.trace
                .emit_tracepoints(InstructionPosition::BeforeProgram, annotations);
        }
    }

    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        self.trace.take_events()
    }

    pub fn space_stats(&self, tag: SpaceTag) -> SpaceStats {
        self.space(tag).stats()
    }

    pub fn const_stats(&self) -> ConstStats {
        self.const_stats
    }

    pub fn consts_bytes(&self) -> &[u8] {
        self.consts.bytes()
    }

    pub fn inputs(&self) -> Vec<IoEntry> {
        self.io_entries(&self.inputs)
    }

    pub fn outputs(&self) -> Vec<IoEntry> {
        self.io_entries(&self.outputs)
    }

    /// Close emission and hand out the constants blob and bookkeeping.
    pub fn finish(mut self) -> ProgramMemory {
        let trace = self.take_trace();
        ProgramMemory {
            inputs: self.inputs(),
            outputs: self.outputs(),
            spaces: SpaceTag::ALL.iter().map(|t| self.space_stats(*t)).collect(),
            const_stats: self.const_stats,
            trace,
            consts: self.consts.into_bytes(),
        }
    }

    // ----- internals -----

    fn allocate_in(
        &mut self,
        tag: SpaceTag,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
    ) -> Result<MemoryObject> {
        let space = match tag {
            SpaceTag::Dram0 => &mut self.dram0,
            SpaceTag::Dram1 => &mut self.dram1,
            SpaceTag::Local => &mut self.local,
            SpaceTag::Temp => &mut self.temp,
        };
        let object = self
            .allocator
            .allocate_object(space, name, dims, consumers)?
            .clone();
        self.emit_initial_tracepoints(&object);
        Ok(object)
    }

    fn io_entries(&self, table: &[(String, ObjectId)]) -> Vec<IoEntry> {
        table
            .iter()
            .filter_map(|(name, id)| {
                self.allocator.object(*id).map(|o| IoEntry {
                    name: name.clone(),
                    tag: o.tag,
                    span: o.span.clone(),
                })
            })
            .collect()
    }
}
