//! Compile loop: traverse once, emit layer by layer, sweep after each layer.
//!
//! - The frontend stages constants and returns one emitter per layer.
//! - Each emitter allocates and consumes objects through the shared
//!   [`MemoryManager`].
//! - After every emitter the driver reclaims fully consumed objects in
//!   DRAM0 and Local.
//! - Any error aborts the whole compile; no partial output is returned.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tpc_core::config::CompilerConfig;
use tpc_core::id::LayerId;
use tpc_core::manifest::CompileManifest;

use tpc_mem::{MemoryManager, NoTrace, TraceContext, TraceEvent};

use crate::{metrics, replay};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("config: {0}")]
    Config(#[from] tpc_core::error::Error),
    #[error("memory: {0}")]
    Memory(#[from] tpc_mem::Error),
    #[error("{layer}: {source}")]
    Layer {
        layer: LayerId,
        #[source]
        source: tpc_mem::Error,
    },
    #[error("hashing error: {0}")]
    Hash(String),
}

/// What an emitter reports about the layer it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    /// Filled in by the driver.
    pub layer: LayerId,
    pub name: String,
    pub instructions: usize,
    /// Objects reclaimed by the sweep after this layer. Filled in by the driver.
    pub freed: usize,
}

impl LayerStats {
    pub fn new(name: impl Into<String>, instructions: usize) -> Self {
        Self {
            layer: LayerId::new(0),
            name: name.into(),
            instructions,
            freed: 0,
        }
    }
}

/// Handed to each emitter while it runs.
pub struct EmitContext<'a> {
    pub layer: LayerId,
    pub mm: &'a mut MemoryManager,
}

pub type Emitter =
    Box<dyn FnOnce(&mut EmitContext<'_>) -> tpc_mem::Result<Option<LayerStats>>>;

/// Box a closure as an [`Emitter`], pinning down its signature.
pub fn emitter<F>(f: F) -> Emitter
where
    F: FnOnce(&mut EmitContext<'_>) -> tpc_mem::Result<Option<LayerStats>> + 'static,
{
    Box::new(f)
}

/// Model traversal. Implemented per input format.
pub trait Frontend {
    /// Stage constants in `mm` and return the per-layer emitters in
    /// program order.
    fn traverse(&mut self, mm: &mut MemoryManager) -> tpc_mem::Result<Vec<Emitter>>;
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub consts: Vec<u8>,
    pub manifest: CompileManifest,
    pub layers: Vec<LayerStats>,
    pub trace: Vec<TraceEvent>,
}

pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Result<Self, CompileError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile<F: Frontend + ?Sized>(
        &self,
        frontend: &mut F,
    ) -> Result<CompileOutput, CompileError> {
        self.compile_with_trace(frontend, Box::new(NoTrace))
    }

    pub fn compile_with_trace<F: Frontend + ?Sized>(
        &self,
        frontend: &mut F,
        trace: Box<dyn TraceContext>,
    ) -> Result<CompileOutput, CompileError> {
        let started_ms = now_millis();
        tracing::info!(
            array_size = self.config.arch.array_size,
            data_type = %self.config.arch.data_type,
            tracepoints = self.config.tracepoints.len(),
            "compile started"
        );
        let mut mm = MemoryManager::new(&self.config, trace)?;

        let emitters = frontend.traverse(&mut mm)?;
        let layer_count = emitters.len();
        tracing::info!(layers = layer_count, "traversal complete");

        let mut layers = Vec::new();
        for (i, emit) in emitters.into_iter().enumerate() {
            let layer = LayerId::new(i as u64);
            let span = metrics::layer_span(layer);
            let _entered = span.enter();

            let stats = {
                let mut cx = EmitContext {
                    layer,
                    mm: &mut mm,
                };
                emit(&mut cx).map_err(|source| {
                    tracing::error!(%layer, error = %source, "layer emission failed");
                    CompileError::Layer { layer, source }
                })?
            };
            let freed = mm
                .free_consumed_objects()
                .map_err(|source| CompileError::Layer { layer, source })?;

            if let Some(mut s) = stats {
                s.layer = layer;
                s.freed = freed;
                layers.push(s);
            }
        }

        let program = mm.finish();
        let const_stats = program.const_stats;

        let mut manifest = CompileManifest::new(self.config.arch.clone(), started_ms);
        manifest.consts_hash = replay::hash_consts(&program.consts);
        manifest.consts_size_bytes = program.consts.len();
        manifest.layout_hash = replay::hash_layout(&program.inputs, &program.outputs)?;
        manifest.inputs = program.inputs;
        manifest.outputs = program.outputs;
        manifest.spaces = program.spaces.iter().map(|s| s.usage()).collect();
        manifest.consts_true_scalars = const_stats.true_scalars;
        manifest.consts_vectors = const_stats.vectors;
        manifest.consts_utilization = const_stats.utilization(self.config.arch.array_size);
        manifest.layers = layer_count;
        let manifest = manifest.finish(now_millis());

        let output = CompileOutput {
            consts: program.consts,
            manifest,
            layers,
            trace: program.trace,
        };
        metrics::emit_summary(&output);
        Ok(output)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
