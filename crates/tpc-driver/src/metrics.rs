//! Tracing hooks for the compile loop.
//!
//! Only `tracing` spans and events; exporters belong in the binary layer.

use tpc_core::id::LayerId;
use tpc_core::types::SpaceTag;

use crate::compiler::CompileOutput;

/// Span wrapping one emitter plus the sweep that follows it.
pub fn layer_span(layer: LayerId) -> tracing::Span {
    tracing::info_span!("layer", id = layer.get())
}

pub fn emit_summary(output: &CompileOutput) {
    let m = &output.manifest;
    for usage in &m.spaces {
        if usage.tag == SpaceTag::Temp {
            tracing::debug!(tag = %usage.tag, peak = usage.peak, aggregate = usage.aggregate, "space usage");
        } else {
            tracing::info!(
                tag = %usage.tag,
                capacity = usage.capacity,
                peak = usage.peak,
                aggregate = usage.aggregate,
                "space usage"
            );
        }
    }
    tracing::info!(
        layers = m.layers,
        consts_bytes = m.consts_size_bytes,
        utilization = m.consts_utilization,
        consts_hash = %m.consts_hash,
        layout_hash = %m.layout_hash,
        elapsed_ms = m.finished_ms.saturating_sub(m.started_ms),
        "compile finished"
    );
}
