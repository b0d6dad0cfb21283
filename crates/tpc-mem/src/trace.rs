//! Diagnostic side channel.
//!
//! The manager reports symbolic annotations of freshly placed memory and
//! blend events here. Nothing is ever read back, so whether tracing is
//! enabled cannot change the generated program.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use tpc_core::types::{InstructionPosition, MemoryRef};

use crate::object::MemoryObject;

/// Object name plus vector offset within that object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceAnnotation {
    pub name: String,
    pub offset: usize,
}

impl fmt::Display for TraceAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    Tracepoints {
        position: InstructionPosition,
        annotations: BTreeMap<MemoryRef, TraceAnnotation>,
    },
    Blend {
        object: String,
        blendees: Vec<String>,
    },
}

/// Receiver for trace data. Implemented by offline tooling.
pub trait TraceContext: Send {
    fn emit_tracepoints(
        &mut self,
        position: InstructionPosition,
        annotations: BTreeMap<MemoryRef, TraceAnnotation>,
    );

    fn blend_objects(&mut self, object: &MemoryObject, blendees: &[&str]);

    /// Hand back recorded events, if this context keeps any.
    fn take_events(&mut self) -> Vec<TraceEvent> {
        vec![]
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl TraceContext for NoTrace {
    fn emit_tracepoints(&mut self, _: InstructionPosition, _: BTreeMap<MemoryRef, TraceAnnotation>) {}

    fn blend_objects(&mut self, _: &MemoryObject, _: &[&str]) {}
}

/// Keeps an ordered event log.
#[derive(Debug, Default, Clone)]
pub struct RecordingTrace {
    events: Vec<TraceEvent>,
}

impl RecordingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }
}

impl TraceContext for RecordingTrace {
    fn emit_tracepoints(
        &mut self,
        position: InstructionPosition,
        annotations: BTreeMap<MemoryRef, TraceAnnotation>,
    ) {
        self.events.push(TraceEvent::Tracepoints {
            position,
            annotations,
        });
    }

    fn blend_objects(&mut self, object: &MemoryObject, blendees: &[&str]) {
        self.events.push(TraceEvent::Blend {
            object: object.name.clone(),
            blendees: blendees.iter().map(|b| b.to_string()).collect(),
        });
    }

    fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}
