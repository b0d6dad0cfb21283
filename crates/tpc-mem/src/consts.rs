//! Staging registry for constants that are not yet placed in memory.
//!
//! The frontend stages every constant tensor it extracts from the model.
//! A staged tensor is promoted to a memory object the first time a layer
//! asks for it; until then it can be read back through the typed getters
//! (e.g. shape tensors that never reach the accelerator).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tpc_core::types::{MemoryDimensions, ScalarKind, TensorData, TensorValues};

use crate::error::{Error, Result};

#[derive(Debug, Default, Clone)]
pub struct PendingConsts {
    entries: HashMap<String, Arc<TensorData>>,
}

impl PendingConsts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `data` under `name`. Each name is written once.
    pub fn add(&mut self, name: &str, data: TensorData) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
            });
        }
        tracing::trace!(name, kind = %data.kind(), scalars = data.len(), "staged constant");
        self.entries.insert(name.to_string(), Arc::new(data));
        Ok(())
    }

    /// Make the tensor staged under `name` also visible as `alias`, sharing
    /// the values. Does nothing when `name` is not staged.
    pub fn alias(&mut self, name: &str, alias: &str) {
        if let Some(data) = self.entries.get(name).cloned() {
            self.entries.insert(alias.to_string(), data);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<ScalarKind> {
        self.entries.get(name).map(|d| d.kind())
    }

    pub fn get(&self, name: &str) -> Result<Arc<TensorData>> {
        self.entries.get(name).cloned().ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    pub fn f32(&self, name: &str) -> Result<&[f32]> {
        match self.entries.get(name).map(|d| d.values()) {
            Some(TensorValues::F32(v)) => Ok(v),
            _ => Err(not_found(name)),
        }
    }

    pub fn i32(&self, name: &str) -> Result<&[i32]> {
        match self.entries.get(name).map(|d| d.values()) {
            Some(TensorValues::I32(v)) => Ok(v),
            _ => Err(not_found(name)),
        }
    }

    pub fn i64(&self, name: &str) -> Result<&[i64]> {
        match self.entries.get(name).map(|d| d.values()) {
            Some(TensorValues::I64(v)) => Ok(v),
            _ => Err(not_found(name)),
        }
    }
}

fn not_found(name: &str) -> Error {
    Error::NotFound {
        name: name.to_string(),
    }
}

/// Running totals over every materialized constant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstStats {
    pub objects: usize,
    pub true_scalars: usize,
    pub vectors: usize,
}

impl ConstStats {
    /// Zero-sized entries are skipped.
    pub fn record(&mut self, dims: MemoryDimensions) {
        if dims.vectors == 0 {
            return;
        }
        self.objects += 1;
        self.true_scalars += dims.scalars;
        self.vectors += dims.vectors;
    }

    /// True scalars over available vector lanes.
    pub fn utilization(&self, array_size: usize) -> f64 {
        let lanes = self.vectors * array_size;
        if lanes == 0 {
            return 0.0;
        }
        self.true_scalars as f64 / lanes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_shares_values() {
        let mut p = PendingConsts::new();
        p.add("w", TensorData::f32(vec![2], vec![1.0, 2.0]).unwrap())
            .unwrap();
        p.alias("w", "w_renamed");
        p.alias("missing", "nothing");
        assert!(Arc::ptr_eq(&p.get("w").unwrap(), &p.get("w_renamed").unwrap()));
        assert!(!p.contains("nothing"));
    }

    #[test]
    fn test_typed_getter_checks_kind() {
        let mut p = PendingConsts::new();
        p.add("shape", TensorData::i64(vec![2], vec![1, 64]).unwrap())
            .unwrap();
        assert_eq!(p.i64("shape").unwrap(), &[1, 64]);
        assert!(matches!(p.f32("shape"), Err(Error::NotFound { .. })));
        assert!(matches!(p.i32("absent"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_restaging_is_rejected() {
        let mut p = PendingConsts::new();
        p.add("b", TensorData::i32(vec![1], vec![3]).unwrap()).unwrap();
        let again = p.add("b", TensorData::i32(vec![1], vec![4]).unwrap());
        assert!(matches!(again, Err(Error::DuplicateName { .. })));
        assert_eq!(p.i32("b").unwrap(), &[3]);
    }

    #[test]
    fn test_stats_skip_degenerate_entries() {
        let mut s = ConstStats::default();
        s.record(MemoryDimensions::new(5, 2));
        s.record(MemoryDimensions::new(0, 0));
        assert_eq!(s.objects, 1);
        assert!((s.utilization(4) - 5.0 / 8.0).abs() < 1e-9);
    }
}
