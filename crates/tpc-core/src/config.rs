//! Compiler configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::arch::{Architecture, DataType};
use crate::error::{Error, Result};
use crate::types::{MemoryRef, SpaceTag};

/// Diagnostic predicate evaluated against freshly placed memory.
///
/// Every predicate that is present must match; an empty tracepoint matches
/// every address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracepoint {
    pub tag: Option<SpaceTag>,
    /// Half-open address range.
    pub addresses: Option<Range<usize>>,
    pub name_prefix: Option<String>,
}

impl Tracepoint {
    pub fn matches(&self, r: MemoryRef, object_name: &str) -> bool {
        if self.tag.is_some_and(|t| t != r.tag) {
            return false;
        }
        if let Some(range) = &self.addresses {
            if !range.contains(&r.address) {
                return false;
            }
        }
        if let Some(prefix) = &self.name_prefix {
            if !object_name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub arch: Architecture,

    /// Tracepoints recorded before the first instruction. Empty disables tracing.
    #[serde(default)]
    pub tracepoints: Vec<Tracepoint>,
}

impl CompilerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TPC_ARRAY_SIZE`: scalars per vector
    /// - `TPC_DATA_TYPE`: `FP16BP8`, `FP32BP16` or `FLOAT32`
    /// - `TPC_DRAM0_DEPTH`: off-chip region 0 capacity (vectors)
    /// - `TPC_DRAM1_DEPTH`: off-chip region 1 capacity (vectors)
    /// - `TPC_LOCAL_DEPTH`: on-chip scratch capacity (vectors)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("TPC_ARRAY_SIZE") {
            cfg.arch.array_size = v;
        }

        if let Ok(s) = std::env::var("TPC_DATA_TYPE") {
            if let Ok(dt) = s.parse::<DataType>() {
                cfg.arch.data_type = dt;
            }
        }

        if let Some(v) = env_usize("TPC_DRAM0_DEPTH") {
            cfg.arch.dram0_depth = v;
        }

        if let Some(v) = env_usize("TPC_DRAM1_DEPTH") {
            cfg.arch.dram1_depth = v;
        }

        if let Some(v) = env_usize("TPC_LOCAL_DEPTH") {
            cfg.arch.local_depth = v;
        }

        cfg
    }

    /// Parse a JSON config document and validate it.
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.arch.validate()?;
        for tp in &self.tracepoints {
            if let Some(range) = &tp.addresses {
                if range.start >= range.end {
                    return Err(Error::Config(format!(
                        "tracepoint address range {range:?} is empty"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_with_tracepoints() {
        let json = r#"{
            "arch": {
                "data_type": "Float32",
                "array_size": 4,
                "dram0_depth": 64,
                "dram1_depth": 64,
                "local_depth": 16
            },
            "tracepoints": [
                { "tag": "local", "addresses": { "start": 0, "end": 4 }, "name_prefix": null }
            ]
        }"#;
        let cfg = CompilerConfig::from_json(json).unwrap();
        assert_eq!(cfg.arch.array_size, 4);
        assert_eq!(cfg.arch.data_type, DataType::Float32);
        assert_eq!(cfg.tracepoints.len(), 1);
        assert!(cfg.tracepoints[0].matches(MemoryRef::new(SpaceTag::Local, 3), "x"));
        assert!(!cfg.tracepoints[0].matches(MemoryRef::new(SpaceTag::Local, 4), "x"));
        assert!(!cfg.tracepoints[0].matches(MemoryRef::new(SpaceTag::Dram0, 0), "x"));
    }

    #[test]
    fn test_zero_array_size_rejected() {
        let mut cfg = CompilerConfig::default();
        cfg.arch.array_size = 0;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_name_prefix_tracepoint() {
        let tp = Tracepoint {
            name_prefix: Some("conv1".into()),
            ..Tracepoint::default()
        };
        assert!(tp.matches(MemoryRef::new(SpaceTag::Dram1, 9), "conv1/weights"));
        assert!(!tp.matches(MemoryRef::new(SpaceTag::Dram1, 9), "conv2/weights"));
    }
}
