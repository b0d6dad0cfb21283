//! Accelerator description.
//!
//! The allocator only needs a handful of numbers from the architecture: how
//! wide a vector is, how deep each physical memory is, and how a scalar is
//! encoded in the constants blob.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::MemoryDimensions;

/// Native scalar encoding of the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 16-bit fixed point with 8 fractional bits.
    Fp16Bp8,
    /// 32-bit fixed point with 16 fractional bits.
    Fp32Bp16,
    /// IEEE-754 binary32.
    Float32,
}

impl DataType {
    /// Encoded size of one scalar in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            DataType::Fp16Bp8 => 2,
            DataType::Fp32Bp16 | DataType::Float32 => 4,
        }
    }

    /// Append the little-endian encoding of `v`.
    ///
    /// Fixed-point formats round to nearest and saturate at the type bounds;
    /// NaN encodes as zero.
    pub fn write_f32(self, v: f32, out: &mut Vec<u8>) {
        match self {
            DataType::Fp16Bp8 => {
                let q = (v * 256.0).round() as i16;
                out.extend_from_slice(&q.to_le_bytes());
            }
            DataType::Fp32Bp16 => {
                let q = (f64::from(v) * 65536.0).round() as i32;
                out.extend_from_slice(&q.to_le_bytes());
            }
            DataType::Float32 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Fp16Bp8 => "FP16BP8",
            DataType::Fp32Bp16 => "FP32BP16",
            DataType::Float32 => "FLOAT32",
        };
        f.write_str(s)
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FP16BP8" => Ok(DataType::Fp16Bp8),
            "FP32BP16" => Ok(DataType::Fp32Bp16),
            "FLOAT32" | "FP32" => Ok(DataType::Float32),
            other => Err(Error::Config(format!("unknown data type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub data_type: DataType,

    /// Scalars per vector (systolic array width).
    pub array_size: usize,

    /// Capacities in vectors.
    pub dram0_depth: usize,
    pub dram1_depth: usize,
    pub local_depth: usize,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            data_type: DataType::Fp16Bp8,
            array_size: 8,
            dram0_depth: 1 << 20,
            dram1_depth: 1 << 20,
            local_depth: 8 << 10,
        }
    }
}

impl Architecture {
    pub fn validate(&self) -> Result<()> {
        if self.array_size == 0 {
            return Err(Error::Config("array_size must be positive".into()));
        }
        Ok(())
    }

    /// Default dimension-construction rule.
    ///
    /// The innermost axis is packed into vectors of `array_size` lanes (the
    /// tail vector is zero padded); outer axes multiply the vector count.
    /// A rank-0 shape is one scalar in one vector.
    pub fn make_dims(&self, shape: &[usize]) -> MemoryDimensions {
        let scalars = shape.iter().product();
        let vectors = match shape.split_last() {
            Some((last, outer)) => {
                outer.iter().product::<usize>() * last.div_ceil(self.array_size)
            }
            None => 1,
        };
        MemoryDimensions::new(scalars, vectors)
    }

    /// Lanes per vector after padding the innermost axis.
    pub fn padded_row(&self, row_len: usize) -> usize {
        row_len.div_ceil(self.array_size) * self.array_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(width: usize) -> Architecture {
        Architecture {
            array_size: width,
            ..Architecture::default()
        }
    }

    #[test]
    fn test_make_dims_pads_innermost_axis() {
        let a = arch(4);
        assert_eq!(a.make_dims(&[5]), MemoryDimensions::new(5, 2));
        assert_eq!(a.make_dims(&[3, 5]), MemoryDimensions::new(15, 6));
        assert_eq!(a.make_dims(&[8]), MemoryDimensions::new(8, 2));
        assert_eq!(a.make_dims(&[]), MemoryDimensions::new(1, 1));
        assert_eq!(a.make_dims(&[0, 4]), MemoryDimensions::new(0, 0));
    }

    #[test]
    fn test_fixed_point_encoding_rounds_and_saturates() {
        let mut out = Vec::new();
        DataType::Fp16Bp8.write_f32(1.5, &mut out);
        assert_eq!(out, 384i16.to_le_bytes());

        out.clear();
        DataType::Fp16Bp8.write_f32(1000.0, &mut out);
        assert_eq!(out, i16::MAX.to_le_bytes());

        out.clear();
        DataType::Fp32Bp16.write_f32(-0.5, &mut out);
        assert_eq!(out, (-32768i32).to_le_bytes());

        out.clear();
        DataType::Float32.write_f32(2.25, &mut out);
        assert_eq!(out, 2.25f32.to_le_bytes());
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!("fp16bp8".parse::<DataType>().unwrap(), DataType::Fp16Bp8);
        assert!("int4".parse::<DataType>().is_err());
    }
}
