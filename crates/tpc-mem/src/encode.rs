//! Constants stream writer.
//!
//! Layout: scalars in the architecture's native encoding, innermost axis
//! zero padded to a whole number of vectors, objects back to back in the
//! order they are first materialized.

use tpc_core::arch::Architecture;
use tpc_core::types::{ScalarKind, TensorData, TensorValues};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConstStream {
    arch: Architecture,
    bytes: Vec<u8>,
}

impl ConstStream {
    pub fn new(arch: Architecture) -> Self {
        Self {
            arch,
            bytes: Vec::new(),
        }
    }

    /// Fails for scalar kinds the stream has no writer for.
    pub fn ensure_encodable(name: &str, kind: ScalarKind) -> Result<()> {
        match kind {
            ScalarKind::I32 | ScalarKind::F32 => Ok(()),
            ScalarKind::I64 => Err(Error::UnsupportedEncoding {
                name: name.to_string(),
                kind,
            }),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn vector_bytes(&self) -> usize {
        self.arch.array_size * self.arch.data_type.size_bytes()
    }

    /// Serialize `tensor` with its natural layout.
    pub fn write_tensor(&mut self, name: &str, tensor: &TensorData) -> Result<()> {
        let row_len = tensor.shape().last().copied().unwrap_or(1);
        match tensor.values() {
            TensorValues::F32(v) => self.write_rows(row_len, v.iter().copied()),
            TensorValues::I32(v) => self.write_rows(row_len, v.iter().map(|&x| x as f32)),
            TensorValues::I64(_) => return Self::ensure_encodable(name, ScalarKind::I64),
        }
        Ok(())
    }

    /// Fill `vectors` whole vectors with the tensor's single scalar.
    pub fn write_broadcast(&mut self, name: &str, tensor: &TensorData, vectors: usize) -> Result<()> {
        let value = match tensor.values() {
            TensorValues::F32(v) => v.first().copied(),
            TensorValues::I32(v) => v.first().map(|&x| x as f32),
            TensorValues::I64(_) => return Self::ensure_encodable(name, ScalarKind::I64),
        };
        let value = value.ok_or_else(|| {
            Error::Configuration(format!("cannot broadcast empty constant '{name}'"))
        })?;
        for _ in 0..vectors * self.arch.array_size {
            self.arch.data_type.write_f32(value, &mut self.bytes);
        }
        Ok(())
    }

    fn write_rows(&mut self, row_len: usize, values: impl Iterator<Item = f32>) {
        let pad = self.arch.padded_row(row_len) - row_len;
        let dt = self.arch.data_type;
        let mut col = 0;
        for v in values {
            dt.write_f32(v, &mut self.bytes);
            col += 1;
            if col == row_len {
                for _ in 0..pad {
                    dt.write_f32(0.0, &mut self.bytes);
                }
                col = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpc_core::arch::DataType;

    fn stream(width: usize) -> ConstStream {
        ConstStream::new(Architecture {
            data_type: DataType::Float32,
            array_size: width,
            ..Architecture::default()
        })
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_rows_are_padded_per_innermost_axis() {
        let mut s = stream(4);
        let t = TensorData::f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        s.write_tensor("t", &t).unwrap();
        assert_eq!(
            floats(s.bytes()),
            vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0]
        );
    }

    #[test]
    fn test_int_constants_are_converted() {
        let mut s = stream(2);
        let t = TensorData::i32(vec![], vec![-3]).unwrap();
        s.write_tensor("t", &t).unwrap();
        assert_eq!(floats(s.bytes()), vec![-3.0, 0.0]);
    }

    #[test]
    fn test_int64_has_no_writer() {
        let mut s = stream(2);
        let t = TensorData::i64(vec![1], vec![9]).unwrap();
        assert!(matches!(
            s.write_tensor("t", &t),
            Err(Error::UnsupportedEncoding { kind: ScalarKind::I64, .. })
        ));
        assert!(s.is_empty());
    }
}
