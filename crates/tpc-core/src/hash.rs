//! Stable blake3 digests for reproducible-build checks.
//!
//! Two compiles of the same model must yield byte-identical constants and
//! identical placements; the manifest records these digests so runs can be
//! compared without diffing blobs.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    Hash256(blake3::hash(bytes).into())
}

/// Digest several byte slices as one stream, length-prefixing each part so
/// `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_parts<'a, I: IntoIterator<Item = &'a [u8]>>(parts: I) -> Hash256 {
    let mut h = Hasher::new();
    for part in parts {
        h.update(&(part.len() as u64).to_le_bytes());
        h.update(part);
    }
    Hash256(h.finalize().into())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256> {
    let bytes = serde_json::to_vec(v).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}
