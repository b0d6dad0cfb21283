use thiserror::Error;

use tpc_core::types::{ScalarKind, SpaceTag};

/// Result type local to tpc-mem.
pub type Result<T> = std::result::Result<T, Error>;

/// Every variant is fatal for the compile; nothing here is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("out of memory in {tag}: requested {requested} vectors, {available} available")]
    OutOfMemory {
        tag: SpaceTag,
        requested: usize,
        available: usize,
    },

    #[error("memory object '{name}' already exists")]
    DuplicateName { name: String },

    #[error("memory object '{name}' not found")]
    NotFound { name: String },

    #[error("constant '{name}' has no {kind} encoding for this architecture")]
    UnsupportedEncoding { name: String, kind: ScalarKind },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("object '{name}' declares {expected} vectors but its span covers {actual}")]
    SpanSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid free of {tag} address {address}")]
    InvalidFree { tag: SpaceTag, address: usize },

    #[error("allocator invariant failed: {0}")]
    Invariant(String),

    #[error(transparent)]
    Core(#[from] tpc_core::error::Error),
}
