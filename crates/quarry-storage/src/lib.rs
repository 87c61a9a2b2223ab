//! Quarry Storage - Entry encoding and storage backends
//!
//! This crate provides the versioned binary entry codec, the compressed
//! schema dictionary it can tokenize descriptions with, the optional
//! deflate envelope, and the storage backend abstraction.

#![allow(clippy::result_large_err)]

pub mod ber;
pub mod codec;
pub mod compressed;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod traits;

pub use codec::{EncodeConfig, EntryCodec, CURRENT_VERSION};
pub use compressed::{CompressedSchema, MemoryCompressedSchema};
pub use envelope::{EntryEnvelope, ENVELOPE_VERSION};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use traits::StorageBackend;
