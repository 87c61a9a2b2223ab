//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Decode error at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Unrecognized entry encoding version 0x{0:02x}")]
    UnsupportedVersion(u8),

    #[error("Unknown compressed schema token {kind} {token}")]
    UnknownToken { kind: &'static str, token: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Core error: {0}")]
    Core(#[from] quarry_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn lock<T>(e: std::sync::PoisonError<T>) -> Self {
        Self::Database(format!("Lock error: {}", e))
    }
}
