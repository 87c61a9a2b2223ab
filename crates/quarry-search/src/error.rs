//! Search error types

use quarry_core::limits::LimitError;
use quarry_core::ResultCode;
use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Search-specific error types
///
/// A filter evaluating to `Undefined` is not an error; these variants cover
/// filter text that cannot be parsed and filter trees that cannot be
/// evaluated at all.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid filter at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("Malformed filter {filter}: {reason}")]
    Malformed { filter: String, reason: String },

    #[error("Filter {filter} is nested too deeply for entry {dn}")]
    NestedTooDeep { filter: String, dn: String },

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error(transparent)]
    Core(#[from] quarry_core::Error),
}

impl SearchError {
    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(filter: impl ToString, reason: impl Into<String>) -> Self {
        Self::Malformed {
            filter: filter.to_string(),
            reason: reason.into(),
        }
    }

    /// Result code a protocol layer would answer with
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::Parse { .. } | Self::Malformed { .. } | Self::Limit(_) => ResultCode::ProtocolError,
            Self::NestedTooDeep { .. } => ResultCode::Other,
            Self::Core(e) => e.result_code(),
        }
    }
}
