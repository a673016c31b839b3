//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding fields and tuples.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid or non-canonical structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A CBOR construct outside the supported subset.
    #[error("unsupported CBOR item: {what}")]
    Unsupported {
        /// What was found.
        what: &'static str,
    },

    /// Text is not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// A declared length or nesting depth exceeds the decoder limits.
    #[error("size limit exceeded: {claimed} > {max_allowed}")]
    SizeLimitExceeded {
        /// Claimed size.
        claimed: u64,
        /// Maximum allowed size.
        max_allowed: u64,
    },

    /// Trailing bytes after a complete value.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of bytes left over.
        count: usize,
    },
}

impl CodecError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Returns true if more input could have completed the value.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof)
    }
}
