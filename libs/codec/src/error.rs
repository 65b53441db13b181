//! Codec errors
//!
//! Every decode failure carries enough context to log a useful line for the
//! dropped message; none of them is fatal to the process.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the declared structure was complete
    #[error("Truncated input: need {need} bytes, got {got} (context: {context})")]
    Truncated {
        need: usize,
        got: usize,
        context: &'static str,
    },

    /// A length does not fit the field's prefix
    #[error("Length {len} exceeds limit {limit} (context: {context})")]
    TooLarge {
        len: usize,
        limit: usize,
        context: &'static str,
    },

    /// String field is not valid UTF-8
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    /// Bytes left over after a complete value was decoded
    #[error("{remaining} trailing bytes after decoding {context}")]
    TrailingBytes {
        remaining: usize,
        context: &'static str,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

impl CodecError {
    pub fn truncated(need: usize, got: usize, context: &'static str) -> Self {
        Self::Truncated { need, got, context }
    }

    pub fn too_large(len: usize, limit: usize, context: &'static str) -> Self {
        Self::TooLarge { len, limit, context }
    }
}
