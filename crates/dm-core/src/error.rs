//! Error types for dm-core operations.
//!
//! Failures at this layer are about the data model itself: a type code with
//! no registry entry, or values whose declared layout disagrees with the
//! bytes actually present. Stream-level failures (truncation, malformed tag
//! framing) live in `dm-io`.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while working with DM core types.
#[derive(Debug, Error)]
pub enum Error {
    /// A type code or native type has no registry entry.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A declared layout disagrees with the actual data.
    ///
    /// Examples: a struct-array whose byte length is not a multiple of its
    /// field stride, or a pixel buffer handed a data type of a different
    /// sample width.
    #[error("inconsistent data: {0}")]
    Consistency(String),
}
