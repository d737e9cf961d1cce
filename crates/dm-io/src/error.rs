//! Error types for DM3/DM4 codec operations.
//!
//! All structural failures are non-recoverable: the decode or encode call
//! aborts at the first error and surfaces the specific kind to the caller.
//! There is no partial-result mode and no retry; binary structural errors
//! are not transient.

use std::io;
use thiserror::Error;

/// Result type for DM codec operations.
pub type DmResult<T> = std::result::Result<T, DmError>;

/// DM3/DM4 codec error.
#[derive(Debug, Error)]
pub enum DmError {
    /// File I/O error (open, create, or a read/write failure that is not
    /// a premature end of stream).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended before a declared structure completed.
    #[error("truncated data: {0}")]
    TruncatedData(String),

    /// A discriminator, magic or count is outside the valid range.
    #[error("malformed tag: {0}")]
    MalformedTag(String),

    /// A type code or native type has no registry entry.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Declared pixel depth, dimensions or buffer length disagree with the
    /// resolved type.
    #[error("consistency error: {0}")]
    Consistency(String),
}

impl From<dm_core::Error> for DmError {
    fn from(e: dm_core::Error) -> Self {
        match e {
            dm_core::Error::UnsupportedType(msg) => DmError::UnsupportedType(msg),
            dm_core::Error::Consistency(msg) => DmError::Consistency(msg),
        }
    }
}
