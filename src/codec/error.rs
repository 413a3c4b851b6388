//! Custom error types for the racebin codec.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An error originating from I/O operations (schema resource reads).
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// A structure resource is missing or malformed.
    #[error("Failed to load structure '{resource}': {reason}")]
    SchemaLoad { resource: String, reason: String },

    /// The input buffer ended in the middle of a field.
    #[error("Unexpected end of data at offset {offset} (need {need} bytes, have {have})")]
    UnexpectedEndOfData {
        offset: usize,
        need: usize,
        have: usize,
    },

    /// A seek landed outside the buffer. The message carries the valid range.
    #[error("Offset {offset} out of bounds (valid range 0..{len})")]
    OutOfBounds { offset: usize, len: usize },

    /// A repeater's count could not be resolved, or resolved to a negative value.
    #[error("Invalid repeat count for repeater '{repeater}': {reason}")]
    InvalidRepeatCount { repeater: String, reason: String },

    /// The encoder found no store entry for a field the structure requires.
    #[error("Missing store entry for '{path}'")]
    MissingStoreEntry { path: String },

    /// A store value does not fit the field's declared size.
    #[error("Value at '{path}' does not fit in {size} bytes: {reason}")]
    ValueTooLarge {
        path: String,
        size: usize,
        reason: String,
    },

    /// A text value contains characters the on-disk encoding cannot
    /// represent; writing it would silently corrupt the field.
    #[error("Text at '{path}' contains characters not representable in windows-1252")]
    UnencodableText { path: String },

    /// A store value has the wrong kind for the field it is encoded into.
    #[error("Value at '{path}' has kind {found}, field expects {expected}")]
    ValueKindMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

/// A convenience `Result` type alias using the crate's `CodecError` type.
pub type Result<T> = std::result::Result<T, CodecError>;
