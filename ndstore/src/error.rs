//! Error types for the ndstore dataset storage cache.

use thiserror::Error;

/// The main error type for all ndstore operations.
///
/// Every operation in the engine returns one of these categories rather than
/// panicking; callers are expected to inspect the variant and map it to their
/// own reporting mechanism. The engine never retries or suppresses an error
/// itself, and a failed operation leaves no partial registry mutation behind.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed arguments, an unknown handle, or an out-of-range
    /// dimension/coordinate index.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Description of what was invalid.
        reason: String,
    },

    /// The target of a create already exists — a file on disk for dataset
    /// creation, or a coordinate tuple for image insertion.
    #[error("entry already exists: {entry}")]
    DuplicateEntry {
        /// The conflicting file path or coordinate key.
        entry: String,
    },

    /// A descriptor is registered but its backing file has vanished from
    /// disk (e.g. removed out-of-band before a delete).
    #[error("backing file is missing: '{path}'")]
    MissingData {
        /// Path the descriptor expected to find on disk.
        path: String,
    },

    /// The descriptor cache is full under the hard-limit policy, or a
    /// storage-layer resource could not be allocated.
    #[error("out of capacity: {reason}")]
    OutOfCapacity {
        /// What ran out — cache entries or a storage-layer resource.
        reason: String,
    },

    /// A value was larger than the caller-supplied buffer. The prefix that
    /// fits has already been delivered; this signal tells the caller the
    /// value was cut so it can retry with a larger buffer.
    #[error("output truncated: {copied} of {total} delivered")]
    SequenceTooLarge {
        /// How many bytes (or list items) were delivered.
        copied: usize,
        /// Total size of the stored value.
        total: usize,
    },

    /// Unexpected codec or filesystem failure.
    #[error("internal storage error: {reason}")]
    Internal {
        /// Description of the failing operation.
        reason: String,
        /// The underlying I/O error, when one exists.
        #[source]
        source: Option<std::io::Error>,
    },
}

impl StorageError {
    /// Shorthand for an [`StorageError::InvalidInput`] with a formatted reason.
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`StorageError::Internal`] wrapping an I/O error.
    pub(crate) fn internal_io(reason: impl Into<String>, source: std::io::Error) -> Self {
        Self::Internal {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Shorthand for an [`StorageError::Internal`] with no underlying cause.
    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
            source: None,
        }
    }
}

/// Type alias for `Result<T, StorageError>`.
pub type Result<T> = std::result::Result<T, StorageError>;
