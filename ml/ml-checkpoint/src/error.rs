//! Error types for ml-checkpoint crate.

use thiserror::Error;

/// Store-level errors. Any of these aborts the whole checkpoint operation.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The backing medium exists but could not be opened or parsed.
    #[error("failed to read tensor store from {path}: {reason}")]
    StoreUnreadable {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// The store could not be written.
    #[error("failed to write tensor store to {path}: {reason}")]
    StoreUnwritable {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Checkpoint file not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Unsupported checkpoint format.
    #[error("unsupported checkpoint format: {0}")]
    UnsupportedFormat(String),

    /// A tensor whose value count disagrees with its shape.
    #[error("invalid tensor {key}: shape {shape:?} needs {expected} values, got {actual}")]
    InvalidTensor {
        /// Store key.
        key: String,
        /// Declared shape.
        shape: Vec<usize>,
        /// Element count implied by the shape.
        expected: usize,
        /// Element count present.
        actual: usize,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CheckpointError {
    /// Creates a store unreadable error.
    #[must_use]
    pub fn store_unreadable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a store unwritable error.
    #[must_use]
    pub fn store_unwritable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnwritable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a checkpoint not found error.
    #[must_use]
    pub fn checkpoint_not_found(path: impl Into<String>) -> Self {
        Self::CheckpointNotFound(path.into())
    }

    /// Creates an unsupported format error.
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Per-tensor load failures.
///
/// These never abort a traversal. They are collected in a
/// [`LoadReport`](crate::LoadReport) and the affected tensor keeps its prior value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorLoadError {
    /// A candidate key was present but its tensor has the wrong shape.
    #[error("shape mismatch for {key}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Key that was found.
        key: String,
        /// Shape of the target parameter.
        expected: Vec<usize>,
        /// Shape stored under the key.
        found: Vec<usize>,
    },

    /// None of the candidate keys exist in the store.
    #[error("no tensor found for any of {candidates:?}")]
    KeyNotFound {
        /// Keys probed, in order.
        candidates: Vec<String>,
    },
}

/// Result type for ml-checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
