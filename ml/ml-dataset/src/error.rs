//! Error types for ml-dataset crate.

use thiserror::Error;

/// Errors that can occur in ml-dataset operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A split directory does not exist.
    #[error("missing split directory: {0}")]
    MissingSplit(String),

    /// A split contains no images.
    #[error("split {0} contains no images")]
    EmptyDataset(String),

    /// A validation class directory has no training counterpart.
    #[error("class {class} in {split} is not present in the training split")]
    UnknownClass {
        /// Class directory name.
        class: String,
        /// Split the class was found in.
        split: String,
    },

    /// An image could not be decoded.
    #[error("failed to decode image {path}: {reason}")]
    ImageDecode {
        /// Image path.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Batch size of zero.
    #[error("invalid batch size: {0}")]
    InvalidBatchSize(usize),

    /// Invalid configuration value.
    #[error("invalid dataset configuration: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl DatasetError {
    /// Creates a missing split error.
    #[must_use]
    pub fn missing_split(path: impl Into<String>) -> Self {
        Self::MissingSplit(path.into())
    }

    /// Creates an empty dataset error.
    #[must_use]
    pub fn empty_dataset(split: impl Into<String>) -> Self {
        Self::EmptyDataset(split.into())
    }

    /// Creates an unknown class error.
    #[must_use]
    pub fn unknown_class(class: impl Into<String>, split: impl Into<String>) -> Self {
        Self::UnknownClass {
            class: class.into(),
            split: split.into(),
        }
    }

    /// Creates an image decode error.
    #[must_use]
    pub fn image_decode(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImageDecode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for ml-dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn error_missing_split() {
        let err = DatasetError::missing_split("/data/imageposture-320/val");
        assert!(err.to_string().contains("imageposture-320/val"));
    }

    #[test]
    fn error_empty_dataset() {
        let err = DatasetError::empty_dataset("train");
        assert!(err.to_string().contains("train"));
    }

    #[test]
    fn error_unknown_class() {
        let err = DatasetError::unknown_class("slouching", "val");
        let msg = err.to_string();
        assert!(msg.contains("slouching"));
        assert!(msg.contains("val"));
    }

    #[test]
    fn error_image_decode() {
        let err = DatasetError::image_decode("a.jpg", "truncated");
        assert!(err.to_string().contains("a.jpg"));
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn error_invalid_batch_size() {
        let err = DatasetError::InvalidBatchSize(0);
        assert!(err.to_string().contains('0'));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: DatasetError = io_err.into();
        assert!(matches!(err, DatasetError::Io(_)));
    }
}
