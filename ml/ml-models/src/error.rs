//! Error types for ml-models crate.

use ml_checkpoint::CheckpointError;
use thiserror::Error;

/// Errors that can occur in ml-models operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A configuration that cannot build a network.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Store-level checkpoint failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl ModelError {
    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

/// Result type for ml-models operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn error_invalid_config() {
        let err = ModelError::invalid_config("class_count must be > 0");
        assert!(err.to_string().contains("class_count must be > 0"));
    }

    #[test]
    fn error_from_checkpoint_error() {
        let err: ModelError = CheckpointError::checkpoint_not_found("/missing.safetensors").into();
        assert!(matches!(err, ModelError::Checkpoint(_)));
        assert!(err.to_string().contains("/missing.safetensors"));
    }

    #[test]
    fn checkpoint_error_keeps_its_message() {
        let err: ModelError = CheckpointError::store_unreadable("model.json", "expected value").into();
        assert_eq!(
            err.to_string(),
            "failed to read tensor store from model.json: expected value"
        );
    }
}
