//! Common error handling utilities and conventions

use std::path::PathBuf;

/// Standard result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Core error types that can be shared across crates
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO operation failed: {message}")]
    Io { message: String },
}

impl CoreError {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::invalid_config(err.to_string())
    }
}

/// Failures of the durable key-value storage backends.
///
/// Cloneable so a single failure can be reported to several waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read {key} from {}: {message}", path.display())]
    Read {
        key: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to write {key} to {}: {message}", path.display())]
    Write {
        key: String,
        path: PathBuf,
        message: String,
    },

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        Self::io_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_maps_to_invalid_config() {
        let err: CoreError = config::ConfigError::Message("missing base_url".into()).into();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
        assert!(err.to_string().contains("missing base_url"));
    }

    #[test]
    fn test_storage_error_display_names_key_and_path() {
        let err = StorageError::Write {
            key: "refresh_token".into(),
            path: PathBuf::from("/tmp/latch/refresh_token"),
            message: "permission denied".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("refresh_token"));
        assert!(rendered.contains("/tmp/latch/refresh_token"));
        assert!(rendered.contains("permission denied"));
    }
}
