//! Error types for the persistence layer
//!
//! The public save/load surface reports failures as `bool`/`Option`; these
//! errors exist for the `try_*` variants and for logging.

/// Errors raised by a key-value store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Write would exceed the storage quota
    #[error("storage quota exceeded writing '{key}' ({bytes} bytes)")]
    QuotaExceeded {
        /// Key being written
        key: String,
        /// Size of the rejected value
        bytes: usize,
    },

    /// Key contains characters the backend cannot store
    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),

    /// IO error in a file-backed store
    #[error("io error on '{key}': {source}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether the failure is a quota failure
    #[inline]
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Errors raised while persisting canvas state
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Payload over the size guard
    #[error("payload too large: {bytes} bytes (max: {max})")]
    TooLarge {
        /// Serialized size
        bytes: usize,
        /// Configured maximum
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_classification() {
        let err = StorageError::QuotaExceeded {
            key: "canvas-storage".into(),
            bytes: 10,
        };
        assert!(err.is_quota());
        assert!(!StorageError::InvalidKey("a/b".into()).is_quota());
    }

    #[test]
    fn too_large_display() {
        let err = PersistError::TooLarge { bytes: 6, max: 5 };
        assert!(err.to_string().contains("too large"));
    }
}
