/// All errors that can be returned by a BrokerStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record with the given key.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A record with this key already exists (unique constraint).
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub(crate) fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
        StorageError::AlreadyExists {
            kind,
            key: key.into(),
        }
    }
}
