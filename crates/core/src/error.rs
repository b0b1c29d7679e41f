use pactbroker_storage::StorageError;

/// Errors surfaced by the broker's domain services.
///
/// The HTTP layer maps `NotFound` to 404, `Validation` to 400,
/// `Conflict` to 409 and everything else to 500.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// A referenced entity (pacticipant, version, environment, pact, ...) does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Supplied parameters failed validation. Never escalated to a server error.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A uniqueness rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage-layer failure.
    #[error(transparent)]
    Storage(StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        BrokerError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Validation messages, if this is a validation failure.
    pub fn validation_messages(&self) -> Option<&[String]> {
        match self {
            BrokerError::Validation(messages) => Some(messages),
            _ => None,
        }
    }
}

impl From<StorageError> for BrokerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { kind, key } => BrokerError::NotFound { kind, key },
            StorageError::AlreadyExists { kind, key } => {
                BrokerError::Conflict(format!("{kind} already exists: {key}"))
            }
            other => BrokerError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let err: BrokerError = StorageError::NotFound {
            kind: "pacticipant",
            key: "Foo".to_string(),
        }
        .into();
        assert!(matches!(err, BrokerError::NotFound { kind: "pacticipant", .. }));
        assert_eq!(err.to_string(), "pacticipant not found: Foo");
    }

    #[test]
    fn storage_duplicate_maps_to_conflict() {
        let err: BrokerError = StorageError::AlreadyExists {
            kind: "environment",
            key: "production".to_string(),
        }
        .into();
        assert!(matches!(err, BrokerError::Conflict(_)));
    }

    #[test]
    fn backend_failure_stays_a_storage_error() {
        let err: BrokerError = StorageError::Backend("disk full".to_string()).into();
        assert!(matches!(err, BrokerError::Storage(_)));
        assert!(err.validation_messages().is_none());
    }
}
