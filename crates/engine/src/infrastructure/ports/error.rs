//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Record not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Storage operation failed - includes operation name for tracing.
    #[error("Storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored or submitted record breaks a storage constraint.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        Self::Storage {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_the_record() {
        let err = RepoError::not_found("Character", "tordek");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Character not found: tordek");
    }

    #[test]
    fn test_storage_message_names_the_operation() {
        let err = RepoError::storage("read", "permission denied");
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Storage error in read: permission denied");
    }

    #[test]
    fn test_json_errors_become_serialization_errors() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = RepoError::from(parse);
        assert!(matches!(err, RepoError::Serialization(_)));
    }
}
