//! Unified error types for the domain layer
//!
//! Expected conditions (missing entity, empty slot, unknown placeholder) are
//! never errors here: they travel as [`crate::Warning`] values. `DomainError`
//! covers malformed input at the edges and broken internal invariants.

use thiserror::Error;

use crate::formula::EvaluationError;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Parse error (for value objects and persisted records)
    #[error("Parse error: {0}")]
    Parse(String),

    /// An internal invariant was broken. This is the only hard stop; it points
    /// at an upstream bug rather than at a player action.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl DomainError {
    /// Creates a validation error for malformed caller input.
    ///
    /// # Example
    /// ```ignore
    /// if resource_id.is_empty() {
    ///     return Err(DomainError::validation("Resource id cannot be empty"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a parse error for string-to-type conversion failures.
    ///
    /// Use this in `FromStr` implementations when the input string
    /// doesn't match any known variant or format:
    /// - Unknown bonus type names
    /// - Malformed slot ids
    /// - Character records that are not valid JSON
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Whether this error is the hard-stop tier.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

impl From<EvaluationError> for DomainError {
    fn from(err: EvaluationError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("resource id cannot be empty");
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: resource id cannot be empty"
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = DomainError::not_found("Resource", "ki-pool");
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(err.to_string().contains("Resource"));
        assert!(err.to_string().contains("ki-pool"));
    }

    #[test]
    fn test_from_evaluation_error() {
        let domain_err: DomainError = EvaluationError::DivisionByZero.into();
        assert!(matches!(domain_err, DomainError::Parse(_)));
        assert!(domain_err.to_string().contains("Division by zero"));
    }

    #[test]
    fn test_invariant_is_distinguished() {
        let err = DomainError::invariant("class level 0 for wizard");
        assert!(err.is_invariant());
        assert!(!DomainError::parse("x").is_invariant());
        assert_eq!(
            err.to_string(),
            "Invariant violated: class level 0 for wizard"
        );
    }
}
