//! Character sheet operation errors.

use crate::infrastructure::ports::RepoError;
use zukus_domain::{CharacterId, DomainError};

/// Errors that can occur during character sheet operations.
///
/// A refused game action is not an error: it comes back as an
/// unsuccessful [`zukus_domain::UpdateResult`].
#[derive(Debug, thiserror::Error)]
pub enum CharacterSheetError {
    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Invalid character record {id}: {message}")]
    InvalidRecord { id: CharacterId, message: String },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid arguments for {operation}: {message}")]
    InvalidArguments {
        operation: &'static str,
        message: String,
    },

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl CharacterSheetError {
    pub fn invalid_arguments(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            operation,
            message: message.into(),
        }
    }
}
