//! Repository port traits for character storage.

use async_trait::async_trait;
use zukus_domain::{CharacterId, CharacterRecord};

use super::error::RepoError;

// =============================================================================
// Character Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterRecord>, RepoError>;
    /// Creates or replaces the record stored under its own id.
    async fn save(&self, record: &CharacterRecord) -> Result<(), RepoError>;
    /// Every stored id, sorted.
    async fn list(&self) -> Result<Vec<CharacterId>, RepoError>;
}
