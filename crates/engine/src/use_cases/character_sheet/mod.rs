//! Character sheet use cases.
//!
//! Loads a record from storage, derives it or runs one updater operation
//! against it, and persists the result. Calls for the same character are
//! serialized so two operations never read the same stale record.

mod error;
mod operation;

pub use error::CharacterSheetError;
pub use operation::SheetOperation;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use zukus_domain::{
    derive_with, CharacterId, CharacterRecord, CharacterUpdater, DeriveOptions, DerivedSheet,
    DomainError, UpdateResult,
};

use crate::infrastructure::ports::{CharacterRepo, ClockPort};

// =============================================================================
// Result Types
// =============================================================================

/// Result of applying one operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub operation: &'static str,
    pub result: UpdateResult,
    /// Whether the updated record was written back.
    pub saved: bool,
    /// Sheet derived from the record after the operation.
    pub sheet: DerivedSheet,
}

/// One line of [`CharacterSheetUseCases::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSummary {
    pub id: CharacterId,
    pub name: String,
    pub level: u32,
}

// =============================================================================
// Use Cases
// =============================================================================

/// Container for character sheet use cases.
pub struct CharacterSheetUseCases {
    character_repo: Arc<dyn CharacterRepo>,
    clock: Arc<dyn ClockPort>,
    options: DeriveOptions,
    locks: Mutex<HashMap<CharacterId, Arc<Mutex<()>>>>,
}

impl CharacterSheetUseCases {
    pub fn new(character_repo: Arc<dyn CharacterRepo>, clock: Arc<dyn ClockPort>) -> Self {
        Self::with_options(character_repo, clock, DeriveOptions::default())
    }

    pub fn with_options(
        character_repo: Arc<dyn CharacterRepo>,
        clock: Arc<dyn ClockPort>,
        options: DeriveOptions,
    ) -> Self {
        Self {
            character_repo,
            clock,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Derive the sheet of a stored character.
    pub async fn derive(&self, id: &CharacterId) -> Result<DerivedSheet, CharacterSheetError> {
        let record = self.load(id).await?;
        if let Err(err) = record.validate() {
            return Err(invalid_record(id, err));
        }
        Ok(derive_with(&record, &self.options))
    }

    /// Run `operation` against a stored character.
    ///
    /// The record is saved, stamped with the current time, only when the
    /// operation succeeded. A refused operation is returned as an
    /// unsuccessful [`UpdateResult`], not as an error.
    pub async fn apply(
        &self,
        id: &CharacterId,
        operation: &SheetOperation,
    ) -> Result<ApplyResult, CharacterSheetError> {
        let guard = self.lock(id).await;
        let applied = self.apply_locked(id, operation).await;
        drop(guard);
        self.release(id).await;
        applied
    }

    async fn apply_locked(
        &self,
        id: &CharacterId,
        operation: &SheetOperation,
    ) -> Result<ApplyResult, CharacterSheetError> {
        let record = self.load(id).await?;
        let mut updater = CharacterUpdater::with_options(self.options.clone());
        let loaded = updater.set_character(record);
        if !loaded.success {
            return Err(CharacterSheetError::InvalidRecord {
                id: id.clone(),
                message: loaded.error.unwrap_or_default(),
            });
        }

        let result = operation.apply(&mut updater);
        let (Some(record), Some(sheet)) = (updater.character(), updater.sheet()) else {
            return Err(DomainError::invariant("updater lost its character").into());
        };
        let sheet = sheet.clone();

        let saved = if result.success {
            let mut record = record.clone();
            record.updated_at = Some(self.clock.now());
            self.character_repo.save(&record).await?;
            true
        } else {
            false
        };

        tracing::info!(
            character_id = %id,
            operation = operation.name(),
            success = result.success,
            warnings = result.warnings.len(),
            saved,
            "Applied character operation"
        );

        Ok(ApplyResult {
            operation: operation.name(),
            result,
            saved,
            sheet,
        })
    }

    /// Summaries of every stored character, in id order.
    pub async fn list(&self) -> Result<Vec<CharacterSummary>, CharacterSheetError> {
        let ids = self.character_repo.list().await?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            // Removed between list and get.
            let Some(record) = self.character_repo.get(&id).await? else {
                continue;
            };
            summaries.push(CharacterSummary {
                level: record.level(),
                name: record.name,
                id,
            });
        }
        Ok(summaries)
    }

    async fn load(&self, id: &CharacterId) -> Result<CharacterRecord, CharacterSheetError> {
        self.character_repo
            .get(id)
            .await?
            .ok_or_else(|| CharacterSheetError::CharacterNotFound(id.clone()))
    }

    async fn lock(&self, id: &CharacterId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the character's lock entry once no call holds or awaits it.
    async fn release(&self, id: &CharacterId) {
        let mut locks = self.locks.lock().await;
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}

fn invalid_record(id: &CharacterId, err: DomainError) -> CharacterSheetError {
    tracing::error!(character_id = %id, error = %err, "Stored character record is invalid");
    CharacterSheetError::InvalidRecord {
        id: id.clone(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{MockCharacterRepo, MockClockPort, RepoError};
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;
    use zukus_domain::{ClassLevels, Item, WarningKind};

    fn id(raw: &str) -> CharacterId {
        raw.parse().unwrap()
    }

    fn tordek() -> CharacterRecord {
        let mut record = CharacterRecord::new("tordek", "Tordek");
        record.classes.push(ClassLevels::new("fighter", 3));
        record.hit_points.rolled = 24.0;
        record
    }

    fn use_cases(repo: MockCharacterRepo, clock: Arc<dyn ClockPort>) -> CharacterSheetUseCases {
        CharacterSheetUseCases::new(Arc::new(repo), clock)
    }

    fn fixed_clock() -> Arc<dyn ClockPort> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn derive_returns_sheet_for_stored_character() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get()
            .with(eq(id("tordek")))
            .returning(|_| Ok(Some(tordek())));

        let sheet = use_cases(repo, fixed_clock())
            .derive(&id("tordek"))
            .await
            .unwrap();

        assert_eq!(sheet.character_id, "tordek");
        assert_eq!(sheet.level, 3);
        assert_eq!(sheet.hit_points.max, 24.0);
    }

    #[tokio::test]
    async fn derive_missing_character_is_not_found() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| Ok(None));

        let err = use_cases(repo, fixed_clock())
            .derive(&id("nobody"))
            .await
            .unwrap_err();

        assert!(matches!(err, CharacterSheetError::CharacterNotFound(missing) if missing == id("nobody")));
    }

    #[tokio::test]
    async fn derive_rejects_invalid_stored_record() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| {
            let mut record = tordek();
            record.classes.push(ClassLevels::new("fighter", 1));
            Ok(Some(record))
        });

        let err = use_cases(repo, fixed_clock())
            .derive(&id("tordek"))
            .await
            .unwrap_err();

        assert!(matches!(err, CharacterSheetError::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn apply_saves_stamped_record_on_success() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let mut clock = MockClockPort::new();
        clock.expect_now().times(1).return_const(now);

        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| Ok(Some(tordek())));
        repo.expect_save()
            .withf(move |record| {
                record.id == "tordek"
                    && record.hit_points.damage == 7.0
                    && record.updated_at == Some(now)
            })
            .times(1)
            .returning(|_| Ok(()));

        let applied = use_cases(repo, Arc::new(clock))
            .apply(&id("tordek"), &SheetOperation::UpdateHp { delta: -7.0 })
            .await
            .unwrap();

        assert!(applied.result.success);
        assert!(applied.saved);
        assert_eq!(applied.operation, "hp");
        assert_eq!(applied.sheet.hit_points.current, 17.0);
    }

    #[tokio::test]
    async fn apply_refused_operation_is_not_saved() {
        let mut clock = MockClockPort::new();
        clock.expect_now().never();

        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| Ok(Some(tordek())));
        repo.expect_save().never();

        let applied = use_cases(repo, Arc::new(clock))
            .apply(
                &id("tordek"),
                &SheetOperation::ConsumeResource {
                    resource_id: "ki".to_string(),
                    amount: None,
                },
            )
            .await
            .unwrap();

        assert!(!applied.result.success);
        assert!(!applied.saved);
        assert_eq!(applied.result.error.as_deref(), Some("Resource not found"));
    }

    #[tokio::test]
    async fn apply_unknown_cge_saves_unchanged_record_with_warning() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| Ok(Some(tordek())));
        repo.expect_save()
            .withf(|record| record.cge_state.is_empty())
            .times(1)
            .returning(|_| Ok(()));

        let applied = use_cases(repo, fixed_clock())
            .apply(
                &id("tordek"),
                &SheetOperation::RefreshSlots {
                    cge_id: "wizard-spells".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(applied.result.success);
        assert_eq!(applied.result.warnings[0].kind, WarningKind::CgeNotFound);
    }

    #[tokio::test]
    async fn apply_surfaces_storage_failures() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| Ok(Some(tordek())));
        repo.expect_save()
            .returning(|_| Err(RepoError::storage("write", "disk full")));

        let err = use_cases(repo, fixed_clock())
            .apply(&id("tordek"), &SheetOperation::Rest)
            .await
            .unwrap_err();

        assert!(matches!(err, CharacterSheetError::Repo(RepoError::Storage { .. })));
    }

    #[tokio::test]
    async fn apply_added_item_reaches_saved_record_and_sheet() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|_| Ok(Some(tordek())));
        repo.expect_save()
            .withf(|record| record.item("ring").is_some_and(|item| item.equipped))
            .times(1)
            .returning(|_| Ok(()));
        let ring: Item = serde_json::from_str(
            r#"{"uniqueId":"ring","name":"Ring of Protection","equipped":true,
                "changes":[{"type":"AC","formula":{"expression":"2"},"bonusTypeId":"DEFLECTION"}]}"#,
        )
        .unwrap();

        let applied = use_cases(repo, fixed_clock())
            .apply(&id("tordek"), &SheetOperation::AddItem { item: ring })
            .await
            .unwrap();

        assert!(applied.result.success);
        assert_eq!(applied.operation, "add-item");
        assert_eq!(applied.sheet.armor_class.total, 12.0);
    }

    #[tokio::test]
    async fn apply_releases_character_locks() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_get().returning(|requested| {
            if requested.as_str() == "tordek" {
                Ok(Some(tordek()))
            } else {
                Ok(None)
            }
        });
        repo.expect_save().returning(|_| Ok(()));
        let use_cases = use_cases(repo, fixed_clock());

        for _ in 0..3 {
            use_cases
                .apply(&id("tordek"), &SheetOperation::Rest)
                .await
                .unwrap();
        }
        let missing = use_cases.apply(&id("nobody"), &SheetOperation::Rest).await;

        assert!(matches!(missing, Err(CharacterSheetError::CharacterNotFound(_))));
        assert!(use_cases.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn held_lock_survives_release_of_another_call() {
        let repo = MockCharacterRepo::new();
        let use_cases = use_cases(repo, fixed_clock());

        let held = use_cases.lock(&id("tordek")).await;
        use_cases.release(&id("tordek")).await;
        assert!(use_cases.locks.lock().await.contains_key(&id("tordek")));

        drop(held);
        use_cases.release(&id("tordek")).await;
        assert!(use_cases.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn list_skips_records_removed_meanwhile() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_list()
            .returning(|| Ok(vec![id("ghost"), id("tordek")]));
        repo.expect_get().returning(|requested| {
            if requested.as_str() == "tordek" {
                Ok(Some(tordek()))
            } else {
                Ok(None)
            }
        });

        let summaries = use_cases(repo, fixed_clock()).list().await.unwrap();

        assert_eq!(
            summaries,
            vec![CharacterSummary {
                id: id("tordek"),
                name: "Tordek".to_string(),
                level: 3,
            }]
        );
    }
}
