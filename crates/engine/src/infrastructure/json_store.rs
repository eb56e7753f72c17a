//! JSON file character storage.
//!
//! One file per character, `<data_dir>/<character-id>.json`. Writes go to a
//! temp file first and are renamed into place, so a crash never leaves a
//! half-written record behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use zukus_domain::{CharacterId, CharacterRecord};

use crate::infrastructure::ports::{CharacterRepo, RepoError};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

#[derive(Debug, Clone)]
pub struct JsonCharacterRepo {
    data_dir: PathBuf,
    pretty: bool,
}

impl JsonCharacterRepo {
    pub fn new(data_dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            pretty,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, id: &CharacterId) -> PathBuf {
        self.data_dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn encode(&self, record: &CharacterRecord) -> Result<String, RepoError> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(record)?
        } else {
            serde_json::to_string(record)?
        };
        Ok(encoded)
    }
}

#[async_trait]
impl CharacterRepo for JsonCharacterRepo {
    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterRecord>, RepoError> {
        let path = self.path_for(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RepoError::storage("read", format!("{}: {err}", path.display()))),
        };

        let record: CharacterRecord = serde_json::from_str(&content).map_err(|err| {
            RepoError::serialization(format!("{}: {err}", path.display()))
        })?;
        if record.id != id.as_str() {
            return Err(RepoError::constraint(format!(
                "{} holds character {:?}",
                path.display(),
                record.id
            )));
        }

        tracing::debug!(character_id = %id, "Character loaded");
        Ok(Some(record))
    }

    async fn save(&self, record: &CharacterRecord) -> Result<(), RepoError> {
        let id: CharacterId = record.id.parse().map_err(RepoError::constraint)?;
        let content = self.encode(record)?;

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|err| RepoError::storage("create_dir", err))?;

        let path = self.path_for(&id);
        let temp_path = path.with_extension(TEMP_EXTENSION);
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|err| RepoError::storage("write", err))?;
        if let Err(err) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(RepoError::storage("rename", err));
        }

        tracing::debug!(character_id = %id, path = %path.display(), "Character saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CharacterId>, RepoError> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RepoError::storage("list", err)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| RepoError::storage("list", err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match stem.parse::<CharacterId>() {
                Ok(id) => ids.push(id),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Skipping file with invalid character id");
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(raw: &str) -> CharacterId {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path(), true);

        assert!(repo.get(&id("tordek")).await.unwrap().is_none());

        let mut record = CharacterRecord::new("tordek", "Tordek");
        record.hit_points.rolled = 12.0;
        repo.save(&record).await.unwrap();

        let loaded = repo.get(&id("tordek")).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(dir.path().join("tordek.json").exists());
        assert!(!dir.path().join("tordek.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_record() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path(), false);

        let mut record = CharacterRecord::new("mialee", "Mialee");
        repo.save(&record).await.unwrap();
        record.hit_points.damage = 3.0;
        repo.save(&record).await.unwrap();

        let loaded = repo.get(&id("mialee")).await.unwrap().unwrap();
        assert_eq!(loaded.hit_points.damage, 3.0);
    }

    #[tokio::test]
    async fn test_save_creates_missing_data_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("data").join("characters");
        let repo = JsonCharacterRepo::new(&nested, true);

        repo.save(&CharacterRecord::new("lidda", "Lidda")).await.unwrap();

        assert!(nested.join("lidda.json").exists());
    }

    #[tokio::test]
    async fn test_save_rejects_ids_unsafe_for_file_names() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path(), true);

        let err = repo
            .save(&CharacterRecord::new("../escape", "Escape"))
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path(), true);
        repo.save(&CharacterRecord::new("tordek", "Tordek")).await.unwrap();
        repo.save(&CharacterRecord::new("jozan", "Jozan")).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "hello").await.unwrap();
        tokio::fs::write(dir.path().join("bad id.json"), "{}").await.unwrap();

        let ids = repo.list().await.unwrap();

        assert_eq!(ids, vec![id("jozan"), id("tordek")]);
    }

    #[tokio::test]
    async fn test_list_of_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path().join("nowhere"), true);

        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_serialization_error() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path(), true);
        tokio::fs::write(dir.path().join("tordek.json"), "not valid json")
            .await
            .unwrap();

        let err = repo.get(&id("tordek")).await.unwrap_err();

        assert!(matches!(err, RepoError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_record_under_wrong_file_name_is_rejected() {
        let dir = tempdir().unwrap();
        let repo = JsonCharacterRepo::new(dir.path(), true);
        let record = CharacterRecord::new("jozan", "Jozan");
        tokio::fs::write(
            dir.path().join("tordek.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .await
        .unwrap();

        let err = repo.get(&id("tordek")).await.unwrap_err();

        assert!(matches!(err, RepoError::ConstraintViolation(_)));
    }
}
