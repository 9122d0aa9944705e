//! Gauntlet storage with optimistic concurrency.
//!
//! `save` takes the version the caller loaded. If someone else committed in
//! between, the save is refused with `StoreError::VersionConflict` and the
//! caller must reload and resolve again.

use crate::gauntlet::{Gauntlet, GauntletId};
use crate::persist::{self, PersistError, SaveMetadata, SavedGauntlet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Gauntlet {0} not found")]
    NotFound(GauntletId),

    #[error("Gauntlet {0} already exists")]
    AlreadyExists(GauntletId),

    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Persist(PersistError::Io(err))
    }
}

/// Somewhere gauntlets live between requests.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Store a new gauntlet. Fails if the id is taken.
    async fn create(&self, gauntlet: &Gauntlet) -> Result<(), StoreError>;

    async fn load(&self, id: GauntletId) -> Result<Gauntlet, StoreError>;

    /// Replace a stored gauntlet whose version is still `expected_version`.
    async fn save(&self, gauntlet: &Gauntlet, expected_version: u64) -> Result<(), StoreError>;

    /// Every stored gauntlet, ordered by [`persist::newest_first`]: the most
    /// recently changed run comes first.
    async fn list(&self) -> Result<Vec<SaveMetadata>, StoreError>;

    async fn delete(&self, id: GauntletId) -> Result<(), StoreError>;
}

fn check_version(expected: u64, found: u64) -> Result<(), StoreError> {
    if expected != found {
        return Err(StoreError::VersionConflict { expected, found });
    }
    Ok(())
}

/// In-memory store, for tests and single-process play.
#[derive(Debug, Default)]
pub struct MemoryStore {
    gauntlets: RwLock<HashMap<GauntletId, Gauntlet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn create(&self, gauntlet: &Gauntlet) -> Result<(), StoreError> {
        let mut gauntlets = self.gauntlets.write().await;
        if gauntlets.contains_key(&gauntlet.id) {
            return Err(StoreError::AlreadyExists(gauntlet.id));
        }
        gauntlets.insert(gauntlet.id, gauntlet.clone());
        Ok(())
    }

    async fn load(&self, id: GauntletId) -> Result<Gauntlet, StoreError> {
        self.gauntlets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, gauntlet: &Gauntlet, expected_version: u64) -> Result<(), StoreError> {
        let mut gauntlets = self.gauntlets.write().await;
        let stored = gauntlets
            .get_mut(&gauntlet.id)
            .ok_or(StoreError::NotFound(gauntlet.id))?;
        check_version(expected_version, stored.version)?;
        *stored = gauntlet.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SaveMetadata>, StoreError> {
        let mut all: Vec<SaveMetadata> = self
            .gauntlets
            .read()
            .await
            .values()
            .map(SaveMetadata::from_gauntlet)
            .collect();
        all.sort_by(persist::newest_first);
        Ok(all)
    }

    async fn delete(&self, id: GauntletId) -> Result<(), StoreError> {
        self.gauntlets
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

/// One JSON save per gauntlet in a directory.
///
/// Writers are serialized through a lock so the version check and the
/// write happen together within this process.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path(&self, id: GauntletId) -> PathBuf {
        persist::gauntlet_save_path(&self.dir, id)
    }

    async fn read(&self, id: GauntletId) -> Result<Gauntlet, StoreError> {
        let path = self.path(id);
        if !fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(id));
        }
        Ok(SavedGauntlet::load_json(&path).await?.gauntlet)
    }

    async fn write(&self, gauntlet: &Gauntlet) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path(gauntlet.id);
        SavedGauntlet::new(gauntlet.clone()).save_json(&path).await?;
        debug!(path = %path.display(), version = gauntlet.version, "gauntlet saved");
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for FileStore {
    async fn create(&self, gauntlet: &Gauntlet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.path(gauntlet.id)).await? {
            return Err(StoreError::AlreadyExists(gauntlet.id));
        }
        self.write(gauntlet).await
    }

    async fn load(&self, id: GauntletId) -> Result<Gauntlet, StoreError> {
        self.read(id).await
    }

    async fn save(&self, gauntlet: &Gauntlet, expected_version: u64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.read(gauntlet.id).await?;
        check_version(expected_version, stored.version)?;
        self.write(gauntlet).await
    }

    async fn list(&self) -> Result<Vec<SaveMetadata>, StoreError> {
        Ok(persist::list_saves(&self.dir)
            .await?
            .into_iter()
            .map(|info| info.metadata)
            .collect())
    }

    async fn delete(&self, id: GauntletId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(id);
        if !fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(id));
        }
        fs::remove_file(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauntlet::GauntletRules;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn exercise(store: &dyn CampaignStore) {
        let mut gauntlet = Gauntlet::new("Crypt", GauntletRules::default());
        store.create(&gauntlet).await.unwrap();
        assert!(matches!(
            store.create(&gauntlet).await,
            Err(StoreError::AlreadyExists(_))
        ));

        gauntlet.version = 1;
        store.save(&gauntlet, 0).await.unwrap();
        assert_eq!(store.load(gauntlet.id).await.unwrap().version, 1);

        // a writer still holding version 0 loses
        let mut stale = gauntlet.clone();
        stale.version = 1;
        assert!(matches!(
            store.save(&stale, 0).await,
            Err(StoreError::VersionConflict {
                expected: 0,
                found: 1
            })
        ));

        // the run changed last lists first, whatever its name
        let mut older = Gauntlet::new("Abbey", GauntletRules::default());
        older.updated_at = gauntlet.updated_at - Duration::hours(1);
        store.create(&older).await.unwrap();
        let listed: Vec<GauntletId> = store.list().await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(listed, vec![gauntlet.id, older.id]);

        gauntlet.version = 2;
        gauntlet.updated_at = older.updated_at - Duration::hours(1);
        store.save(&gauntlet, 1).await.unwrap();
        let listed: Vec<GauntletId> = store.list().await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(listed, vec![older.id, gauntlet.id]);

        store.delete(older.id).await.unwrap();
        store.delete(gauntlet.id).await.unwrap();
        assert!(matches!(
            store.load(gauntlet.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        exercise(&FileStore::new(temp_dir.path().join("saves"))).await;
    }
}
