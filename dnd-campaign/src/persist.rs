//! Gauntlet and character save files.
//!
//! Saves are pretty-printed JSON with a format version and a metadata block
//! that can be read without deserializing the whole run.

use crate::character::Character;
use crate::gauntlet::{Gauntlet, GauntletId, GauntletPhase};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current gauntlet save file version.
pub const SAVE_VERSION: u32 = 1;

/// Current character save file version.
pub const CHARACTER_SAVE_VERSION: u32 = 1;

/// A saved gauntlet with everything needed to resume the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGauntlet {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub gauntlet: Gauntlet,

    pub metadata: SaveMetadata,
}

/// Summary of a save for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub id: GauntletId,
    pub name: String,
    pub phase: GauntletPhase,
    /// Encounters resolved so far.
    pub encounters_cleared: usize,
    pub encounter_count: usize,
    /// "Name (Class level)" for each living member.
    pub party: Vec<String>,
    pub fallen: usize,
    /// The gauntlet's state version, not the file format version.
    pub state_version: u64,
    /// When the gauntlet last committed a change.
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SaveMetadata {
    pub fn from_gauntlet(gauntlet: &Gauntlet) -> Self {
        Self {
            id: gauntlet.id,
            name: gauntlet.name.clone(),
            phase: gauntlet.phase,
            encounters_cleared: gauntlet.current_encounter,
            encounter_count: gauntlet.plan.len(),
            party: gauntlet
                .party
                .iter()
                .map(|c| format!("{} ({} {})", c.name, c.class, c.level))
                .collect(),
            fallen: gauntlet.fallen.len(),
            state_version: gauntlet.version,
            updated_at: gauntlet.updated_at,
            saved_at: None,
        }
    }
}

/// Listing order shared by every store: most recently changed first, then
/// by name and id so equal timestamps still sort the same way every time.
pub fn newest_first(a: &SaveMetadata, b: &SaveMetadata) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

impl SavedGauntlet {
    pub fn new(gauntlet: Gauntlet) -> Self {
        let saved_at = Utc::now();
        let mut metadata = SaveMetadata::from_gauntlet(&gauntlet);
        metadata.saved_at = Some(saved_at);
        Self {
            version: SAVE_VERSION,
            saved_at,
            gauntlet,
            metadata,
        }
    }

    /// Write to `path` through a sibling temp file, so a crash never
    /// leaves a half-written save behind.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_atomic(path.as_ref(), self).await
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let saved: Self = read_json(path.as_ref()).await?;
        check_version(SAVE_VERSION, saved.version)?;
        Ok(saved)
    }

    /// Read only the version and metadata block of a save.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
            metadata: SaveMetadata,
        }

        let header: Header = read_json(path.as_ref()).await?;
        check_version(SAVE_VERSION, header.version)?;
        Ok(header.metadata)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn check_version(expected: u32, found: u32) -> Result<(), PersistError> {
    if expected == found {
        Ok(())
    } else {
        Err(PersistError::VersionMismatch { expected, found })
    }
}

/// A save file found on disk.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub metadata: SaveMetadata,
}

/// List gauntlet saves in a directory in [`newest_first`] order.
/// Files that aren't readable saves are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let dir = dir.as_ref();
    let mut saves = Vec::new();
    if !fs::try_exists(dir).await? {
        return Ok(saves);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json") {
            match SavedGauntlet::peek_metadata(&path).await {
                Ok(metadata) => saves.push(SaveInfo { path, metadata }),
                Err(err) => debug!(path = %path.display(), %err, "skipping unreadable save"),
            }
        }
    }

    saves.sort_by(|a, b| newest_first(&a.metadata, &b.metadata));
    Ok(saves)
}

/// Where a gauntlet with this id is saved.
pub fn gauntlet_save_path(dir: impl AsRef<Path>, id: GauntletId) -> PathBuf {
    dir.as_ref().join(format!("{id}.json"))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// A file name for an exported character: `<name>-<id>.json`. Names repeat,
/// ids don't.
pub fn character_save_path(dir: impl AsRef<Path>, character: &Character) -> PathBuf {
    dir.as_ref()
        .join(format!("{}-{}.json", sanitize(&character.name), character.id))
}

/// A character saved on its own, e.g. the survivor of a won run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCharacter {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub character: Character,
}

impl SavedCharacter {
    pub fn new(character: Character) -> Self {
        Self {
            version: CHARACTER_SAVE_VERSION,
            saved_at: Utc::now(),
            character,
        }
    }

    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_atomic(path.as_ref(), self).await
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let saved: Self = read_json(path.as_ref()).await?;
        check_version(CHARACTER_SAVE_VERSION, saved.version)?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterClass, RaceType};
    use crate::gauntlet::GauntletRules;
    use tempfile::TempDir;

    fn sample_gauntlet() -> Gauntlet {
        let hero = Character::new("Aria", RaceType::Elf, CharacterClass::Ranger);
        Gauntlet::new("Sunless Vault", GauntletRules::default()).with_party(vec![hero])
    }

    #[test]
    fn test_metadata_summarizes_party() {
        let saved = SavedGauntlet::new(sample_gauntlet());
        assert_eq!(saved.version, SAVE_VERSION);
        assert_eq!(saved.metadata.name, "Sunless Vault");
        assert_eq!(saved.metadata.party, vec!["Aria (Ranger 1)".to_string()]);
        assert_eq!(saved.metadata.encounter_count, 5);
        assert_eq!(saved.metadata.saved_at, Some(saved.saved_at));
    }

    #[test]
    fn test_character_save_path_special_chars() {
        let bob = Character::new("Bob's Character!@#", RaceType::Human, CharacterClass::Rogue);
        let path = character_save_path("saves", &bob);
        assert!(path.to_string_lossy().contains("Bob_s_Character"));
        assert!(!path.to_string_lossy().contains('!'));
        assert!(path.to_string_lossy().ends_with(".json"));
    }

    #[test]
    fn test_namesakes_get_separate_files() {
        let first = Character::new("Thorin", RaceType::Dwarf, CharacterClass::Fighter);
        let second = Character::new("Thorin", RaceType::Dwarf, CharacterClass::Cleric);
        let a = character_save_path("saves", &first);
        let b = character_save_path("saves", &second);
        assert_ne!(a, b);
        assert!(a.to_string_lossy().contains(&first.id.to_string()));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let gauntlet = sample_gauntlet();
        let path = gauntlet_save_path(temp_dir.path(), gauntlet.id);

        SavedGauntlet::new(gauntlet.clone())
            .save_json(&path)
            .await
            .expect("Save should succeed");
        let loaded = SavedGauntlet::load_json(&path)
            .await
            .expect("Load should succeed");

        assert_eq!(loaded.gauntlet, gauntlet);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("old.json");
        let mut saved = SavedGauntlet::new(sample_gauntlet());
        saved.version = 99;
        saved.save_json(&path).await.expect("Save should succeed");

        let err = SavedGauntlet::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
        assert!(SavedGauntlet::peek_metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_list_saves_skips_junk() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let gauntlet = sample_gauntlet();
        SavedGauntlet::new(gauntlet.clone())
            .save_json(gauntlet_save_path(temp_dir.path(), gauntlet.id))
            .await
            .expect("Save should succeed");
        std::fs::write(temp_dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("readme.txt"), "hi").unwrap();

        let saves = list_saves(temp_dir.path()).await.expect("List should succeed");
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].metadata.id, gauntlet.id);

        let missing = list_saves(temp_dir.path().join("nope"))
            .await
            .expect("List should succeed");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_saved_character_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let character = Character::new("Thorin", RaceType::Dwarf, CharacterClass::Fighter);
        let path = character_save_path(temp_dir.path(), &character);
        SavedCharacter::new(character.clone())
            .save_json(&path)
            .await
            .expect("Save should succeed");
        let loaded = SavedCharacter::load_json(&path)
            .await
            .expect("Load should succeed");
        assert_eq!(loaded.character, character);
    }
}
