//! GauntletSession - the primary public API for running gauntlets.
//!
//! Wraps a store, the rules engine and a shared RNG. Every change follows
//! the same path: load, resolve, apply to a copy, save against the loaded
//! version.

use crate::character::{Character, CharacterId};
use crate::config::CampaignConfig;
use crate::gauntlet::{Gauntlet, GauntletId};
use crate::persist::{self, PersistError, SaveMetadata, SavedCharacter};
use crate::rules::{commit, CampaignEngine, CampaignError, CampaignIntent, Resolution};
use crate::store::{CampaignStore, StoreError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// Errors from GauntletSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Rules error: {0}")]
    Campaign(#[from] CampaignError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True when another writer committed first; reload and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionError::Store(StoreError::VersionConflict { .. }))
    }
}

/// Runs gauntlets stored in `S`.
pub struct GauntletSession<S: CampaignStore> {
    store: S,
    engine: CampaignEngine,
    rng: Mutex<StdRng>,
    config: CampaignConfig,
}

impl<S: CampaignStore> GauntletSession<S> {
    pub fn new(store: S, config: CampaignConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            engine: CampaignEngine::new(),
            rng: Mutex::new(rng),
            config,
        }
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create and store a gauntlet in the recruiting phase.
    pub async fn new_gauntlet(
        &self,
        name: impl Into<String>,
        party: Vec<Character>,
    ) -> Result<Gauntlet, SessionError> {
        let rules = self.config.rules();
        if party.len() > rules.max_party_size {
            return Err(CampaignError::PartyFull(party.len()).into());
        }
        if let Some(dead) = party.iter().find(|c| !c.is_alive()) {
            return Err(CampaignError::CharacterDead(dead.name.clone()).into());
        }
        let mut gauntlet = Gauntlet::new(name, rules).with_party(party);
        gauntlet.record(format!("{} is opened.", gauntlet.name));
        self.store.create(&gauntlet).await?;
        info!(gauntlet = %gauntlet.id, name = %gauntlet.name, party = gauntlet.party.len(), "gauntlet created");
        Ok(gauntlet)
    }

    /// Resolve an intent against the stored gauntlet and commit the result.
    ///
    /// Fails with a version conflict if the gauntlet changed while this
    /// intent was being resolved; nothing is written in that case.
    pub async fn execute(
        &self,
        id: GauntletId,
        intent: CampaignIntent,
    ) -> Result<Resolution, SessionError> {
        let gauntlet = self.store.load(id).await?;
        let expected = gauntlet.version;

        let resolution = {
            let mut rng = self.rng.lock().await;
            self.engine.resolve(&gauntlet, intent, &mut *rng)?
        };
        let updated = commit(&gauntlet, &resolution)?;
        self.store.save(&updated, expected).await?;

        info!(
            gauntlet = %id,
            version = updated.version,
            phase = %updated.phase,
            effects = resolution.effects.len(),
            "intent committed"
        );
        Ok(resolution)
    }

    pub async fn gauntlet(&self, id: GauntletId) -> Result<Gauntlet, SessionError> {
        Ok(self.store.load(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<SaveMetadata>, SessionError> {
        Ok(self.store.list().await?)
    }

    pub async fn delete(&self, id: GauntletId) -> Result<(), SessionError> {
        Ok(self.store.delete(id).await?)
    }

    /// Write a living member to `<save_dir>/characters/` for use in
    /// another run. Returns the file path.
    pub async fn export_character(
        &self,
        id: GauntletId,
        character_id: CharacterId,
    ) -> Result<PathBuf, SessionError> {
        let gauntlet = self.store.load(id).await?;
        let character = match gauntlet.member(character_id) {
            Some(c) => c,
            None => {
                return Err(match gauntlet.fallen_member(character_id) {
                    Some(f) => CampaignError::CharacterDead(f.character.name.clone()),
                    None => CampaignError::UnknownCharacter(character_id),
                }
                .into())
            }
        };
        let dir = self.config.save_dir.join("characters");
        fs::create_dir_all(&dir).await?;
        let path = persist::character_save_path(&dir, character);
        SavedCharacter::new(character.clone()).save_json(&path).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterClass, RaceType};
    use crate::store::MemoryStore;

    fn session() -> GauntletSession<MemoryStore> {
        GauntletSession::new(MemoryStore::new(), CampaignConfig::new().with_seed(11))
    }

    #[tokio::test]
    async fn test_execute_bumps_version() {
        let session = session();
        let hero = Character::new("Mira", RaceType::Halfling, CharacterClass::Rogue);
        let gauntlet = session.new_gauntlet("Vault", vec![hero]).await.unwrap();
        assert_eq!(gauntlet.version, 0);

        session
            .execute(gauntlet.id, CampaignIntent::Start)
            .await
            .unwrap();
        let stored = session.gauntlet(gauntlet.id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.log.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_intent_writes_nothing() {
        let session = session();
        let gauntlet = session.new_gauntlet("Vault", Vec::new()).await.unwrap();
        let err = session
            .execute(gauntlet.id, CampaignIntent::Start)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Campaign(CampaignError::EmptyParty)
        ));
        assert_eq!(session.gauntlet(gauntlet.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_oversized_party_refused() {
        let session = session();
        let party: Vec<Character> = (0..5)
            .map(|i| Character::new(format!("Hero {i}"), RaceType::Human, CharacterClass::Fighter))
            .collect();
        assert!(session.new_gauntlet("Vault", party).await.is_err());
        assert!(session.list().await.unwrap().is_empty());
    }
}
