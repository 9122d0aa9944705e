//! QA tests for sessions, stores and save files.
//!
//! Run with: `cargo test -p dnd-campaign --test qa_persistence`

use dnd_campaign::persist::{self, SavedCharacter, SavedGauntlet};
use dnd_campaign::store::StoreError;
use dnd_campaign::testing::{goblins, sample_character, sample_party};
use dnd_campaign::{
    CampaignConfig, CampaignIntent, CampaignStore, CharacterClass, EncounterOutcome, FileStore,
    GauntletPhase, GauntletSession, MemoryStore, RaceType, SessionError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> CampaignConfig {
    CampaignConfig::new()
        .with_save_dir(dir.path())
        .with_seed(99)
        .with_encounter_count(3)
}

#[tokio::test]
async fn test_file_session_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let id = {
        let session = GauntletSession::new(FileStore::new(temp_dir.path()), config(&temp_dir));
        let gauntlet = session
            .new_gauntlet("Sunless Vault", sample_party().unwrap())
            .await
            .expect("create should succeed");
        session
            .execute(gauntlet.id, CampaignIntent::Start)
            .await
            .unwrap();
        session
            .execute(
                gauntlet.id,
                CampaignIntent::BeginEncounter {
                    index: 0,
                    monsters: Some(goblins(4)),
                },
            )
            .await
            .unwrap();
        session
            .execute(
                gauntlet.id,
                CampaignIntent::ResolveEncounter {
                    index: 0,
                    outcome: EncounterOutcome::victory(),
                },
            )
            .await
            .unwrap();
        gauntlet.id
    };

    // a fresh session over the same directory sees the committed state
    let session = GauntletSession::new(FileStore::new(temp_dir.path()), config(&temp_dir));
    let gauntlet = session.gauntlet(id).await.unwrap();
    assert_eq!(gauntlet.version, 3);
    assert_eq!(gauntlet.phase, GauntletPhase::Camp);
    assert_eq!(gauntlet.current_encounter, 1);
    assert!(gauntlet.party.iter().all(|c| c.experience == 50));

    let listed = session.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].encounters_cleared, 1);
    assert_eq!(listed[0].state_version, 3);

    // the save file on disk is the same run
    let path = persist::gauntlet_save_path(temp_dir.path(), id);
    let saved = SavedGauntlet::load_json(&path).await.unwrap();
    assert_eq!(saved.gauntlet, gauntlet);
}

#[tokio::test]
async fn test_stale_writer_is_refused() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = FileStore::new(temp_dir.path());
    let session = GauntletSession::new(store, config(&temp_dir));
    let gauntlet = session
        .new_gauntlet("Vault", sample_party().unwrap())
        .await
        .unwrap();

    let stale = session.gauntlet(gauntlet.id).await.unwrap();
    session
        .execute(gauntlet.id, CampaignIntent::Start)
        .await
        .unwrap();

    let mut edited = stale.clone();
    edited.name = "Overwritten".into();
    edited.version += 1;
    let err = session
        .store()
        .save(&edited, stale.version)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionConflict {
            expected: 0,
            found: 1
        }
    ));
    assert_eq!(session.gauntlet(gauntlet.id).await.unwrap().name, "Vault");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_intents_never_lose_updates() {
    let session = Arc::new(GauntletSession::new(
        MemoryStore::new(),
        CampaignConfig::new().with_seed(5),
    ));
    let gauntlet = session
        .new_gauntlet("Race", sample_party().unwrap())
        .await
        .unwrap();
    let id = gauntlet.id;
    session.execute(id, CampaignIntent::Start).await.unwrap();
    let fighter = gauntlet.party[0].id;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session
                .execute(
                    id,
                    CampaignIntent::AwardExperience {
                        character_id: fighter,
                        amount: 10,
                    },
                )
                .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(err) => assert!(err.is_conflict(), "unexpected error: {err}"),
        }
    }

    let stored = session.gauntlet(id).await.unwrap();
    assert!(committed >= 1);
    assert_eq!(stored.version, 1 + committed);
    assert_eq!(stored.member(fighter).unwrap().experience, 10 * committed as u32);
}

#[tokio::test]
async fn test_rejected_intent_leaves_file_untouched() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let session = GauntletSession::new(FileStore::new(temp_dir.path()), config(&temp_dir));
    let gauntlet = session
        .new_gauntlet("Vault", sample_party().unwrap())
        .await
        .unwrap();

    let err = session
        .execute(gauntlet.id, CampaignIntent::LongRest)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Campaign(_)));
    assert!(!err.is_conflict());
    assert_eq!(session.gauntlet(gauntlet.id).await.unwrap().version, 0);
}

#[tokio::test]
async fn test_export_survivor() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let session = GauntletSession::new(FileStore::new(temp_dir.path()), config(&temp_dir));
    let gauntlet = session
        .new_gauntlet("Vault", sample_party().unwrap())
        .await
        .unwrap();
    let pell = gauntlet.party[1].clone();

    let path = session.export_character(gauntlet.id, pell.id).await.unwrap();
    assert!(path.starts_with(temp_dir.path().join("characters")));
    let loaded = SavedCharacter::load_json(&path).await.unwrap();
    assert_eq!(loaded.character, pell);

    // exported characters are not listed as gauntlets
    assert_eq!(session.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_namesakes_export_side_by_side() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let session = GauntletSession::new(FileStore::new(temp_dir.path()), config(&temp_dir));
    let party = vec![
        sample_character("Thorin", RaceType::Dwarf, CharacterClass::Fighter, 1).unwrap(),
        sample_character("Thorin", RaceType::Dwarf, CharacterClass::Cleric, 1).unwrap(),
    ];
    let gauntlet = session.new_gauntlet("Twins", party).await.unwrap();

    let first = session
        .export_character(gauntlet.id, gauntlet.party[0].id)
        .await
        .unwrap();
    let second = session
        .export_character(gauntlet.id, gauntlet.party[1].id)
        .await
        .unwrap();
    assert_ne!(first, second);

    let fighter = SavedCharacter::load_json(&first).await.unwrap();
    let cleric = SavedCharacter::load_json(&second).await.unwrap();
    assert_eq!(fighter.character.class, CharacterClass::Fighter);
    assert_eq!(cleric.character.class, CharacterClass::Cleric);
}

#[tokio::test]
async fn test_delete() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let session = GauntletSession::new(FileStore::new(temp_dir.path()), config(&temp_dir));
    let gauntlet = session
        .new_gauntlet("Vault", sample_party().unwrap())
        .await
        .unwrap();
    session.delete(gauntlet.id).await.unwrap();
    assert!(matches!(
        session.gauntlet(gauntlet.id).await,
        Err(SessionError::Store(StoreError::NotFound(_)))
    ));
    assert!(session.list().await.unwrap().is_empty());
}
