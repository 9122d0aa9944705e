//! D&D 5e character progression and roguelite gauntlet engine.
//!
//! This crate provides:
//! - Character creation and automatic leveling (HP, spell slots, features,
//!   pending ASI/subclass/spell choices)
//! - Spellcasting bookkeeping for full, half and pact casters
//! - A gauntlet campaign mode: sequential encounters, permadeath, treasure,
//!   rests and recruitment
//! - An Intent/Effect rules engine with all-or-nothing commits
//! - Versioned storage with optimistic concurrency
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_campaign::{CampaignConfig, CampaignIntent, GauntletSession, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = GauntletSession::new(MemoryStore::new(), CampaignConfig::new().with_seed(7));
//!     let party = dnd_campaign::testing::sample_party()?;
//!     let gauntlet = session.new_gauntlet("The Sunless Vault", party).await?;
//!
//!     let resolution = session.execute(gauntlet.id, CampaignIntent::Start).await?;
//!     println!("{}", resolution.narrative);
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod character_builder;
pub mod class_data;
pub mod config;
pub mod dice;
pub mod encounter;
pub mod gauntlet;
pub mod persist;
pub mod progression;
pub mod rules;
pub mod session;
pub mod spellcasting;
pub mod store;
pub mod testing;
pub mod treasure;

// Primary public API
pub use character::{Character, CharacterClass, CharacterId, RaceType};
pub use character_builder::{AbilityMethod, CharacterBuilder};
pub use config::CampaignConfig;
pub use gauntlet::{EncounterOutcome, Gauntlet, GauntletId, GauntletPhase, GauntletRules};
pub use progression::{AsiChoice, HpMethod, LevelUpRecord};
pub use rules::{CampaignEngine, CampaignError, CampaignIntent, Effect, Resolution};
pub use session::{GauntletSession, SessionError};
pub use store::{CampaignStore, FileStore, MemoryStore, StoreError};
pub use testing::TestHarness;
