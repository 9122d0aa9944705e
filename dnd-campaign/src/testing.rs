//! Testing utilities for gauntlet scenarios.
//!
//! - `TestHarness` drives a gauntlet through the real rules engine with a
//!   seeded RNG
//! - Assertion helpers for verifying run state

use crate::character::{Character, CharacterClass, CharacterId, RaceType};
use crate::character_builder::{BuilderError, CharacterBuilder};
use crate::encounter::{ChallengeRating, MonsterGroup, MonsterTemplate};
use crate::gauntlet::{EncounterOutcome, Gauntlet, GauntletPhase, GauntletRules};
use crate::progression::HpMethod;
use crate::rules::{CampaignEngine, CampaignError, CampaignIntent, Resolution};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `count` goblins (CR 1/4, 50 XP each).
pub fn goblins(count: u32) -> Vec<MonsterGroup> {
    vec![MonsterGroup::new(
        MonsterTemplate::new("Goblin", ChallengeRating::Quarter),
        count,
    )]
}

/// `count` ogres (CR 2, 450 XP each).
pub fn ogres(count: u32) -> Vec<MonsterGroup> {
    vec![MonsterGroup::new(
        MonsterTemplate::new("Ogre", ChallengeRating::Whole(2)),
        count,
    )]
}

/// A quick-built character at `level` with average hit points.
pub fn sample_character(
    name: &str,
    race: RaceType,
    class: CharacterClass,
    level: u8,
) -> Result<Character, BuilderError> {
    let mut rng = StdRng::seed_from_u64(level as u64);
    CharacterBuilder::quick(name, race, class).build_at_level(level, HpMethod::Average, &mut rng)
}

/// The default four-member party at level 1.
pub fn sample_party() -> Result<Vec<Character>, BuilderError> {
    Ok(vec![
        sample_character("Bruna", RaceType::Dwarf, CharacterClass::Fighter, 1)?,
        sample_character("Pell", RaceType::Human, CharacterClass::Wizard, 1)?,
        sample_character("Sister Ama", RaceType::Human, CharacterClass::Cleric, 1)?,
        sample_character("Quill", RaceType::Halfling, CharacterClass::Rogue, 1)?,
    ])
}

/// Test harness that runs a gauntlet in memory.
pub struct TestHarness {
    pub engine: CampaignEngine,
    pub gauntlet: Gauntlet,
    pub rng: StdRng,
    /// Every resolution committed so far, oldest first.
    pub history: Vec<Resolution>,
}

impl TestHarness {
    /// A harness around an empty gauntlet with average hit points.
    pub fn new(rules: GauntletRules) -> Self {
        Self::with_party(rules, Vec::new())
    }

    pub fn with_party(rules: GauntletRules, party: Vec<Character>) -> Self {
        Self {
            engine: CampaignEngine::new(),
            gauntlet: Gauntlet::new("Test Gauntlet", rules).with_party(party),
            rng: StdRng::seed_from_u64(42),
            history: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Resolve and commit an intent.
    pub fn execute(&mut self, intent: CampaignIntent) -> Result<Resolution, CampaignError> {
        let resolution = self
            .engine
            .execute(&mut self.gauntlet, intent, &mut self.rng)?;
        self.history.push(resolution.clone());
        Ok(resolution)
    }

    pub fn start(&mut self) -> Result<Resolution, CampaignError> {
        self.execute(CampaignIntent::Start)
    }

    /// Begin the current encounter against the given monsters.
    pub fn begin(&mut self, monsters: Vec<MonsterGroup>) -> Result<Resolution, CampaignError> {
        self.execute(CampaignIntent::BeginEncounter {
            index: self.gauntlet.current_encounter,
            monsters: Some(monsters),
        })
    }

    /// Resolve the current encounter.
    pub fn finish(&mut self, outcome: EncounterOutcome) -> Result<Resolution, CampaignError> {
        self.execute(CampaignIntent::ResolveEncounter {
            index: self.gauntlet.current_encounter,
            outcome,
        })
    }

    /// Begin the current encounter and win it without losses.
    pub fn clear(&mut self, monsters: Vec<MonsterGroup>) -> Result<Resolution, CampaignError> {
        self.begin(monsters)?;
        self.finish(EncounterOutcome::victory())
    }

    pub fn member(&self, name: &str) -> Option<&Character> {
        self.gauntlet.party.iter().find(|c| c.name == name)
    }

    pub fn id(&self, name: &str) -> Option<CharacterId> {
        self.member(name).map(|c| c.id)
    }

    pub fn phase(&self) -> GauntletPhase {
        self.gauntlet.phase
    }

    pub fn last_narrative(&self) -> Option<&str> {
        self.history.last().map(|r| r.narrative.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        let rules = GauntletRules {
            hp_method: HpMethod::Average,
            ..GauntletRules::default()
        };
        Self::with_party(rules, sample_party().unwrap_or_default())
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

#[track_caller]
pub fn assert_phase(harness: &TestHarness, phase: GauntletPhase) {
    assert_eq!(
        harness.phase(),
        phase,
        "Expected phase {phase}, got {}",
        harness.phase()
    );
}

#[track_caller]
pub fn assert_level(harness: &TestHarness, name: &str, level: u8) {
    let actual = harness.member(name).map(|c| c.level);
    assert_eq!(actual, Some(level), "Expected {name} at level {level}");
}

#[track_caller]
pub fn assert_fallen(harness: &TestHarness, name: &str) {
    assert!(
        harness
            .gauntlet
            .fallen
            .iter()
            .any(|f| f.character.name == name),
        "Expected {name} among the fallen"
    );
    assert!(harness.member(name).is_none(), "{name} is still in the party");
}
