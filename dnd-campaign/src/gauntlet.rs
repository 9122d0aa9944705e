//! Gauntlet state: a roguelite run of sequential encounters with permadeath.
//!
//! This module holds the data only. Every change goes through the rules
//! engine, which turns intents into effects and commits them atomically.

use crate::character::{Character, CharacterId, Inventory};
use crate::encounter::{default_monster_pool, Difficulty, MonsterGroup, MonsterTemplate};
use crate::progression::HpMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for gauntlets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GauntletId(pub Uuid);

impl GauntletId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GauntletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GauntletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GauntletPhase {
    /// Assembling the party before the first encounter.
    #[default]
    Recruiting,
    /// Between encounters.
    Camp,
    InEncounter,
    Victorious,
    Defeated,
    Abandoned,
}

impl GauntletPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GauntletPhase::Victorious | GauntletPhase::Defeated | GauntletPhase::Abandoned
        )
    }
}

impl fmt::Display for GauntletPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GauntletPhase::Recruiting => "recruiting",
            GauntletPhase::Camp => "camp",
            GauntletPhase::InEncounter => "in encounter",
            GauntletPhase::Victorious => "victorious",
            GauntletPhase::Defeated => "defeated",
            GauntletPhase::Abandoned => "abandoned",
        };
        write!(f, "{name}")
    }
}

/// How survivors advance after a victory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum XpMode {
    /// Monster XP split among survivors.
    #[default]
    Experience,
    /// Every survivor gains one level per won encounter.
    Milestone,
}

/// Tunables fixed when a run is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GauntletRules {
    pub encounter_count: usize,
    pub max_party_size: usize,
    pub long_rests: u8,
    pub recruit_cost_per_level: u32,
    pub hp_method: HpMethod,
    pub xp_mode: XpMode,
}

impl Default for GauntletRules {
    fn default() -> Self {
        Self {
            encounter_count: 5,
            max_party_size: 4,
            long_rests: 2,
            recruit_cost_per_level: 50,
            hp_method: HpMethod::Rolled,
            xp_mode: XpMode::Experience,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncounterStatus {
    Active,
    Won,
    Lost,
}

/// What happened in one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRecord {
    pub index: usize,
    pub difficulty: Difficulty,
    pub monsters: Vec<MonsterGroup>,
    pub status: EncounterStatus,
    pub xp_each: u32,
    pub gold: u32,
    pub casualties: Vec<String>,
}

impl EncounterRecord {
    pub fn is_resolved(&self) -> bool {
        self.status != EncounterStatus::Active
    }
}

/// A character who died during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallenCharacter {
    pub character: Character,
    pub encounter: usize,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Reported result of an encounter played out elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterOutcome {
    pub victory: bool,
    pub casualties: Vec<CharacterId>,
    /// HP left per survivor; members not listed keep their HP.
    pub hp_remaining: BTreeMap<CharacterId, i32>,
    /// Slot levels spent per character, one entry per slot.
    pub slots_expended: BTreeMap<CharacterId, Vec<u8>>,
}

impl EncounterOutcome {
    pub fn victory() -> Self {
        Self {
            victory: true,
            ..Self::default()
        }
    }

    pub fn defeat() -> Self {
        Self::default()
    }

    pub fn with_casualty(mut self, id: CharacterId) -> Self {
        self.casualties.push(id);
        self
    }

    pub fn with_hp(mut self, id: CharacterId, hp: i32) -> Self {
        self.hp_remaining.insert(id, hp);
        self
    }

    pub fn with_slots(mut self, id: CharacterId, levels: Vec<u8>) -> Self {
        self.slots_expended.insert(id, levels);
        self
    }
}

/// Difficulty per encounter: a rising ladder that ends with a deadly boss.
pub fn default_plan(encounter_count: usize) -> Vec<Difficulty> {
    const LADDER: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Medium,
        Difficulty::Hard,
    ];
    let count = encounter_count.max(1);
    let mut plan: Vec<Difficulty> = (0..count - 1).map(|i| LADDER[i % LADDER.len()]).collect();
    plan.push(Difficulty::Deadly);
    plan
}

/// A gauntlet run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gauntlet {
    pub id: GauntletId,
    pub name: String,
    pub rules: GauntletRules,
    pub phase: GauntletPhase,
    /// Index of the next encounter to begin or resolve.
    pub current_encounter: usize,
    pub plan: Vec<Difficulty>,
    pub encounters: Vec<EncounterRecord>,
    /// Living members only.
    pub party: Vec<Character>,
    pub fallen: Vec<FallenCharacter>,
    pub stash: Inventory,
    pub long_rests_remaining: u8,
    pub short_rest_taken: bool,
    pub monster_pool: Vec<MonsterTemplate>,
    pub log: Vec<LogEntry>,
    /// Bumped on every committed change.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gauntlet {
    pub fn new(name: impl Into<String>, rules: GauntletRules) -> Self {
        let now = Utc::now();
        Self {
            id: GauntletId::new(),
            name: name.into(),
            plan: default_plan(rules.encounter_count),
            long_rests_remaining: rules.long_rests,
            rules,
            phase: GauntletPhase::Recruiting,
            current_encounter: 0,
            encounters: Vec::new(),
            party: Vec::new(),
            fallen: Vec::new(),
            stash: Inventory::default(),
            short_rest_taken: false,
            monster_pool: default_monster_pool(),
            log: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_party(mut self, party: Vec<Character>) -> Self {
        self.party = party;
        self
    }

    pub fn with_monster_pool(mut self, pool: Vec<MonsterTemplate>) -> Self {
        self.monster_pool = pool;
        self
    }

    pub fn member(&self, id: CharacterId) -> Option<&Character> {
        self.party.iter().find(|c| c.id == id)
    }

    pub fn member_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.party.iter_mut().find(|c| c.id == id)
    }

    pub fn fallen_member(&self, id: CharacterId) -> Option<&FallenCharacter> {
        self.fallen.iter().find(|f| f.character.id == id)
    }

    pub fn party_levels(&self) -> Vec<u8> {
        self.party.iter().map(|c| c.level).collect()
    }

    /// Floor of the mean party level, at least 1.
    pub fn mean_party_level(&self) -> u8 {
        if self.party.is_empty() {
            return 1;
        }
        let total: u32 = self.party.iter().map(|c| c.level as u32).sum();
        ((total / self.party.len() as u32) as u8).max(1)
    }

    pub fn is_boss(&self, index: usize) -> bool {
        index + 1 == self.plan.len()
    }

    pub fn encounter(&self, index: usize) -> Option<&EncounterRecord> {
        self.encounters.iter().find(|e| e.index == index)
    }

    pub fn encounter_mut(&mut self, index: usize) -> Option<&mut EncounterRecord> {
        self.encounters.iter_mut().find(|e| e.index == index)
    }

    pub fn record(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterClass, RaceType};

    #[test]
    fn test_default_plan_ends_with_boss() {
        assert_eq!(default_plan(1), vec![Difficulty::Deadly]);
        let plan = default_plan(5);
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[0], Difficulty::Easy);
        assert_eq!(plan[4], Difficulty::Deadly);
        assert_eq!(default_plan(0).len(), 1);
    }

    #[test]
    fn test_new_gauntlet() {
        let gauntlet = Gauntlet::new("Tomb", GauntletRules::default());
        assert_eq!(gauntlet.phase, GauntletPhase::Recruiting);
        assert_eq!(gauntlet.long_rests_remaining, 2);
        assert_eq!(gauntlet.plan.len(), 5);
        assert!(gauntlet.is_boss(4));
        assert!(!gauntlet.is_boss(3));
        assert!(!gauntlet.monster_pool.is_empty());
    }

    #[test]
    fn test_mean_party_level_floors() {
        let mut a = Character::new("A", RaceType::Human, CharacterClass::Fighter);
        let mut b = Character::new("B", RaceType::Human, CharacterClass::Wizard);
        a.level = 3;
        b.level = 4;
        let gauntlet = Gauntlet::new("Tomb", GauntletRules::default()).with_party(vec![a, b]);
        assert_eq!(gauntlet.mean_party_level(), 3);
        assert_eq!(
            Gauntlet::new("Empty", GauntletRules::default()).mean_party_level(),
            1
        );
    }

    #[test]
    fn test_terminal_phases() {
        assert!(GauntletPhase::Victorious.is_terminal());
        assert!(GauntletPhase::Abandoned.is_terminal());
        assert!(!GauntletPhase::Camp.is_terminal());
    }
}
