//! Experience, level-ups and the choices they leave behind.
//!
//! Leveling is split in two: `plan_*` rolls the dice and produces
//! `LevelUpRecord`s, `apply_level_up` applies one record without any
//! randomness. A record only applies on top of the level right below it,
//! so replaying one is refused instead of granting a second level.

use crate::character::{
    Ability, Character, CharacterClass, Feature, PendingChoice, MAX_ABILITY_SCORE, MAX_LEVEL,
};
use crate::class_data;
use crate::spellcasting;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// XP needed to reach each level (index 0 = level 1).
pub const XP_THRESHOLDS: [u32; 20] = [
    0, 300, 900, 2700, 6500, 14000, 23000, 34000, 48000, 64000, 85000, 100000, 120000, 140000,
    165000, 195000, 225000, 265000, 305000, 355000,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("{0} is dead")]
    CharacterDead(String),
    #[error("Expected a level {expected} record, got level {got}")]
    LevelMismatch { expected: u8, got: u8 },
    #[error("{0} is already level 20")]
    MaxLevel(String),
    #[error("No pending {0} choice")]
    NoPendingChoice(&'static str),
    #[error("{0} is already at 20")]
    AbilityAtMaximum(Ability),
    #[error("Invalid choice: {0}")]
    InvalidChoice(String),
    #[error("Subclass already chosen: {0}")]
    SubclassAlreadyChosen(String),
}

/// How hit points are gained on level-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HpMethod {
    #[default]
    Rolled,
    /// The PHB fixed value (half the die plus one).
    Average,
}

/// Everything one level-up changes, with its dice already rolled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelUpRecord {
    pub level: u8,
    pub hit_die_roll: u32,
    pub con_modifier: i8,
    pub hp_gained: i32,
    pub features_granted: Vec<Feature>,
    pub slot_totals: [u8; 9],
    pub pending_choices: Vec<PendingChoice>,
}

/// An ability score improvement decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsiChoice {
    /// +2 to one ability.
    Single(Ability),
    /// +1 to two different abilities.
    Split(Ability, Ability),
    /// Take a feat instead.
    Feat(String),
}

pub fn xp_threshold(level: u8) -> u32 {
    XP_THRESHOLDS[level.clamp(1, MAX_LEVEL) as usize - 1]
}

pub fn level_for_xp(xp: u32) -> u8 {
    XP_THRESHOLDS.iter().take_while(|&&t| xp >= t).count() as u8
}

/// XP still needed for the next level, or None at level 20.
pub fn xp_to_next_level(xp: u32) -> Option<u32> {
    let level = level_for_xp(xp);
    if level >= MAX_LEVEL {
        return None;
    }
    Some(xp_threshold(level + 1) - xp)
}

/// Choices a class is owed on reaching `level`.
pub fn choices_at_level(class: CharacterClass, level: u8) -> Vec<PendingChoice> {
    let mut choices = Vec::new();
    if class_data::is_asi_level(class, level) {
        choices.push(PendingChoice::AbilityScoreImprovement { level });
    }
    if class_data::subclass_level(class) == level {
        choices.push(PendingChoice::Subclass { level });
    }

    let prev = level.saturating_sub(1);
    let cantrips = spellcasting::cantrips_known(class, level)
        .saturating_sub(spellcasting::cantrips_known(class, prev));
    if cantrips > 0 && prev > 0 {
        choices.push(PendingChoice::LearnCantrips { count: cantrips });
    }
    if let (Some(now), Some(before)) = (
        spellcasting::spells_known(class, level),
        spellcasting::spells_known(class, prev),
    ) {
        let count = now.saturating_sub(before);
        if count > 0 && prev > 0 {
            choices.push(PendingChoice::LearnSpells {
                count,
                max_level: spellcasting::max_spell_level(class, level),
            });
        }
    }
    choices
}

/// Roll the level after the character's current one.
pub fn plan_next_level<R: Rng + ?Sized>(
    character: &Character,
    hp_method: HpMethod,
    rng: &mut R,
) -> Result<LevelUpRecord, ProgressionError> {
    plan_level(character, character.level + 1, hp_method, rng)
}

fn plan_level<R: Rng + ?Sized>(
    character: &Character,
    level: u8,
    hp_method: HpMethod,
    rng: &mut R,
) -> Result<LevelUpRecord, ProgressionError> {
    if !character.is_alive() {
        return Err(ProgressionError::CharacterDead(character.name.clone()));
    }
    if level > MAX_LEVEL {
        return Err(ProgressionError::MaxLevel(character.name.clone()));
    }
    let class = character.class;
    let die = class.hit_die();
    let hit_die_roll = match hp_method {
        HpMethod::Rolled => die.roll(rng),
        HpMethod::Average => die.average(),
    };
    let con_modifier = character.modifier(Ability::Constitution);
    Ok(LevelUpRecord {
        level,
        hit_die_roll,
        con_modifier,
        hp_gained: (hit_die_roll as i32 + con_modifier as i32).max(1),
        features_granted: class_data::grant_features(class, level, &character.ability_scores),
        slot_totals: spellcasting::slot_totals(class, level),
        pending_choices: choices_at_level(class, level),
    })
}

/// Plan every level-up that `new_xp` earns, in order. Capped at level 20.
pub fn plan_level_ups<R: Rng + ?Sized>(
    character: &Character,
    new_xp: u32,
    hp_method: HpMethod,
    rng: &mut R,
) -> Result<Vec<LevelUpRecord>, ProgressionError> {
    let target = level_for_xp(new_xp).min(MAX_LEVEL);
    (character.level + 1..=target)
        .map(|level| plan_level(character, level, hp_method, rng))
        .collect()
}

/// Plan the single level a milestone grants. None at level 20.
pub fn plan_milestone_level<R: Rng + ?Sized>(
    character: &Character,
    hp_method: HpMethod,
    rng: &mut R,
) -> Result<Option<LevelUpRecord>, ProgressionError> {
    if character.level >= MAX_LEVEL {
        return Ok(None);
    }
    plan_next_level(character, hp_method, rng).map(Some)
}

/// Apply one planned level-up. XP is raised to the new level's threshold if
/// it is below it (milestone leveling).
pub fn apply_level_up(
    character: &mut Character,
    record: &LevelUpRecord,
) -> Result<(), ProgressionError> {
    if !character.is_alive() {
        return Err(ProgressionError::CharacterDead(character.name.clone()));
    }
    if character.level >= MAX_LEVEL {
        return Err(ProgressionError::MaxLevel(character.name.clone()));
    }
    if record.level != character.level + 1 {
        return Err(ProgressionError::LevelMismatch {
            expected: character.level + 1,
            got: record.level,
        });
    }

    character.level = record.level;
    character.experience = character.experience.max(xp_threshold(record.level));
    character.hit_points.raise_maximum(record.hp_gained);
    character.hit_dice.add_one();
    for feature in &record.features_granted {
        if !character.has_feature(&feature.name) {
            character.features.push(feature.clone());
        }
    }
    class_data::rescale_feature_uses(character);
    spellcasting::recalculate_slots(character);
    character
        .pending_choices
        .extend(record.pending_choices.iter().cloned());
    character.level_history.push(record.clone());
    Ok(())
}

/// Add XP and apply every level-up it earns. Returns the applied records.
pub fn award_experience<R: Rng + ?Sized>(
    character: &mut Character,
    amount: u32,
    hp_method: HpMethod,
    rng: &mut R,
) -> Result<Vec<LevelUpRecord>, ProgressionError> {
    if !character.is_alive() {
        return Err(ProgressionError::CharacterDead(character.name.clone()));
    }
    let new_xp = character.experience.saturating_add(amount);
    let records = plan_level_ups(character, new_xp, hp_method, rng)?;
    character.experience = new_xp;
    for record in &records {
        apply_level_up(character, record)?;
    }
    Ok(records)
}

fn take_pending(
    character: &mut Character,
    what: &'static str,
    matches: impl Fn(&PendingChoice) -> bool,
) -> Result<PendingChoice, ProgressionError> {
    let idx = character
        .pending_choices
        .iter()
        .position(matches)
        .ok_or(ProgressionError::NoPendingChoice(what))?;
    Ok(character.pending_choices.remove(idx))
}

/// Check an ASI against the character without changing anything.
pub fn validate_asi(character: &Character, choice: &AsiChoice) -> Result<(), ProgressionError> {
    if !character
        .pending_choices
        .iter()
        .any(|c| matches!(c, PendingChoice::AbilityScoreImprovement { .. }))
    {
        return Err(ProgressionError::NoPendingChoice("ability score improvement"));
    }
    let scores = &character.ability_scores;
    match choice {
        AsiChoice::Single(ability) => {
            if scores.get(*ability) >= MAX_ABILITY_SCORE {
                return Err(ProgressionError::AbilityAtMaximum(*ability));
            }
        }
        AsiChoice::Split(a, b) => {
            if a == b {
                return Err(ProgressionError::InvalidChoice(format!(
                    "split improvement needs two different abilities, got {a} twice"
                )));
            }
            if scores.get(*a) >= MAX_ABILITY_SCORE && scores.get(*b) >= MAX_ABILITY_SCORE {
                return Err(ProgressionError::AbilityAtMaximum(*a));
            }
        }
        AsiChoice::Feat(name) => {
            if name.trim().is_empty() {
                return Err(ProgressionError::InvalidChoice("feat name is empty".into()));
            }
            if character.has_feature(name) {
                return Err(ProgressionError::InvalidChoice(format!(
                    "{name} is already known"
                )));
            }
        }
    }
    Ok(())
}

/// Resolve the oldest pending ability score improvement.
pub fn apply_asi(character: &mut Character, choice: &AsiChoice) -> Result<(), ProgressionError> {
    validate_asi(character, choice)?;
    let pending = take_pending(character, "ability score improvement", |c| {
        matches!(c, PendingChoice::AbilityScoreImprovement { .. })
    })?;
    let granted_at = match pending {
        PendingChoice::AbilityScoreImprovement { level } => level,
        _ => character.level,
    };

    let old_con = character.modifier(Ability::Constitution);
    match choice {
        AsiChoice::Single(ability) => {
            character.ability_scores.increase(*ability, 2);
        }
        AsiChoice::Split(a, b) => {
            character.ability_scores.increase(*a, 1);
            character.ability_scores.increase(*b, 1);
        }
        AsiChoice::Feat(name) => {
            character
                .features
                .push(Feature::new(name.trim(), "Feat", granted_at));
        }
    }

    let con_delta = character.modifier(Ability::Constitution) - old_con;
    if con_delta != 0 {
        character
            .hit_points
            .raise_maximum(con_delta as i32 * character.level as i32);
    }
    class_data::rescale_feature_uses(character);
    Ok(())
}

/// Resolve the pending subclass choice.
pub fn choose_subclass(character: &mut Character, name: &str) -> Result<(), ProgressionError> {
    if let Some(existing) = &character.subclass {
        return Err(ProgressionError::SubclassAlreadyChosen(existing.clone()));
    }
    if name.trim().is_empty() {
        return Err(ProgressionError::InvalidChoice("subclass name is empty".into()));
    }
    take_pending(character, "subclass", |c| {
        matches!(c, PendingChoice::Subclass { .. })
    })?;
    character.subclass = Some(name.trim().to_string());
    Ok(())
}
