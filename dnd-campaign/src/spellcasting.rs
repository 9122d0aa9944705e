//! Spell slot progression and spellcasting bookkeeping.
//!
//! Slot tables follow the PHB multiclass spellcaster table for full casters,
//! the Paladin/Ranger table for half casters, and Pact Magic for Warlocks.
//! Spell identity is a name plus a level; descriptions live elsewhere.

use crate::character::{Character, CharacterClass, KnownSpell, PendingChoice, SpellcastingData};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a class progresses spell slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CasterKind {
    Full,
    Half,
    Pact,
    None,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpellError {
    #[error("{0} cannot cast spells")]
    NotASpellcaster(String),
    #[error("No level {0} spell slot available")]
    NoSlotAvailable(u8),
    #[error("Spell level {level} is not castable (max {max})")]
    LevelTooHigh { level: u8, max: u8 },
    #[error("Spell level must be between 1 and 9, got {0}")]
    InvalidSpellLevel(u8),
    #[error("No pending choice to learn {0}")]
    NoPendingChoice(&'static str),
    #[error("Expected {expected} selections, got {got}")]
    WrongCount { expected: u8, got: usize },
    #[error("{0} is already known")]
    AlreadyKnown(String),
    #[error("{0} is not known")]
    NotKnown(String),
    #[error("Duplicate selection: {0}")]
    Duplicate(String),
    #[error("{0} does not prepare spells")]
    NotAPreparedCaster(String),
    #[error("Can prepare at most {limit} spells, got {got}")]
    TooManyPrepared { limit: u8, got: usize },
}

// Slots per spell level for caster levels 1-20.
const FULL_CASTER_SLOTS: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

const HALF_CASTER_SLOTS: [[u8; 5]; 20] = [
    [0, 0, 0, 0, 0],
    [2, 0, 0, 0, 0],
    [3, 0, 0, 0, 0],
    [3, 0, 0, 0, 0],
    [4, 2, 0, 0, 0],
    [4, 2, 0, 0, 0],
    [4, 3, 0, 0, 0],
    [4, 3, 0, 0, 0],
    [4, 3, 2, 0, 0],
    [4, 3, 2, 0, 0],
    [4, 3, 3, 0, 0],
    [4, 3, 3, 0, 0],
    [4, 3, 3, 1, 0],
    [4, 3, 3, 1, 0],
    [4, 3, 3, 2, 0],
    [4, 3, 3, 2, 0],
    [4, 3, 3, 3, 1],
    [4, 3, 3, 3, 1],
    [4, 3, 3, 3, 2],
    [4, 3, 3, 3, 2],
];

const BARD_SPELLS_KNOWN: [u8; 20] = [
    4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 15, 15, 16, 18, 19, 19, 20, 22, 22, 22,
];
const SORCERER_SPELLS_KNOWN: [u8; 20] = [
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 12, 13, 13, 14, 14, 15, 15, 15, 15,
];
const WARLOCK_SPELLS_KNOWN: [u8; 20] = [
    2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 11, 11, 12, 12, 13, 13, 14, 14, 15, 15,
];
const RANGER_SPELLS_KNOWN: [u8; 20] = [
    0, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11,
];

fn row(level: u8) -> usize {
    level.clamp(1, 20) as usize - 1
}

/// Number of Pact Magic slots at a Warlock level.
pub fn pact_slot_count(level: u8) -> u8 {
    match level {
        0 => 0,
        1 => 1,
        2..=10 => 2,
        11..=16 => 3,
        _ => 4,
    }
}

/// Level of every Pact Magic slot at a Warlock level.
pub fn pact_slot_level(level: u8) -> u8 {
    match level {
        0 => 0,
        1..=8 => (level + 1) / 2,
        _ => 5,
    }
}

/// Slot totals for a class at a level.
pub fn slot_totals(class: CharacterClass, level: u8) -> [u8; 9] {
    let mut totals = [0u8; 9];
    if level == 0 {
        return totals;
    }
    match class.caster_kind() {
        CasterKind::Full => totals = FULL_CASTER_SLOTS[row(level)],
        CasterKind::Half => totals[..5].copy_from_slice(&HALF_CASTER_SLOTS[row(level)]),
        CasterKind::Pact => {
            totals[pact_slot_level(level) as usize - 1] = pact_slot_count(level);
        }
        CasterKind::None => {}
    }
    totals
}

/// Highest spell level castable from slots (Mystic Arcanum is not a slot).
pub fn max_spell_level(class: CharacterClass, level: u8) -> u8 {
    slot_totals(class, level)
        .iter()
        .rposition(|&n| n > 0)
        .map(|idx| idx as u8 + 1)
        .unwrap_or(0)
}

/// Whether the class has spellcasting at this level (Paladin and Ranger start at 2).
pub fn has_spellcasting(class: CharacterClass, level: u8) -> bool {
    match class.caster_kind() {
        CasterKind::None => false,
        CasterKind::Half => level >= 2,
        CasterKind::Full | CasterKind::Pact => level >= 1,
    }
}

/// Cantrips known at a level.
pub fn cantrips_known(class: CharacterClass, level: u8) -> u8 {
    let (base, tier) = match class {
        CharacterClass::Bard | CharacterClass::Druid | CharacterClass::Warlock => (2, 0),
        CharacterClass::Cleric | CharacterClass::Wizard => (3, 0),
        CharacterClass::Sorcerer => (4, 0),
        _ => return 0,
    };
    let tier = tier + u8::from(level >= 4) + u8::from(level >= 10);
    base + tier
}

/// Spells known at a level for classes with a fixed repertoire. For the
/// Wizard this is the minimum spellbook size (6 at level 1, +2 per level).
pub fn spells_known(class: CharacterClass, level: u8) -> Option<u8> {
    if level == 0 {
        return Some(0);
    }
    match class {
        CharacterClass::Bard => Some(BARD_SPELLS_KNOWN[row(level)]),
        CharacterClass::Sorcerer => Some(SORCERER_SPELLS_KNOWN[row(level)]),
        CharacterClass::Warlock => Some(WARLOCK_SPELLS_KNOWN[row(level)]),
        CharacterClass::Ranger => Some(RANGER_SPELLS_KNOWN[row(level)]),
        CharacterClass::Wizard => Some(6 + 2 * (level.min(20) - 1)),
        _ => None,
    }
}

/// Whether the class prepares spells each day.
pub fn is_prepared_caster(class: CharacterClass) -> bool {
    matches!(
        class,
        CharacterClass::Cleric | CharacterClass::Druid | CharacterClass::Paladin | CharacterClass::Wizard
    )
}

/// Number of spells a prepared caster may prepare (minimum 1).
pub fn prepared_limit(character: &Character) -> Option<u8> {
    if !is_prepared_caster(character.class) || !has_spellcasting(character.class, character.level)
    {
        return None;
    }
    let ability = character.class.spellcasting_ability()?;
    let modifier = character.modifier(ability) as i16;
    let levels = match character.class {
        CharacterClass::Paladin => (character.level / 2) as i16,
        _ => character.level as i16,
    };
    Some((modifier + levels).max(1) as u8)
}

/// Bring spellcasting state in line with the character's current level.
/// Creates spellcasting data when the class gains it (Paladin/Ranger at 2).
/// Safe to call repeatedly.
pub fn recalculate_slots(character: &mut Character) {
    if !has_spellcasting(character.class, character.level) {
        return;
    }
    let Some(ability) = character.class.spellcasting_ability() else {
        return;
    };
    let totals = slot_totals(character.class, character.level);
    let casting = character
        .spellcasting
        .get_or_insert_with(|| SpellcastingData::new(ability));
    casting.spell_slots.set_totals(totals);
}

/// Spend a slot of exactly `slot_level`.
pub fn expend_slot(character: &mut Character, slot_level: u8) -> Result<(), SpellError> {
    if !(1..=9).contains(&slot_level) {
        return Err(SpellError::InvalidSpellLevel(slot_level));
    }
    let class_name = character.class.name().to_string();
    let casting = character
        .spellcasting
        .as_mut()
        .ok_or(SpellError::NotASpellcaster(class_name))?;
    if casting.spell_slots.use_slot(slot_level) {
        Ok(())
    } else {
        Err(SpellError::NoSlotAvailable(slot_level))
    }
}

/// Short rest: Pact Magic slots come back.
pub fn restore_short_rest(character: &mut Character) {
    if character.class.caster_kind() == CasterKind::Pact {
        restore_all(character);
    }
}

/// Long rest: all slots come back.
pub fn restore_all(character: &mut Character) {
    if let Some(casting) = character.spellcasting.as_mut() {
        casting.spell_slots.recover_all();
    }
}

fn pending_index(character: &Character, cantrips: bool) -> Option<usize> {
    character.pending_choices.iter().position(|choice| match choice {
        PendingChoice::LearnCantrips { .. } => cantrips,
        PendingChoice::LearnSpells { .. } => !cantrips,
        _ => false,
    })
}

fn check_duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), SpellError> {
    let mut seen: Vec<String> = Vec::new();
    for name in names {
        let lower = name.to_lowercase();
        if seen.contains(&lower) {
            return Err(SpellError::Duplicate(name.to_string()));
        }
        seen.push(lower);
    }
    Ok(())
}

/// Resolve the oldest pending cantrip choice.
pub fn learn_cantrips(character: &mut Character, names: &[String]) -> Result<(), SpellError> {
    let idx = pending_index(character, true).ok_or(SpellError::NoPendingChoice("cantrips"))?;
    let PendingChoice::LearnCantrips { count } = character.pending_choices[idx] else {
        return Err(SpellError::NoPendingChoice("cantrips"));
    };
    if names.len() != count as usize {
        return Err(SpellError::WrongCount {
            expected: count,
            got: names.len(),
        });
    }
    check_duplicates(names.iter().map(String::as_str))?;

    let class_name = character.class.name().to_string();
    let casting = character
        .spellcasting
        .as_mut()
        .ok_or(SpellError::NotASpellcaster(class_name))?;
    if let Some(known) = names.iter().find(|n| casting.knows_cantrip(n)) {
        return Err(SpellError::AlreadyKnown(known.clone()));
    }
    casting.cantrips_known.extend(names.iter().cloned());
    character.pending_choices.remove(idx);
    Ok(())
}

/// Resolve the oldest pending spell choice (spells known or spellbook entries).
pub fn learn_spells(character: &mut Character, spells: &[KnownSpell]) -> Result<(), SpellError> {
    let idx = pending_index(character, false).ok_or(SpellError::NoPendingChoice("spells"))?;
    let PendingChoice::LearnSpells { count, max_level } = character.pending_choices[idx] else {
        return Err(SpellError::NoPendingChoice("spells"));
    };
    if spells.len() != count as usize {
        return Err(SpellError::WrongCount {
            expected: count,
            got: spells.len(),
        });
    }
    check_duplicates(spells.iter().map(|s| s.name.as_str()))?;
    for spell in spells {
        if spell.level == 0 || spell.level > 9 {
            return Err(SpellError::InvalidSpellLevel(spell.level));
        }
        if spell.level > max_level {
            return Err(SpellError::LevelTooHigh {
                level: spell.level,
                max: max_level,
            });
        }
    }

    let class_name = character.class.name().to_string();
    let casting = character
        .spellcasting
        .as_mut()
        .ok_or(SpellError::NotASpellcaster(class_name))?;
    if let Some(known) = spells.iter().find(|s| casting.knows_spell(&s.name)) {
        return Err(SpellError::AlreadyKnown(known.name.clone()));
    }
    casting.spells_known.extend(spells.iter().cloned());
    character.pending_choices.remove(idx);
    Ok(())
}

/// Replace the prepared list of a prepared caster.
pub fn prepare_spells(character: &mut Character, spells: Vec<KnownSpell>) -> Result<(), SpellError> {
    let limit = prepared_limit(character)
        .ok_or_else(|| SpellError::NotAPreparedCaster(character.class.name().to_string()))?;
    if spells.len() > limit as usize {
        return Err(SpellError::TooManyPrepared {
            limit,
            got: spells.len(),
        });
    }
    check_duplicates(spells.iter().map(|s| s.name.as_str()))?;

    let max = character.max_spell_level();
    let from_spellbook = character.class == CharacterClass::Wizard;
    let casting = character
        .spellcasting
        .as_mut()
        .ok_or_else(|| SpellError::NotASpellcaster(character.class.name().to_string()))?;
    for spell in &spells {
        if spell.level == 0 || spell.level > 9 {
            return Err(SpellError::InvalidSpellLevel(spell.level));
        }
        if spell.level > max {
            return Err(SpellError::LevelTooHigh {
                level: spell.level,
                max,
            });
        }
        if from_spellbook && !casting.knows_spell(&spell.name) {
            return Err(SpellError::NotKnown(spell.name.clone()));
        }
    }
    casting.spells_prepared = spells;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, RaceType};

    fn caster(class: CharacterClass, level: u8) -> Character {
        let mut character = Character::new("Caster", RaceType::Human, class);
        character.level = level;
        character.ability_scores = AbilityScores::new(10, 14, 14, 16, 16, 16);
        recalculate_slots(&mut character);
        character
    }

    #[test]
    fn test_full_caster_table() {
        assert_eq!(slot_totals(CharacterClass::Wizard, 1), [2, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(slot_totals(CharacterClass::Cleric, 5), [4, 3, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(slot_totals(CharacterClass::Bard, 20), [4, 3, 3, 3, 3, 2, 2, 1, 1]);
        assert_eq!(max_spell_level(CharacterClass::Sorcerer, 17), 9);
    }

    #[test]
    fn test_half_caster_table() {
        assert_eq!(slot_totals(CharacterClass::Paladin, 1), [0; 9]);
        assert_eq!(slot_totals(CharacterClass::Paladin, 2), [2, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(slot_totals(CharacterClass::Ranger, 9), [4, 3, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(max_spell_level(CharacterClass::Ranger, 20), 5);
        assert!(!has_spellcasting(CharacterClass::Paladin, 1));
        assert!(has_spellcasting(CharacterClass::Paladin, 2));
    }

    #[test]
    fn test_pact_magic() {
        assert_eq!(slot_totals(CharacterClass::Warlock, 1), [1, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(slot_totals(CharacterClass::Warlock, 3), [0, 2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(slot_totals(CharacterClass::Warlock, 11), [0, 0, 0, 0, 3, 0, 0, 0, 0]);
        assert_eq!(slot_totals(CharacterClass::Warlock, 17), [0, 0, 0, 0, 4, 0, 0, 0, 0]);
        assert_eq!(pact_slot_level(7), 4);
    }

    #[test]
    fn test_non_caster_has_no_slots() {
        let fighter = caster(CharacterClass::Fighter, 10);
        assert!(fighter.spellcasting.is_none());
        assert_eq!(fighter.max_spell_level(), 0);
    }

    #[test]
    fn test_cantrips_and_spells_known() {
        assert_eq!(cantrips_known(CharacterClass::Wizard, 1), 3);
        assert_eq!(cantrips_known(CharacterClass::Wizard, 4), 4);
        assert_eq!(cantrips_known(CharacterClass::Sorcerer, 10), 6);
        assert_eq!(cantrips_known(CharacterClass::Ranger, 10), 0);
        assert_eq!(spells_known(CharacterClass::Bard, 10), Some(14));
        assert_eq!(spells_known(CharacterClass::Wizard, 3), Some(10));
        assert_eq!(spells_known(CharacterClass::Cleric, 3), None);
    }

    #[test]
    fn test_prepared_limit() {
        let cleric = caster(CharacterClass::Cleric, 3);
        assert_eq!(prepared_limit(&cleric), Some(6));
        let paladin = caster(CharacterClass::Paladin, 5);
        assert_eq!(prepared_limit(&paladin), Some(5));
        let bard = caster(CharacterClass::Bard, 5);
        assert_eq!(prepared_limit(&bard), None);
    }

    #[test]
    fn test_recalculate_keeps_used_slots() {
        let mut wizard = caster(CharacterClass::Wizard, 2);
        expend_slot(&mut wizard, 1).unwrap();
        wizard.level = 3;
        recalculate_slots(&mut wizard);
        let slots = &wizard.spellcasting.as_ref().unwrap().spell_slots;
        assert_eq!(slots.available(1), 3);
        assert_eq!(slots.available(2), 2);

        recalculate_slots(&mut wizard);
        let slots = &wizard.spellcasting.as_ref().unwrap().spell_slots;
        assert_eq!(slots.available(1), 3);
    }

    #[test]
    fn test_expend_slot_errors() {
        let mut warlock = caster(CharacterClass::Warlock, 3);
        assert_eq!(expend_slot(&mut warlock, 1), Err(SpellError::NoSlotAvailable(1)));
        expend_slot(&mut warlock, 2).unwrap();
        expend_slot(&mut warlock, 2).unwrap();
        assert_eq!(expend_slot(&mut warlock, 2), Err(SpellError::NoSlotAvailable(2)));
        restore_short_rest(&mut warlock);
        assert!(expend_slot(&mut warlock, 2).is_ok());

        let mut fighter = caster(CharacterClass::Fighter, 3);
        assert!(matches!(
            expend_slot(&mut fighter, 1),
            Err(SpellError::NotASpellcaster(_))
        ));
    }

    #[test]
    fn test_short_rest_does_not_restore_wizard() {
        let mut wizard = caster(CharacterClass::Wizard, 1);
        expend_slot(&mut wizard, 1).unwrap();
        restore_short_rest(&mut wizard);
        assert_eq!(wizard.spellcasting.as_ref().unwrap().spell_slots.available(1), 1);
        restore_all(&mut wizard);
        assert_eq!(wizard.spellcasting.as_ref().unwrap().spell_slots.available(1), 2);
    }

    #[test]
    fn test_learn_spells_consumes_pending_choice() {
        let mut sorcerer = caster(CharacterClass::Sorcerer, 3);
        sorcerer.pending_choices.push(PendingChoice::LearnSpells {
            count: 1,
            max_level: 2,
        });

        let too_high = [KnownSpell::new("Fireball", 3)];
        assert_eq!(
            learn_spells(&mut sorcerer, &too_high),
            Err(SpellError::LevelTooHigh { level: 3, max: 2 })
        );
        let too_many = [KnownSpell::new("Shield", 1), KnownSpell::new("Sleep", 1)];
        assert!(matches!(
            learn_spells(&mut sorcerer, &too_many),
            Err(SpellError::WrongCount { expected: 1, got: 2 })
        ));

        learn_spells(&mut sorcerer, &[KnownSpell::new("Misty Step", 2)]).unwrap();
        assert!(sorcerer.pending_choices.is_empty());
        assert!(sorcerer.spellcasting.as_ref().unwrap().knows_spell("misty step"));
        assert_eq!(
            learn_spells(&mut sorcerer, &[KnownSpell::new("Shield", 1)]),
            Err(SpellError::NoPendingChoice("spells"))
        );
    }

    #[test]
    fn test_learn_cantrips_rejects_known() {
        let mut wizard = caster(CharacterClass::Wizard, 4);
        wizard
            .spellcasting
            .as_mut()
            .unwrap()
            .cantrips_known
            .push("Light".to_string());
        wizard
            .pending_choices
            .push(PendingChoice::LearnCantrips { count: 1 });
        assert_eq!(
            learn_cantrips(&mut wizard, &["light".to_string()]),
            Err(SpellError::AlreadyKnown("light".to_string()))
        );
        learn_cantrips(&mut wizard, &["Mage Hand".to_string()]).unwrap();
        assert!(wizard.pending_choices.is_empty());
    }

    #[test]
    fn test_prepare_spells_rules() {
        let mut wizard = caster(CharacterClass::Wizard, 3);
        wizard
            .spellcasting
            .as_mut()
            .unwrap()
            .spells_known
            .push(KnownSpell::new("Shield", 1));
        assert_eq!(
            prepare_spells(&mut wizard, vec![KnownSpell::new("Sleep", 1)]),
            Err(SpellError::NotKnown("Sleep".to_string()))
        );
        prepare_spells(&mut wizard, vec![KnownSpell::new("Shield", 1)]).unwrap();

        let mut cleric = caster(CharacterClass::Cleric, 1);
        let too_many: Vec<_> = (0..5)
            .map(|i| KnownSpell::new(format!("Prayer {i}"), 1))
            .collect();
        assert_eq!(
            prepare_spells(&mut cleric, too_many),
            Err(SpellError::TooManyPrepared { limit: 4, got: 5 })
        );
        assert_eq!(
            prepare_spells(&mut cleric, vec![KnownSpell::new("Spiritual Weapon", 2)]),
            Err(SpellError::LevelTooHigh { level: 2, max: 1 })
        );

        let mut sorcerer = caster(CharacterClass::Sorcerer, 3);
        assert!(matches!(
            prepare_spells(&mut sorcerer, vec![]),
            Err(SpellError::NotAPreparedCaster(_))
        ));
    }
}
