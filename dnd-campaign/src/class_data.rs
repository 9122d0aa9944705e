//! D&D 5e class progression data.
//!
//! Saving throws and skill options for character creation, the features each
//! class gains per level, subclass and ASI levels, and how limited-use
//! features scale. Names only; rule text is out of scope.

use crate::character::{
    Ability, AbilityScores, Character, CharacterClass, Feature, RechargeType, Skill,
};

/// Class-specific data for character creation.
pub struct ClassData {
    /// Saving throw proficiencies granted by the class.
    pub saving_throws: [Ability; 2],
    /// Number of skills to choose.
    pub skill_count: usize,
    /// Skills available to choose from.
    pub skill_options: &'static [Skill],
}

const ALL_SKILLS: &[Skill] = &[
    Skill::Athletics,
    Skill::Acrobatics,
    Skill::SleightOfHand,
    Skill::Stealth,
    Skill::Arcana,
    Skill::History,
    Skill::Investigation,
    Skill::Nature,
    Skill::Religion,
    Skill::AnimalHandling,
    Skill::Insight,
    Skill::Medicine,
    Skill::Perception,
    Skill::Survival,
    Skill::Deception,
    Skill::Intimidation,
    Skill::Performance,
    Skill::Persuasion,
];

impl CharacterClass {
    /// Get class data for character creation.
    pub fn data(&self) -> ClassData {
        use Ability::*;
        match self {
            CharacterClass::Barbarian => ClassData {
                saving_throws: [Strength, Constitution],
                skill_count: 2,
                skill_options: &[
                    Skill::AnimalHandling,
                    Skill::Athletics,
                    Skill::Intimidation,
                    Skill::Nature,
                    Skill::Perception,
                    Skill::Survival,
                ],
            },
            CharacterClass::Bard => ClassData {
                saving_throws: [Dexterity, Charisma],
                skill_count: 3,
                skill_options: ALL_SKILLS,
            },
            CharacterClass::Cleric => ClassData {
                saving_throws: [Wisdom, Charisma],
                skill_count: 2,
                skill_options: &[
                    Skill::History,
                    Skill::Insight,
                    Skill::Medicine,
                    Skill::Persuasion,
                    Skill::Religion,
                ],
            },
            CharacterClass::Druid => ClassData {
                saving_throws: [Intelligence, Wisdom],
                skill_count: 2,
                skill_options: &[
                    Skill::Arcana,
                    Skill::AnimalHandling,
                    Skill::Insight,
                    Skill::Medicine,
                    Skill::Nature,
                    Skill::Perception,
                    Skill::Religion,
                    Skill::Survival,
                ],
            },
            CharacterClass::Fighter => ClassData {
                saving_throws: [Strength, Constitution],
                skill_count: 2,
                skill_options: &[
                    Skill::Acrobatics,
                    Skill::AnimalHandling,
                    Skill::Athletics,
                    Skill::History,
                    Skill::Insight,
                    Skill::Intimidation,
                    Skill::Perception,
                    Skill::Survival,
                ],
            },
            CharacterClass::Monk => ClassData {
                saving_throws: [Strength, Dexterity],
                skill_count: 2,
                skill_options: &[
                    Skill::Acrobatics,
                    Skill::Athletics,
                    Skill::History,
                    Skill::Insight,
                    Skill::Religion,
                    Skill::Stealth,
                ],
            },
            CharacterClass::Paladin => ClassData {
                saving_throws: [Wisdom, Charisma],
                skill_count: 2,
                skill_options: &[
                    Skill::Athletics,
                    Skill::Insight,
                    Skill::Intimidation,
                    Skill::Medicine,
                    Skill::Persuasion,
                    Skill::Religion,
                ],
            },
            CharacterClass::Ranger => ClassData {
                saving_throws: [Strength, Dexterity],
                skill_count: 3,
                skill_options: &[
                    Skill::AnimalHandling,
                    Skill::Athletics,
                    Skill::Insight,
                    Skill::Investigation,
                    Skill::Nature,
                    Skill::Perception,
                    Skill::Stealth,
                    Skill::Survival,
                ],
            },
            CharacterClass::Rogue => ClassData {
                saving_throws: [Dexterity, Intelligence],
                skill_count: 4,
                skill_options: &[
                    Skill::Acrobatics,
                    Skill::Athletics,
                    Skill::Deception,
                    Skill::Insight,
                    Skill::Intimidation,
                    Skill::Investigation,
                    Skill::Perception,
                    Skill::Performance,
                    Skill::Persuasion,
                    Skill::SleightOfHand,
                    Skill::Stealth,
                ],
            },
            CharacterClass::Sorcerer => ClassData {
                saving_throws: [Constitution, Charisma],
                skill_count: 2,
                skill_options: &[
                    Skill::Arcana,
                    Skill::Deception,
                    Skill::Insight,
                    Skill::Intimidation,
                    Skill::Persuasion,
                    Skill::Religion,
                ],
            },
            CharacterClass::Warlock => ClassData {
                saving_throws: [Wisdom, Charisma],
                skill_count: 2,
                skill_options: &[
                    Skill::Arcana,
                    Skill::Deception,
                    Skill::History,
                    Skill::Intimidation,
                    Skill::Investigation,
                    Skill::Nature,
                    Skill::Religion,
                ],
            },
            CharacterClass::Wizard => ClassData {
                saving_throws: [Intelligence, Wisdom],
                skill_count: 2,
                skill_options: &[
                    Skill::Arcana,
                    Skill::History,
                    Skill::Insight,
                    Skill::Investigation,
                    Skill::Medicine,
                    Skill::Religion,
                ],
            },
        }
    }
}

/// Names of the class features gained at exactly `level`. Subclass features
/// and ability score improvements are tracked as pending choices instead.
pub fn features_at_level(class: CharacterClass, level: u8) -> &'static [&'static str] {
    use CharacterClass::*;
    match (class, level) {
        (Barbarian, 1) => &["Rage", "Unarmored Defense"],
        (Barbarian, 2) => &["Reckless Attack", "Danger Sense"],
        (Barbarian, 5) => &["Extra Attack", "Fast Movement"],
        (Barbarian, 7) => &["Feral Instinct"],
        (Barbarian, 9) => &["Brutal Critical"],
        (Barbarian, 11) => &["Relentless Rage"],
        (Barbarian, 15) => &["Persistent Rage"],
        (Barbarian, 18) => &["Indomitable Might"],
        (Barbarian, 20) => &["Primal Champion"],

        (Bard, 1) => &["Spellcasting", "Bardic Inspiration"],
        (Bard, 2) => &["Jack of All Trades", "Song of Rest"],
        (Bard, 3) => &["Expertise"],
        (Bard, 5) => &["Font of Inspiration"],
        (Bard, 6) => &["Countercharm"],
        (Bard, 10) => &["Magical Secrets"],
        (Bard, 20) => &["Superior Inspiration"],

        (Cleric, 1) => &["Spellcasting"],
        (Cleric, 2) => &["Channel Divinity"],
        (Cleric, 5) => &["Destroy Undead"],
        (Cleric, 10) => &["Divine Intervention"],

        (Druid, 1) => &["Druidic", "Spellcasting"],
        (Druid, 2) => &["Wild Shape"],
        (Druid, 18) => &["Timeless Body", "Beast Spells"],
        (Druid, 20) => &["Archdruid"],

        (Fighter, 1) => &["Fighting Style", "Second Wind"],
        (Fighter, 2) => &["Action Surge"],
        (Fighter, 5) => &["Extra Attack"],
        (Fighter, 9) => &["Indomitable"],

        (Monk, 1) => &["Unarmored Defense", "Martial Arts"],
        (Monk, 2) => &["Ki", "Unarmored Movement"],
        (Monk, 3) => &["Deflect Missiles"],
        (Monk, 4) => &["Slow Fall"],
        (Monk, 5) => &["Extra Attack", "Stunning Strike"],
        (Monk, 6) => &["Ki-Empowered Strikes"],
        (Monk, 7) => &["Evasion", "Stillness of Mind"],
        (Monk, 10) => &["Purity of Body"],
        (Monk, 13) => &["Tongue of the Sun and Moon"],
        (Monk, 14) => &["Diamond Soul"],
        (Monk, 15) => &["Timeless Body"],
        (Monk, 18) => &["Empty Body"],
        (Monk, 20) => &["Perfect Self"],

        (Paladin, 1) => &["Divine Sense", "Lay on Hands"],
        (Paladin, 2) => &["Fighting Style", "Spellcasting", "Divine Smite"],
        (Paladin, 3) => &["Divine Health"],
        (Paladin, 5) => &["Extra Attack"],
        (Paladin, 6) => &["Aura of Protection"],
        (Paladin, 10) => &["Aura of Courage"],
        (Paladin, 11) => &["Improved Divine Smite"],
        (Paladin, 14) => &["Cleansing Touch"],

        (Ranger, 1) => &["Favored Enemy", "Natural Explorer"],
        (Ranger, 2) => &["Fighting Style", "Spellcasting"],
        (Ranger, 3) => &["Primeval Awareness"],
        (Ranger, 5) => &["Extra Attack"],
        (Ranger, 8) => &["Land's Stride"],
        (Ranger, 10) => &["Hide in Plain Sight"],
        (Ranger, 14) => &["Vanish"],
        (Ranger, 18) => &["Feral Senses"],
        (Ranger, 20) => &["Foe Slayer"],

        (Rogue, 1) => &["Expertise", "Sneak Attack", "Thieves' Cant"],
        (Rogue, 2) => &["Cunning Action"],
        (Rogue, 5) => &["Uncanny Dodge"],
        (Rogue, 7) => &["Evasion"],
        (Rogue, 11) => &["Reliable Talent"],
        (Rogue, 14) => &["Blindsense"],
        (Rogue, 15) => &["Slippery Mind"],
        (Rogue, 18) => &["Elusive"],
        (Rogue, 20) => &["Stroke of Luck"],

        (Sorcerer, 1) => &["Spellcasting"],
        (Sorcerer, 2) => &["Sorcery Points"],
        (Sorcerer, 3) => &["Metamagic"],
        (Sorcerer, 20) => &["Sorcerous Restoration"],

        (Warlock, 1) => &["Pact Magic"],
        (Warlock, 2) => &["Eldritch Invocations"],
        (Warlock, 3) => &["Pact Boon"],
        (Warlock, 11) => &["Mystic Arcanum"],
        (Warlock, 20) => &["Eldritch Master"],

        (Wizard, 1) => &["Spellcasting", "Arcane Recovery"],
        (Wizard, 18) => &["Spell Mastery"],
        (Wizard, 20) => &["Signature Spells"],

        _ => &[],
    }
}

/// Level at which the class picks its subclass.
pub fn subclass_level(class: CharacterClass) -> u8 {
    match class {
        CharacterClass::Cleric | CharacterClass::Sorcerer | CharacterClass::Warlock => 1,
        CharacterClass::Druid | CharacterClass::Wizard => 2,
        _ => 3,
    }
}

/// Whether reaching `level` grants an ability score improvement.
pub fn is_asi_level(class: CharacterClass, level: u8) -> bool {
    match level {
        4 | 8 | 12 | 16 | 19 => true,
        6 | 14 => class == CharacterClass::Fighter,
        10 => class == CharacterClass::Rogue,
        _ => false,
    }
}

/// Maximum uses and recharge of a limited-use feature at a class level.
/// `None` means the feature is unlimited or passive.
pub fn feature_uses(
    name: &str,
    class_level: u8,
    scores: &AbilityScores,
) -> Option<(u8, RechargeType)> {
    let cha = scores.modifier(Ability::Charisma);
    let uses = match name {
        "Rage" => {
            let uses = match class_level {
                0..=2 => 2,
                3..=5 => 3,
                6..=11 => 4,
                12..=16 => 5,
                _ => 6,
            };
            (uses, RechargeType::LongRest)
        }
        "Channel Divinity" => {
            let uses = match class_level {
                0..=5 => 1,
                6..=17 => 2,
                _ => 3,
            };
            (uses, RechargeType::ShortRest)
        }
        "Ki" => (class_level, RechargeType::ShortRest),
        "Sorcery Points" => (class_level, RechargeType::LongRest),
        "Bardic Inspiration" => {
            let recharge = if class_level >= 5 {
                RechargeType::ShortRest
            } else {
                RechargeType::LongRest
            };
            (cha.max(1) as u8, recharge)
        }
        "Lay on Hands" => (class_level.saturating_mul(5), RechargeType::LongRest),
        "Action Surge" => {
            let uses = if class_level >= 17 { 2 } else { 1 };
            (uses, RechargeType::ShortRest)
        }
        "Indomitable" => {
            let uses = match class_level {
                0..=12 => 1,
                13..=16 => 2,
                _ => 3,
            };
            (uses, RechargeType::LongRest)
        }
        "Wild Shape" => (2, RechargeType::ShortRest),
        "Divine Sense" => ((1 + cha).max(1) as u8, RechargeType::LongRest),
        "Second Wind" => (1, RechargeType::ShortRest),
        "Arcane Recovery" => (1, RechargeType::LongRest),
        _ => return None,
    };
    Some(uses)
}

/// Build the features a class gains at `level`, with their use pools filled.
pub fn grant_features(class: CharacterClass, level: u8, scores: &AbilityScores) -> Vec<Feature> {
    features_at_level(class, level)
        .iter()
        .map(|name| {
            let feature = Feature::new(*name, class.name(), level);
            match feature_uses(name, level, scores) {
                Some((maximum, recharge)) => feature.with_uses(maximum, recharge),
                None => feature,
            }
        })
        .collect()
}

/// Recompute every scaled use pool for the character's current level and
/// ability scores.
pub fn rescale_feature_uses(character: &mut Character) {
    let level = character.level;
    let scores = character.ability_scores.clone();
    for feature in &mut character.features {
        let Some(uses) = feature.uses.as_mut() else {
            continue;
        };
        if let Some((maximum, recharge)) = feature_uses(&feature.name, level, &scores) {
            uses.rescale(maximum);
            uses.recharge = recharge;
        }
    }
}

/// Refill use pools after a rest. A long rest refills everything.
pub fn recharge_features(character: &mut Character, rest: RechargeType) {
    for uses in character.features.iter_mut().filter_map(|f| f.uses.as_mut()) {
        if rest == RechargeType::LongRest || uses.recharge == RechargeType::ShortRest {
            uses.current = uses.maximum;
        }
    }
}
