//! Character builder for D&D 5e character creation.
//!
//! Builds a rules-complete level-1 character (HP, features, proficiencies,
//! spell slots) and can advance it to a higher level for recruits. Spell
//! picks the caller leaves out become pending choices.

use crate::character::{
    Ability, AbilityScores, Background, Character, CharacterClass, HitDice, HitPoints,
    KnownSpell, PendingChoice, ProficiencyLevel, RaceType, Skill, MAX_LEVEL,
};
use crate::class_data;
use crate::dice::{DiceExpression, DicePool, DieType, Keep};
use crate::progression::{self, HpMethod, ProgressionError};
use crate::spellcasting;
use rand::Rng;
use thiserror::Error;

/// Method for determining ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbilityMethod {
    /// Standard array: 15, 14, 13, 12, 10, 8
    #[default]
    StandardArray,
    /// Point buy: 27 points, scores 8-15
    PointBuy,
    /// Roll 4d6, drop lowest, 6 times
    Rolled,
}

/// Standard array values.
pub const STANDARD_ARRAY: [u8; 6] = [15, 14, 13, 12, 10, 8];

/// Total points available for point buy.
pub const POINT_BUY_TOTAL: u8 = 27;

/// Point buy costs for each score value.
pub fn point_buy_cost(score: u8) -> Option<u8> {
    match score {
        8 => Some(0),
        9 => Some(1),
        10 => Some(2),
        11 => Some(3),
        12 => Some(4),
        13 => Some(5),
        14 => Some(7),
        15 => Some(9),
        _ => None,
    }
}

/// Error from character building.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("Character name is required")]
    MissingName,
    #[error("Race selection is required")]
    MissingRace,
    #[error("Class selection is required")]
    MissingClass,
    #[error("Ability scores are required")]
    MissingAbilityScores,
    #[error("Scores are not a permutation of the standard array")]
    InvalidStandardArray,
    #[error("Invalid point buy: {0}")]
    InvalidPointBuy(String),
    #[error("Expected {expected} skills, got {got}")]
    InvalidSkillCount { expected: usize, got: usize },
    #[error("Skill {0:?} is not available for this class")]
    SkillNotAvailable(Skill),
    #[error("Half-Elf requires two additional ability bonuses")]
    HalfElfNeedsBonusAbilities,
    #[error("{class} cannot know {got} cantrips at level 1 (max {max})")]
    TooManyCantrips {
        class: CharacterClass,
        got: usize,
        max: u8,
    },
    #[error("{class} cannot know {got} spells at level 1 (max {max})")]
    TooManySpells {
        class: CharacterClass,
        got: usize,
        max: u8,
    },
    #[error("{0} is not a 1st-level spell")]
    SpellLevelTooHigh(String),
    #[error("Level must be between 1 and 20, got {0}")]
    InvalidLevel(u8),
    #[error(transparent)]
    Progression(#[from] ProgressionError),
}

/// Builder for creating D&D 5e characters.
#[derive(Debug, Clone, Default)]
pub struct CharacterBuilder {
    name: Option<String>,
    race: Option<RaceType>,
    class: Option<CharacterClass>,
    background: Option<Background>,
    ability_scores: Option<AbilityScores>,
    ability_method: AbilityMethod,
    selected_skills: Option<Vec<Skill>>,
    /// For Half-Elf: two additional +1 ability bonuses
    half_elf_bonus_abilities: Option<[Ability; 2]>,
    cantrips: Vec<String>,
    spells: Vec<KnownSpell>,
    subclass: Option<String>,
}

impl CharacterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder with sensible defaults for a quick recruit: standard array
    /// assigned by class priority, the first class skills, Soldier background.
    pub fn quick(name: impl Into<String>, race: RaceType, class: CharacterClass) -> Self {
        let mut scores = AbilityScores::default();
        for (value, ability) in STANDARD_ARRAY.iter().zip(ability_priority(class)) {
            scores.set(ability, *value);
        }
        let data = class.data();
        let skills = data
            .skill_options
            .iter()
            .copied()
            .filter(|s| !Background::Soldier.skill_proficiencies().contains(s))
            .take(data.skill_count)
            .collect();
        let builder = Self::new()
            .name(name)
            .race(race)
            .class(class)
            .background(Background::Soldier)
            .standard_array(scores)
            .skills(skills);
        if race == RaceType::HalfElf {
            let [_, second, third, ..] = ability_priority(class);
            builder.half_elf_bonuses([second, third])
        } else {
            builder
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn race(mut self, race: RaceType) -> Self {
        self.race = Some(race);
        self
    }

    pub fn class(mut self, class: CharacterClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }

    /// Scores assigned from the standard array.
    pub fn standard_array(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = Some(scores);
        self.ability_method = AbilityMethod::StandardArray;
        self
    }

    /// Scores bought with 27 points.
    pub fn point_buy(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = Some(scores);
        self.ability_method = AbilityMethod::PointBuy;
        self
    }

    /// Scores from rolled values, taken as-is.
    pub fn rolled(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = Some(scores);
        self.ability_method = AbilityMethod::Rolled;
        self
    }

    /// Set the skills selected from class options.
    pub fn skills(mut self, skills: Vec<Skill>) -> Self {
        self.selected_skills = Some(skills);
        self
    }

    /// For Half-Elf: set the two abilities that get +1 bonus.
    pub fn half_elf_bonuses(mut self, abilities: [Ability; 2]) -> Self {
        self.half_elf_bonus_abilities = Some(abilities);
        self
    }

    pub fn cantrips(mut self, cantrips: Vec<String>) -> Self {
        self.cantrips = cantrips;
        self
    }

    /// Level-1 spells known (or the Wizard's starting spellbook).
    pub fn spells(mut self, spells: Vec<KnownSpell>) -> Self {
        self.spells = spells;
        self
    }

    /// Subclass for classes that pick one at level 1.
    pub fn subclass(mut self, subclass: impl Into<String>) -> Self {
        self.subclass = Some(subclass.into());
        self
    }

    fn validate_scores(&self, scores: &AbilityScores) -> Result<(), BuilderError> {
        match self.ability_method {
            AbilityMethod::StandardArray => {
                let mut values: Vec<u8> = Ability::all().iter().map(|a| scores.get(*a)).collect();
                values.sort_by(|a, b| b.cmp(a));
                if values != STANDARD_ARRAY {
                    return Err(BuilderError::InvalidStandardArray);
                }
            }
            AbilityMethod::PointBuy => {
                validate_point_buy(scores).map_err(BuilderError::InvalidPointBuy)?;
            }
            AbilityMethod::Rolled => {}
        }
        Ok(())
    }

    /// Build a level-1 character.
    pub fn build(self) -> Result<Character, BuilderError> {
        let name = self.name.clone().ok_or(BuilderError::MissingName)?;
        let race = self.race.ok_or(BuilderError::MissingRace)?;
        let class = self.class.ok_or(BuilderError::MissingClass)?;
        let background = self.background.unwrap_or(Background::Soldier);
        let mut ability_scores = self
            .ability_scores
            .clone()
            .ok_or(BuilderError::MissingAbilityScores)?;
        self.validate_scores(&ability_scores)?;

        race.apply_ability_bonuses(&mut ability_scores);
        if race == RaceType::HalfElf {
            let bonuses = self
                .half_elf_bonus_abilities
                .ok_or(BuilderError::HalfElfNeedsBonusAbilities)?;
            for ability in bonuses {
                ability_scores.increase(ability, 1);
            }
        }

        let data = class.data();
        let selected_skills = self.selected_skills.clone().unwrap_or_default();
        if selected_skills.len() != data.skill_count {
            return Err(BuilderError::InvalidSkillCount {
                expected: data.skill_count,
                got: selected_skills.len(),
            });
        }
        if let Some(skill) = selected_skills
            .iter()
            .find(|s| !data.skill_options.contains(s))
        {
            return Err(BuilderError::SkillNotAvailable(*skill));
        }

        let con_mod = ability_scores.modifier(Ability::Constitution);
        let hp = (class.hit_die().sides() as i32 + con_mod as i32).max(1);

        let mut character = Character::new(name, race, class);
        character.background = background;
        character.hit_points = HitPoints::new(hp);
        character.hit_dice = HitDice::new(class.hit_die(), 1);
        character.features = class_data::grant_features(class, 1, &ability_scores);
        character.ability_scores = ability_scores;
        character.saving_throw_proficiencies = data.saving_throws.into_iter().collect();
        for skill in selected_skills {
            character
                .skill_proficiencies
                .insert(skill, ProficiencyLevel::Proficient);
        }
        for skill in background.skill_proficiencies() {
            character
                .skill_proficiencies
                .entry(skill)
                .or_insert(ProficiencyLevel::Proficient);
        }

        if class_data::subclass_level(class) == 1 {
            match &self.subclass {
                Some(subclass) => character.subclass = Some(subclass.clone()),
                None => character
                    .pending_choices
                    .push(PendingChoice::Subclass { level: 1 }),
            }
        }

        self.init_spellcasting(&mut character)?;
        Ok(character)
    }

    fn init_spellcasting(&self, character: &mut Character) -> Result<(), BuilderError> {
        let class = character.class;
        spellcasting::recalculate_slots(character);
        let Some(casting) = character.spellcasting.as_mut() else {
            return Ok(());
        };

        let max_cantrips = spellcasting::cantrips_known(class, 1);
        if self.cantrips.len() > max_cantrips as usize {
            return Err(BuilderError::TooManyCantrips {
                class,
                got: self.cantrips.len(),
                max: max_cantrips,
            });
        }
        casting.cantrips_known = self.cantrips.clone();
        let missing_cantrips = max_cantrips - self.cantrips.len() as u8;

        let max_spells = spellcasting::spells_known(class, 1).unwrap_or(0);
        if self.spells.len() > max_spells as usize {
            return Err(BuilderError::TooManySpells {
                class,
                got: self.spells.len(),
                max: max_spells,
            });
        }
        if let Some(spell) = self.spells.iter().find(|s| s.level != 1) {
            return Err(BuilderError::SpellLevelTooHigh(spell.name.clone()));
        }
        casting.spells_known = self.spells.clone();
        let missing_spells = max_spells - self.spells.len() as u8;

        if missing_cantrips > 0 {
            character.pending_choices.push(PendingChoice::LearnCantrips {
                count: missing_cantrips,
            });
        }
        if missing_spells > 0 {
            character.pending_choices.push(PendingChoice::LearnSpells {
                count: missing_spells,
                max_level: 1,
            });
        }
        Ok(())
    }

    /// Build at level 1, then apply planned level-ups until `level`.
    pub fn build_at_level<R: Rng + ?Sized>(
        self,
        level: u8,
        hp_method: HpMethod,
        rng: &mut R,
    ) -> Result<Character, BuilderError> {
        if !(1..=MAX_LEVEL).contains(&level) {
            return Err(BuilderError::InvalidLevel(level));
        }
        let mut character = self.build()?;
        while character.level < level {
            let record = progression::plan_next_level(&character, hp_method, rng)?;
            progression::apply_level_up(&mut character, &record)?;
        }
        Ok(character)
    }
}

/// Order in which a class wants its abilities, best first.
pub fn ability_priority(class: CharacterClass) -> [Ability; 6] {
    use Ability::*;
    match class {
        CharacterClass::Barbarian => [Strength, Constitution, Dexterity, Wisdom, Charisma, Intelligence],
        CharacterClass::Bard => [Charisma, Dexterity, Constitution, Wisdom, Intelligence, Strength],
        CharacterClass::Cleric => [Wisdom, Constitution, Strength, Charisma, Dexterity, Intelligence],
        CharacterClass::Druid => [Wisdom, Constitution, Dexterity, Intelligence, Charisma, Strength],
        CharacterClass::Fighter => [Strength, Constitution, Dexterity, Wisdom, Charisma, Intelligence],
        CharacterClass::Monk => [Dexterity, Wisdom, Constitution, Strength, Intelligence, Charisma],
        CharacterClass::Paladin => [Strength, Charisma, Constitution, Wisdom, Dexterity, Intelligence],
        CharacterClass::Ranger => [Dexterity, Wisdom, Constitution, Strength, Intelligence, Charisma],
        CharacterClass::Rogue => [Dexterity, Constitution, Intelligence, Wisdom, Charisma, Strength],
        CharacterClass::Sorcerer => [Charisma, Constitution, Dexterity, Wisdom, Intelligence, Strength],
        CharacterClass::Warlock => [Charisma, Constitution, Dexterity, Wisdom, Intelligence, Strength],
        CharacterClass::Wizard => [Intelligence, Constitution, Dexterity, Wisdom, Charisma, Strength],
    }
}

/// Roll 4d6, drop lowest, for ability score generation.
pub fn roll_4d6_drop_lowest<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    let expr = DiceExpression::from_pool(DicePool::new(4, DieType::D6).keeping(Keep::Highest(3)));
    expr.roll(rng).total as u8
}

/// Roll a full set of ability scores (6 values), sorted descending.
pub fn roll_ability_scores<R: Rng + ?Sized>(rng: &mut R) -> [u8; 6] {
    let mut scores: [u8; 6] = std::array::from_fn(|_| roll_4d6_drop_lowest(rng));
    scores.sort_by(|a, b| b.cmp(a));
    scores
}

/// Validate point buy scores.
pub fn validate_point_buy(scores: &AbilityScores) -> Result<(), String> {
    let mut total_cost = 0u8;
    for ability in Ability::all() {
        let score = scores.get(ability);
        let cost = point_buy_cost(score).ok_or_else(|| {
            format!(
                "{} score {} is out of range (8-15)",
                ability.abbreviation(),
                score
            )
        })?;
        total_cost += cost;
    }
    if total_cost > POINT_BUY_TOTAL {
        return Err(format!(
            "Total point cost {total_cost} exceeds maximum {POINT_BUY_TOTAL}"
        ));
    }
    Ok(())
}
