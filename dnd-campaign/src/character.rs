//! D&D 5e character types.
//!
//! Everything a character sheet needs for progression bookkeeping: ability
//! scores, hit points and hit dice, class features with limited uses,
//! spellcasting state, inventory, and the pending choices a level-up leaves
//! behind.

use crate::dice::DieType;
use crate::progression::LevelUpRecord;
use crate::spellcasting::{self, CasterKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Highest character level.
pub const MAX_LEVEL: u8 = 20;

/// Ability score ceiling for improvements.
pub const MAX_ABILITY_SCORE: u8 = 20;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn standard_array() -> Self {
        Self::new(15, 14, 13, 12, 10, 8)
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    /// Raise a score by `amount`, never past 20. Returns the points actually added.
    pub fn increase(&mut self, ability: Ability, amount: u8) -> u8 {
        let current = self.get(ability);
        let new_value = current.saturating_add(amount).min(MAX_ABILITY_SCORE);
        self.set(ability, new_value);
        new_value.saturating_sub(current)
    }

    pub fn modifier(&self, ability: Ability) -> i8 {
        // floor division: 8-9 = -1, 10-11 = 0, 12-13 = +1
        (self.get(ability) as i8 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Skills
// ============================================================================

/// D&D 5e skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
    Athletics,
    Acrobatics,
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }
}

/// Proficiency level for skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProficiencyLevel {
    #[default]
    None,
    Proficient,
    Expertise,
}

// ============================================================================
// Classes, Races, Backgrounds
// ============================================================================

/// D&D character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub fn hit_die(&self) -> DieType {
        match self {
            CharacterClass::Barbarian => DieType::D12,
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => {
                DieType::D10
            }
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Monk
            | CharacterClass::Rogue
            | CharacterClass::Warlock => DieType::D8,
            CharacterClass::Sorcerer | CharacterClass::Wizard => DieType::D6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    pub fn caster_kind(&self) -> CasterKind {
        match self {
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Sorcerer
            | CharacterClass::Wizard => CasterKind::Full,
            CharacterClass::Paladin | CharacterClass::Ranger => CasterKind::Half,
            CharacterClass::Warlock => CasterKind::Pact,
            CharacterClass::Barbarian
            | CharacterClass::Fighter
            | CharacterClass::Monk
            | CharacterClass::Rogue => CasterKind::None,
        }
    }

    /// Returns the spellcasting ability for this class, if any.
    pub fn spellcasting_ability(&self) -> Option<Ability> {
        match self {
            CharacterClass::Bard
            | CharacterClass::Paladin
            | CharacterClass::Sorcerer
            | CharacterClass::Warlock => Some(Ability::Charisma),
            CharacterClass::Cleric | CharacterClass::Druid | CharacterClass::Ranger => {
                Some(Ability::Wisdom)
            }
            CharacterClass::Wizard => Some(Ability::Intelligence),
            _ => None,
        }
    }

    /// Get all character classes.
    pub fn all() -> &'static [CharacterClass] {
        &[
            CharacterClass::Barbarian,
            CharacterClass::Bard,
            CharacterClass::Cleric,
            CharacterClass::Druid,
            CharacterClass::Fighter,
            CharacterClass::Monk,
            CharacterClass::Paladin,
            CharacterClass::Ranger,
            CharacterClass::Rogue,
            CharacterClass::Sorcerer,
            CharacterClass::Warlock,
            CharacterClass::Wizard,
        ]
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// D&D 5e playable races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceType {
    Human,
    Elf,
    Dwarf,
    Halfling,
    HalfOrc,
    HalfElf,
    Tiefling,
    Gnome,
    Dragonborn,
}

impl RaceType {
    pub fn name(&self) -> &'static str {
        match self {
            RaceType::Human => "Human",
            RaceType::Elf => "Elf",
            RaceType::Dwarf => "Dwarf",
            RaceType::Halfling => "Halfling",
            RaceType::HalfOrc => "Half-Orc",
            RaceType::HalfElf => "Half-Elf",
            RaceType::Tiefling => "Tiefling",
            RaceType::Gnome => "Gnome",
            RaceType::Dragonborn => "Dragonborn",
        }
    }

    /// Apply fixed racial ability score bonuses. Half-Elf's two floating +1s
    /// are chosen in the character builder.
    pub fn apply_ability_bonuses(&self, scores: &mut AbilityScores) {
        let bonuses: &[(Ability, u8)] = match self {
            RaceType::Human => &[
                (Ability::Strength, 1),
                (Ability::Dexterity, 1),
                (Ability::Constitution, 1),
                (Ability::Intelligence, 1),
                (Ability::Wisdom, 1),
                (Ability::Charisma, 1),
            ],
            RaceType::Elf | RaceType::Halfling => &[(Ability::Dexterity, 2)],
            RaceType::Dwarf => &[(Ability::Constitution, 2)],
            RaceType::HalfOrc => &[(Ability::Strength, 2), (Ability::Constitution, 1)],
            RaceType::HalfElf => &[(Ability::Charisma, 2)],
            RaceType::Tiefling => &[(Ability::Charisma, 2), (Ability::Intelligence, 1)],
            RaceType::Gnome => &[(Ability::Intelligence, 2)],
            RaceType::Dragonborn => &[(Ability::Strength, 2), (Ability::Charisma, 1)],
        };
        for (ability, bonus) in bonuses {
            let current = scores.get(*ability);
            scores.set(*ability, current + bonus);
        }
    }

    pub fn base_speed(&self) -> u32 {
        match self {
            RaceType::Dwarf | RaceType::Halfling | RaceType::Gnome => 25,
            _ => 30,
        }
    }
}

impl fmt::Display for RaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// D&D 5e character backgrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Background {
    Acolyte,
    Criminal,
    FolkHero,
    Noble,
    Outlander,
    Sage,
    Soldier,
    Urchin,
}

impl Background {
    pub fn skill_proficiencies(&self) -> [Skill; 2] {
        match self {
            Background::Acolyte => [Skill::Insight, Skill::Religion],
            Background::Criminal => [Skill::Deception, Skill::Stealth],
            Background::FolkHero => [Skill::AnimalHandling, Skill::Survival],
            Background::Noble => [Skill::History, Skill::Persuasion],
            Background::Outlander => [Skill::Athletics, Skill::Survival],
            Background::Sage => [Skill::Arcana, Skill::History],
            Background::Soldier => [Skill::Athletics, Skill::Intimidation],
            Background::Urchin => [Skill::SleightOfHand, Skill::Stealth],
        }
    }
}

// ============================================================================
// Hit Points and Hit Dice
// ============================================================================

/// Hit points tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
    pub temporary: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
            temporary: 0,
        }
    }

    /// Temporary HP absorb damage first. Current HP never drops below 0.
    pub fn take_damage(&mut self, amount: i32) {
        let mut remaining = amount.max(0);
        let absorbed = remaining.min(self.temporary);
        self.temporary -= absorbed;
        remaining -= absorbed;
        self.current = (self.current - remaining).max(0);
    }

    /// Heal up to the maximum. Returns the HP actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let old = self.current;
        self.current = (self.current + amount.max(0)).min(self.maximum);
        self.current - old
    }

    /// Set current HP from an external report, clamped to `0..=maximum`.
    pub fn set_current(&mut self, value: i32) {
        self.current = value.clamp(0, self.maximum);
    }

    /// Raise maximum and current together (level-up, CON increase).
    pub fn raise_maximum(&mut self, amount: i32) {
        self.maximum += amount;
        self.current += amount;
    }

    pub fn restore_full(&mut self) {
        self.current = self.maximum;
        self.temporary = 0;
    }

    pub fn missing(&self) -> i32 {
        self.maximum - self.current
    }
}

/// Hit dice pool for a single-class character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDice {
    pub die: DieType,
    pub total: u8,
    pub remaining: u8,
}

impl HitDice {
    pub fn new(die: DieType, count: u8) -> Self {
        Self {
            die,
            total: count,
            remaining: count,
        }
    }

    /// Gain one hit die (level-up). The new die arrives unspent.
    pub fn add_one(&mut self) {
        self.total += 1;
        self.remaining += 1;
    }

    pub fn spend(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Long rest: regain half the total (minimum one).
    pub fn recover_half(&mut self) -> u8 {
        let to_recover = (self.total / 2).max(1);
        let before = self.remaining;
        self.remaining = (self.remaining + to_recover).min(self.total);
        self.remaining - before
    }
}

// ============================================================================
// Features
// ============================================================================

/// Class feature, racial trait, or feat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub source: String,
    /// Class level at which the feature was gained.
    pub level: u8,
    pub uses: Option<FeatureUses>,
}

impl Feature {
    pub fn new(name: impl Into<String>, source: impl Into<String>, level: u8) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            level,
            uses: None,
        }
    }

    pub fn with_uses(mut self, maximum: u8, recharge: RechargeType) -> Self {
        self.uses = Some(FeatureUses {
            current: maximum,
            maximum,
            recharge,
        });
        self
    }
}

/// Limited use tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureUses {
    pub current: u8,
    pub maximum: u8,
    pub recharge: RechargeType,
}

impl FeatureUses {
    /// Change the maximum; uses gained are immediately available, uses lost
    /// are taken from the current pool.
    pub fn rescale(&mut self, maximum: u8) {
        if maximum >= self.maximum {
            self.current = self.current.saturating_add(maximum - self.maximum);
        }
        self.maximum = maximum;
        self.current = self.current.min(maximum);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RechargeType {
    ShortRest,
    LongRest,
}

// ============================================================================
// Spellcasting
// ============================================================================

/// A spell the character knows or has prepared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownSpell {
    pub name: String,
    pub level: u8,
}

impl KnownSpell {
    pub fn new(name: impl Into<String>, level: u8) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

/// Spellcasting data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellcastingData {
    pub ability: Ability,
    pub cantrips_known: Vec<String>,
    /// Spells known (Bard, Sorcerer, Warlock, Ranger) or spellbook (Wizard).
    pub spells_known: Vec<KnownSpell>,
    pub spells_prepared: Vec<KnownSpell>,
    pub spell_slots: SpellSlots,
}

impl SpellcastingData {
    pub fn new(ability: Ability) -> Self {
        Self {
            ability,
            cantrips_known: Vec::new(),
            spells_known: Vec::new(),
            spells_prepared: Vec::new(),
            spell_slots: SpellSlots::new(),
        }
    }

    pub fn knows_spell(&self, name: &str) -> bool {
        self.spells_known
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn knows_cantrip(&self, name: &str) -> bool {
        self.cantrips_known
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Spell slot tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSlots {
    pub slots: [SlotInfo; 9],
}

impl SpellSlots {
    pub fn new() -> Self {
        Self {
            slots: [SlotInfo::default(); 9],
        }
    }

    pub fn get(&self, level: u8) -> Option<&SlotInfo> {
        if (1..=9).contains(&level) {
            self.slots.get(level as usize - 1)
        } else {
            None
        }
    }

    pub fn available(&self, level: u8) -> u8 {
        self.get(level).map(SlotInfo::available).unwrap_or(0)
    }

    pub fn use_slot(&mut self, level: u8) -> bool {
        if (1..=9).contains(&level) {
            let slot = &mut self.slots[level as usize - 1];
            if slot.available() > 0 {
                slot.used += 1;
                return true;
            }
        }
        false
    }

    pub fn recover_all(&mut self) {
        for slot in &mut self.slots {
            slot.used = 0;
        }
    }

    /// Replace slot totals, keeping expended slots expended where they still exist.
    pub fn set_totals(&mut self, totals: [u8; 9]) {
        for (slot, total) in self.slots.iter_mut().zip(totals) {
            slot.total = total;
            slot.used = slot.used.min(total);
        }
    }

    pub fn totals(&self) -> [u8; 9] {
        std::array::from_fn(|i| self.slots[i].total)
    }

    pub fn highest_level(&self) -> u8 {
        self.slots
            .iter()
            .rposition(|s| s.total > 0)
            .map(|idx| idx as u8 + 1)
            .unwrap_or(0)
    }
}

impl Default for SpellSlots {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub total: u8,
    pub used: u8,
}

impl SlotInfo {
    pub fn available(&self) -> u8 {
        self.total.saturating_sub(self.used)
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Weapon,
    Armor,
    Potion,
    Scroll,
    Ring,
    Wondrous,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    VeryRare,
    Legendary,
}

/// What happens when a consumable is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumableEffect {
    /// Healing potion - roll dice notation like "2d4+2"
    Healing { dice: String },
}

/// Inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub quantity: u32,
    pub item_type: ItemType,
    pub rarity: Rarity,
    pub consumable: Option<ConsumableEffect>,
}

impl Item {
    /// Only consumables stack; every permanent magic item is distinct.
    pub fn is_stackable(&self) -> bool {
        matches!(self.item_type, ItemType::Potion | ItemType::Scroll)
    }
}

/// Character or party inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<Item>,
    pub gold: u32,
}

impl Inventory {
    pub fn add_item(&mut self, item: Item) {
        if item.is_stackable() {
            if let Some(existing) = self.items.iter_mut().find(|i| i.name == item.name) {
                existing.quantity += item.quantity;
                return;
            }
        }
        self.items.push(item);
    }

    /// Remove `quantity` of an item (case-insensitive). Returns the removed
    /// item with the removed quantity, or None if there is not enough.
    pub fn take_item(&mut self, name: &str, quantity: u32) -> Option<Item> {
        let idx = self
            .items
            .iter()
            .position(|i| i.name.eq_ignore_ascii_case(name))?;
        if self.items[idx].quantity < quantity {
            return None;
        }
        self.items[idx].quantity -= quantity;
        let mut taken = self.items[idx].clone();
        taken.quantity = quantity;
        if self.items[idx].quantity == 0 {
            self.items.remove(idx);
        }
        Some(taken)
    }

    pub fn find_item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// Progression state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CharacterStatus {
    #[default]
    Alive,
    Dead,
}

/// A decision a level-up left for the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingChoice {
    /// +2 to one ability, +1 to two, or a feat. `level` is the level that granted it.
    AbilityScoreImprovement { level: u8 },
    Subclass { level: u8 },
    LearnCantrips { count: u8 },
    LearnSpells { count: u8, max_level: u8 },
}

// ============================================================================
// Character
// ============================================================================

/// A single-class D&D 5e character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub race: RaceType,
    pub background: Background,
    pub class: CharacterClass,
    pub subclass: Option<String>,

    pub level: u8,
    pub experience: u32,
    pub ability_scores: AbilityScores,

    pub hit_points: HitPoints,
    pub hit_dice: HitDice,
    pub speed: u32,

    pub features: Vec<Feature>,
    pub spellcasting: Option<SpellcastingData>,

    pub skill_proficiencies: HashMap<Skill, ProficiencyLevel>,
    pub saving_throw_proficiencies: HashSet<Ability>,

    pub inventory: Inventory,

    pub status: CharacterStatus,
    pub pending_choices: Vec<PendingChoice>,
    pub level_history: Vec<LevelUpRecord>,
}

impl Character {
    /// A bare level-1 character. Use `CharacterBuilder` for a rules-complete one.
    pub fn new(name: impl Into<String>, race: RaceType, class: CharacterClass) -> Self {
        let hit_die = class.hit_die();
        Self {
            id: CharacterId::new(),
            name: name.into(),
            race,
            background: Background::Soldier,
            class,
            subclass: None,
            level: 1,
            experience: 0,
            ability_scores: AbilityScores::default(),
            hit_points: HitPoints::new(hit_die.sides() as i32),
            hit_dice: HitDice::new(hit_die, 1),
            speed: race.base_speed(),
            features: Vec::new(),
            spellcasting: None,
            skill_proficiencies: HashMap::new(),
            saving_throw_proficiencies: HashSet::new(),
            inventory: Inventory::default(),
            status: CharacterStatus::Alive,
            pending_choices: Vec::new(),
            level_history: Vec::new(),
        }
    }

    pub fn proficiency_bonus(&self) -> i8 {
        match self.level {
            0..=4 => 2,
            5..=8 => 3,
            9..=12 => 4,
            13..=16 => 5,
            _ => 6,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i8 {
        self.ability_scores.modifier(ability)
    }

    pub fn is_alive(&self) -> bool {
        self.status == CharacterStatus::Alive
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn feature_mut(&mut self, name: &str) -> Option<&mut Feature> {
        self.features
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.feature(name).is_some()
    }

    /// Highest spell level this character can cast (0 for non-casters).
    pub fn max_spell_level(&self) -> u8 {
        spellcasting::max_spell_level(self.class, self.level)
    }

    pub fn has_pending_choices(&self) -> bool {
        !self.pending_choices.is_empty()
    }

    pub fn spell_save_dc(&self) -> Option<i8> {
        let casting = self.spellcasting.as_ref()?;
        Some(8 + self.proficiency_bonus() + self.modifier(casting.ability))
    }
}
