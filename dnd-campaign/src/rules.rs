//! Campaign rules engine with an Intent/Effect pipeline.
//!
//! 1. A caller submits a `CampaignIntent` (what the table wants to happen)
//! 2. `CampaignEngine::resolve` validates it against the gauntlet and rolls
//!    every die it needs, producing `Effect`s; it never mutates
//! 3. `commit` applies the effects to a copy and returns the new state only
//!    if every effect applied, with `version` bumped
//!
//! Effects carry their random results (hit die rolls, planned level-ups,
//! treasure), so applying them is deterministic.

use crate::character::{
    Character, CharacterClass, CharacterId, ConsumableEffect, Item, KnownSpell, RaceType,
    RechargeType,
};
use crate::character_builder::{BuilderError, CharacterBuilder};
use crate::class_data;
use crate::dice::{self, DiceError, RollResult};
use crate::encounter::{self, Difficulty, EncounterError, EncounterGenerator, MonsterGroup};
use crate::gauntlet::{
    EncounterOutcome, EncounterRecord, EncounterStatus, FallenCharacter, Gauntlet, GauntletPhase,
    XpMode,
};
use crate::progression::{self, AsiChoice, LevelUpRecord, ProgressionError};
use crate::spellcasting::{self, SpellError};
use crate::treasure::{self, Tier};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from resolving or applying campaign intents.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CampaignError {
    #[error("The gauntlet is over ({0})")]
    GauntletOver(GauntletPhase),
    #[error("Cannot {action} while {phase}")]
    WrongPhase {
        action: &'static str,
        phase: GauntletPhase,
    },
    #[error("The party has no members")]
    EmptyParty,
    #[error("The party is full ({0} members)")]
    PartyFull(usize),
    #[error("Encounter {0} was already resolved")]
    EncounterAlreadyResolved(usize),
    #[error("Expected encounter {expected}, got {got}")]
    EncounterOutOfOrder { expected: usize, got: usize },
    #[error("No encounter {0}")]
    NoSuchEncounter(usize),
    #[error("Unknown character {0}")]
    UnknownCharacter(CharacterId),
    #[error("{0} is dead")]
    CharacterDead(String),
    #[error("The party already took a short rest at this camp")]
    ShortRestAlreadyTaken,
    #[error("No long rests remaining")]
    NoLongRestsRemaining,
    #[error("Need {needed} gold, the stash has {available}")]
    InsufficientGold { needed: u32, available: u32 },
    #[error("No {0} available")]
    ItemNotFound(String),
    #[error("{0} is not a healing potion")]
    NotAPotion(String),
    #[error("{name} has only {available} hit dice")]
    NotEnoughHitDice { name: String, available: u8 },
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),
    #[error(transparent)]
    Progression(#[from] ProgressionError),
    #[error(transparent)]
    Spell(#[from] SpellError),
    #[error(transparent)]
    Encounter(#[from] EncounterError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Dice(#[from] DiceError),
}

/// Something the table wants to happen to a gauntlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CampaignIntent {
    /// Leave recruiting and make camp before the first encounter.
    Start,
    /// Start the next encounter. Monsters are generated when not given.
    BeginEncounter {
        index: usize,
        monsters: Option<Vec<MonsterGroup>>,
    },
    /// Report how the active encounter went.
    ResolveEncounter {
        index: usize,
        outcome: EncounterOutcome,
    },
    /// Hit dice to spend per character.
    ShortRest { hit_dice: BTreeMap<CharacterId, u8> },
    LongRest,
    Recruit {
        name: String,
        race: RaceType,
        class: CharacterClass,
    },
    /// Move one item from the stash to a character.
    ClaimItem {
        character_id: CharacterId,
        item: String,
    },
    /// Drink a healing potion from the character's pack, or the stash.
    UsePotion {
        character_id: CharacterId,
        potion: String,
    },
    /// XP granted outside an encounter.
    AwardExperience {
        character_id: CharacterId,
        amount: u32,
    },
    ApplyAsi {
        character_id: CharacterId,
        choice: AsiChoice,
    },
    ChooseSubclass {
        character_id: CharacterId,
        subclass: String,
    },
    LearnCantrips {
        character_id: CharacterId,
        cantrips: Vec<String>,
    },
    LearnSpells {
        character_id: CharacterId,
        spells: Vec<KnownSpell>,
    },
    PrepareSpells {
        character_id: CharacterId,
        spells: Vec<KnownSpell>,
    },
    /// Spend a slot outside an encounter.
    CastSpell {
        character_id: CharacterId,
        slot_level: u8,
    },
    Abandon,
}

/// A concrete state change, with every random result already decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    PhaseChanged {
        from: GauntletPhase,
        to: GauntletPhase,
    },
    EncounterStarted {
        index: usize,
        difficulty: Difficulty,
        monsters: Vec<MonsterGroup>,
    },
    HpSet {
        character_id: CharacterId,
        hp: i32,
    },
    SlotsExpended {
        character_id: CharacterId,
        levels: Vec<u8>,
    },
    CharacterDied {
        character_id: CharacterId,
        encounter: usize,
        cause: String,
    },
    EncounterResolved {
        index: usize,
        victory: bool,
        xp_each: u32,
        gold: u32,
    },
    ExperienceGained {
        character_id: CharacterId,
        amount: u32,
    },
    LeveledUp {
        character_id: CharacterId,
        record: LevelUpRecord,
    },
    GoldAwarded {
        character_id: CharacterId,
        amount: u32,
    },
    StashGoldAdded {
        amount: u32,
    },
    StashGoldSpent {
        amount: u32,
    },
    ItemStashed {
        item: Item,
    },
    ItemClaimed {
        character_id: CharacterId,
        item: String,
    },
    HitDieSpent {
        character_id: CharacterId,
        roll: u32,
        healing: i32,
    },
    ShortRestTaken,
    LongRestTaken,
    PotionConsumed {
        character_id: CharacterId,
        potion: String,
        from_stash: bool,
        roll: RollResult,
        healing: i32,
    },
    MemberRecruited {
        character: Box<Character>,
        cost: u32,
    },
    AsiApplied {
        character_id: CharacterId,
        choice: AsiChoice,
    },
    SubclassChosen {
        character_id: CharacterId,
        subclass: String,
    },
    CantripsLearned {
        character_id: CharacterId,
        cantrips: Vec<String>,
    },
    SpellsLearned {
        character_id: CharacterId,
        spells: Vec<KnownSpell>,
    },
    SpellsPrepared {
        character_id: CharacterId,
        spells: Vec<KnownSpell>,
    },
}

/// The result of resolving an intent.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub narrative: String,
    pub effects: Vec<Effect>,
}

impl Resolution {
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Level-ups among the effects.
    pub fn level_ups(&self) -> impl Iterator<Item = (&CharacterId, &LevelUpRecord)> {
        self.effects.iter().filter_map(|e| match e {
            Effect::LeveledUp {
                character_id,
                record,
            } => Some((character_id, record)),
            _ => None,
        })
    }
}

const CHOICE_PHASES: &[GauntletPhase] = &[GauntletPhase::Recruiting, GauntletPhase::Camp];

/// Resolves campaign intents into effects.
#[derive(Debug, Clone, Default)]
pub struct CampaignEngine {
    generator: EncounterGenerator,
}

impl CampaignEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an intent and produce effects. Never mutates.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        gauntlet: &Gauntlet,
        intent: CampaignIntent,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        debug!(gauntlet = %gauntlet.id, phase = %gauntlet.phase, ?intent, "resolving intent");
        match intent {
            CampaignIntent::Start => self.resolve_start(gauntlet),
            CampaignIntent::BeginEncounter { index, monsters } => {
                self.resolve_begin_encounter(gauntlet, index, monsters, rng)
            }
            CampaignIntent::ResolveEncounter { index, outcome } => {
                self.resolve_encounter(gauntlet, index, &outcome, rng)
            }
            CampaignIntent::ShortRest { hit_dice } => {
                self.resolve_short_rest(gauntlet, &hit_dice, rng)
            }
            CampaignIntent::LongRest => self.resolve_long_rest(gauntlet),
            CampaignIntent::Recruit { name, race, class } => {
                self.resolve_recruit(gauntlet, name, race, class, rng)
            }
            CampaignIntent::ClaimItem { character_id, item } => {
                self.resolve_claim_item(gauntlet, character_id, item)
            }
            CampaignIntent::UsePotion {
                character_id,
                potion,
            } => self.resolve_use_potion(gauntlet, character_id, &potion, rng),
            CampaignIntent::AwardExperience {
                character_id,
                amount,
            } => {
                require_phase(gauntlet, CHOICE_PHASES, "award experience")?;
                let character = member(gauntlet, character_id)?;
                let effects = plan_experience(gauntlet, character, amount, rng)?;
                Ok(Resolution::new(format!("{} gains {amount} XP.", character.name))
                    .with_effects(effects))
            }
            CampaignIntent::ApplyAsi {
                character_id,
                choice,
            } => {
                let character = choice_target(gauntlet, character_id, "improve abilities")?;
                progression::apply_asi(&mut character.clone(), &choice)?;
                Ok(
                    Resolution::new(format!("{} improves.", character.name)).with_effect(
                        Effect::AsiApplied {
                            character_id,
                            choice,
                        },
                    ),
                )
            }
            CampaignIntent::ChooseSubclass {
                character_id,
                subclass,
            } => {
                let character = choice_target(gauntlet, character_id, "choose a subclass")?;
                progression::choose_subclass(&mut character.clone(), &subclass)?;
                Ok(Resolution::new(format!(
                    "{} follows the path of the {subclass}.",
                    character.name
                ))
                .with_effect(Effect::SubclassChosen {
                    character_id,
                    subclass,
                }))
            }
            CampaignIntent::LearnCantrips {
                character_id,
                cantrips,
            } => {
                let character = choice_target(gauntlet, character_id, "learn cantrips")?;
                spellcasting::learn_cantrips(&mut character.clone(), &cantrips)?;
                Ok(Resolution::new(format!(
                    "{} learns {}.",
                    character.name,
                    cantrips.join(", ")
                ))
                .with_effect(Effect::CantripsLearned {
                    character_id,
                    cantrips,
                }))
            }
            CampaignIntent::LearnSpells {
                character_id,
                spells,
            } => {
                let character = choice_target(gauntlet, character_id, "learn spells")?;
                spellcasting::learn_spells(&mut character.clone(), &spells)?;
                Ok(Resolution::new(format!(
                    "{} learns {} spell(s).",
                    character.name,
                    spells.len()
                ))
                .with_effect(Effect::SpellsLearned {
                    character_id,
                    spells,
                }))
            }
            CampaignIntent::PrepareSpells {
                character_id,
                spells,
            } => {
                let character = choice_target(gauntlet, character_id, "prepare spells")?;
                spellcasting::prepare_spells(&mut character.clone(), spells.clone())?;
                Ok(Resolution::new(format!(
                    "{} prepares {} spell(s).",
                    character.name,
                    spells.len()
                ))
                .with_effect(Effect::SpellsPrepared {
                    character_id,
                    spells,
                }))
            }
            CampaignIntent::CastSpell {
                character_id,
                slot_level,
            } => {
                require_phase(gauntlet, &[GauntletPhase::Camp], "cast spells")?;
                let character = member(gauntlet, character_id)?;
                spellcasting::expend_slot(&mut character.clone(), slot_level)?;
                Ok(Resolution::new(format!(
                    "{} spends a level {slot_level} slot.",
                    character.name
                ))
                .with_effect(Effect::SlotsExpended {
                    character_id,
                    levels: vec![slot_level],
                }))
            }
            CampaignIntent::Abandon => {
                if gauntlet.phase.is_terminal() {
                    return Err(CampaignError::GauntletOver(gauntlet.phase));
                }
                Ok(
                    Resolution::new("The party abandons the gauntlet.").with_effect(
                        Effect::PhaseChanged {
                            from: gauntlet.phase,
                            to: GauntletPhase::Abandoned,
                        },
                    ),
                )
            }
        }
    }

    fn resolve_start(&self, gauntlet: &Gauntlet) -> Result<Resolution, CampaignError> {
        require_phase(gauntlet, &[GauntletPhase::Recruiting], "start")?;
        if gauntlet.party.is_empty() {
            return Err(CampaignError::EmptyParty);
        }
        Ok(Resolution::new(format!(
            "{} adventurers enter {}.",
            gauntlet.party.len(),
            gauntlet.name
        ))
        .with_effect(Effect::PhaseChanged {
            from: GauntletPhase::Recruiting,
            to: GauntletPhase::Camp,
        }))
    }

    fn resolve_begin_encounter<R: Rng + ?Sized>(
        &self,
        gauntlet: &Gauntlet,
        index: usize,
        monsters: Option<Vec<MonsterGroup>>,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        if index < gauntlet.current_encounter {
            return Err(CampaignError::EncounterAlreadyResolved(index));
        }
        require_phase(gauntlet, &[GauntletPhase::Camp], "begin an encounter")?;
        if index != gauntlet.current_encounter {
            return Err(CampaignError::EncounterOutOfOrder {
                expected: gauntlet.current_encounter,
                got: index,
            });
        }
        let difficulty = *gauntlet
            .plan
            .get(index)
            .ok_or(CampaignError::NoSuchEncounter(index))?;

        let monsters = match monsters {
            Some(groups) => {
                if groups.is_empty() {
                    return Err(CampaignError::InvalidIntent(
                        "an encounter needs monsters".into(),
                    ));
                }
                encounter::validate_groups(&groups)?;
                groups
            }
            None => self.generator.generate(
                &gauntlet.party_levels(),
                difficulty,
                &gauntlet.monster_pool,
                rng,
            )?,
        };

        let names: Vec<String> = monsters.iter().map(|g| g.to_string()).collect();
        let label = if gauntlet.is_boss(index) {
            "The boss"
        } else {
            "An encounter"
        };
        Ok(Resolution::new(format!(
            "{label} begins ({difficulty}): {}.",
            names.join(", ")
        ))
        .with_effect(Effect::EncounterStarted {
            index,
            difficulty,
            monsters,
        })
        .with_effect(Effect::PhaseChanged {
            from: GauntletPhase::Camp,
            to: GauntletPhase::InEncounter,
        }))
    }

    fn resolve_encounter<R: Rng + ?Sized>(
        &self,
        gauntlet: &Gauntlet,
        index: usize,
        outcome: &EncounterOutcome,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        if index < gauntlet.current_encounter
            || gauntlet.encounter(index).is_some_and(EncounterRecord::is_resolved)
        {
            return Err(CampaignError::EncounterAlreadyResolved(index));
        }
        require_phase(gauntlet, &[GauntletPhase::InEncounter], "resolve an encounter")?;
        if index != gauntlet.current_encounter {
            return Err(CampaignError::EncounterOutOfOrder {
                expected: gauntlet.current_encounter,
                got: index,
            });
        }
        let record = gauntlet
            .encounter(index)
            .ok_or(CampaignError::NoSuchEncounter(index))?;

        let mut casualties: Vec<CharacterId> = Vec::new();
        for id in &outcome.casualties {
            member(gauntlet, *id)?;
            if !casualties.contains(id) {
                casualties.push(*id);
            }
        }
        for id in outcome.hp_remaining.keys() {
            member(gauntlet, *id)?;
        }
        for (id, levels) in &outcome.slots_expended {
            let mut scratch = member(gauntlet, *id)?.clone();
            for level in levels {
                spellcasting::expend_slot(&mut scratch, *level)?;
            }
        }

        let mut effects = Vec::new();
        for (id, hp) in &outcome.hp_remaining {
            if !casualties.contains(id) {
                effects.push(Effect::HpSet {
                    character_id: *id,
                    hp: *hp,
                });
            }
        }
        for (id, levels) in &outcome.slots_expended {
            if !casualties.contains(id) && !levels.is_empty() {
                effects.push(Effect::SlotsExpended {
                    character_id: *id,
                    levels: levels.clone(),
                });
            }
        }
        let foes: Vec<String> = record.monsters.iter().map(|g| g.template.name.clone()).collect();
        for id in &casualties {
            effects.push(Effect::CharacterDied {
                character_id: *id,
                encounter: index,
                cause: format!("Slain fighting {}", foes.join(", ")),
            });
        }

        let survivors: Vec<&Character> = gauntlet
            .party
            .iter()
            .filter(|c| !casualties.contains(&c.id))
            .collect();

        if !outcome.victory || survivors.is_empty() {
            info!(gauntlet = %gauntlet.id, index, "party defeated");
            effects.push(Effect::EncounterResolved {
                index,
                victory: false,
                xp_each: 0,
                gold: 0,
            });
            effects.push(Effect::PhaseChanged {
                from: GauntletPhase::InEncounter,
                to: GauntletPhase::Defeated,
            });
            return Ok(
                Resolution::new(format!("The party falls in encounter {}.", index + 1))
                    .with_effects(effects),
            );
        }

        let xp_each = match gauntlet.rules.xp_mode {
            XpMode::Experience => encounter::raw_xp(&record.monsters) / survivors.len() as u32,
            XpMode::Milestone => 0,
        };
        let mut loot = treasure::roll_individual(&record.monsters, rng);
        if gauntlet.is_boss(index) {
            let hoard = treasure::roll_hoard(Tier::for_level(gauntlet.mean_party_level()), rng);
            loot.gold += hoard.gold;
            loot.items.extend(hoard.items);
        }
        let split = treasure::split_gold(loot.gold, survivors.len());

        effects.push(Effect::EncounterResolved {
            index,
            victory: true,
            xp_each,
            gold: loot.gold,
        });
        for survivor in &survivors {
            match gauntlet.rules.xp_mode {
                XpMode::Experience => {
                    effects.extend(plan_experience(gauntlet, survivor, xp_each, rng)?);
                }
                XpMode::Milestone => {
                    if let Some(record) =
                        progression::plan_milestone_level(survivor, gauntlet.rules.hp_method, rng)?
                    {
                        effects.push(Effect::LeveledUp {
                            character_id: survivor.id,
                            record,
                        });
                    }
                }
            }
            if split.per_member > 0 {
                effects.push(Effect::GoldAwarded {
                    character_id: survivor.id,
                    amount: split.per_member,
                });
            }
        }
        if split.remainder > 0 {
            effects.push(Effect::StashGoldAdded {
                amount: split.remainder,
            });
        }
        for item in loot.items {
            effects.push(Effect::ItemStashed { item });
        }

        let next = if gauntlet.is_boss(index) {
            GauntletPhase::Victorious
        } else {
            GauntletPhase::Camp
        };
        effects.push(Effect::PhaseChanged {
            from: GauntletPhase::InEncounter,
            to: next,
        });
        info!(
            gauntlet = %gauntlet.id,
            index,
            survivors = survivors.len(),
            xp_each,
            gold = loot.gold,
            "encounter won"
        );

        let narrative = if next == GauntletPhase::Victorious {
            format!("The boss is slain! {} gold recovered.", loot.gold)
        } else {
            format!(
                "Victory in encounter {}: {xp_each} XP each, {} gold.",
                index + 1,
                loot.gold
            )
        };
        Ok(Resolution::new(narrative).with_effects(effects))
    }

    fn resolve_short_rest<R: Rng + ?Sized>(
        &self,
        gauntlet: &Gauntlet,
        hit_dice: &BTreeMap<CharacterId, u8>,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        require_phase(gauntlet, &[GauntletPhase::Camp], "take a short rest")?;
        if gauntlet.short_rest_taken {
            return Err(CampaignError::ShortRestAlreadyTaken);
        }

        let mut effects = Vec::new();
        for (id, count) in hit_dice {
            let character = member(gauntlet, *id)?;
            if *count > character.hit_dice.remaining {
                return Err(CampaignError::NotEnoughHitDice {
                    name: character.name.clone(),
                    available: character.hit_dice.remaining,
                });
            }
            let con = character.modifier(crate::character::Ability::Constitution) as i32;
            for _ in 0..*count {
                let roll = character.hit_dice.die.roll(rng);
                effects.push(Effect::HitDieSpent {
                    character_id: *id,
                    roll,
                    healing: (roll as i32 + con).max(0),
                });
            }
        }
        effects.push(Effect::ShortRestTaken);
        Ok(Resolution::new("The party takes a short rest.").with_effects(effects))
    }

    fn resolve_long_rest(&self, gauntlet: &Gauntlet) -> Result<Resolution, CampaignError> {
        require_phase(gauntlet, &[GauntletPhase::Camp], "take a long rest")?;
        if gauntlet.long_rests_remaining == 0 {
            return Err(CampaignError::NoLongRestsRemaining);
        }
        Ok(Resolution::new(format!(
            "The party takes a long rest ({} left).",
            gauntlet.long_rests_remaining - 1
        ))
        .with_effect(Effect::LongRestTaken))
    }

    fn resolve_recruit<R: Rng + ?Sized>(
        &self,
        gauntlet: &Gauntlet,
        name: String,
        race: RaceType,
        class: CharacterClass,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        require_phase(gauntlet, CHOICE_PHASES, "recruit")?;
        if name.trim().is_empty() {
            return Err(CampaignError::InvalidIntent("a recruit needs a name".into()));
        }
        if gauntlet.party.len() >= gauntlet.rules.max_party_size {
            return Err(CampaignError::PartyFull(gauntlet.party.len()));
        }
        let level = gauntlet.mean_party_level();
        let cost = match gauntlet.phase {
            GauntletPhase::Recruiting => 0,
            _ => gauntlet.rules.recruit_cost_per_level * level as u32,
        };
        if cost > gauntlet.stash.gold {
            return Err(CampaignError::InsufficientGold {
                needed: cost,
                available: gauntlet.stash.gold,
            });
        }

        let recruit = CharacterBuilder::quick(name.trim(), race, class).build_at_level(
            level,
            gauntlet.rules.hp_method,
            rng,
        )?;
        info!(gauntlet = %gauntlet.id, name = %recruit.name, level, cost, "recruited");
        let narrative = format!("{} the level {level} {class} joins the party.", recruit.name);
        let mut resolution = Resolution::new(narrative);
        if cost > 0 {
            resolution = resolution.with_effect(Effect::StashGoldSpent { amount: cost });
        }
        Ok(resolution.with_effect(Effect::MemberRecruited {
            character: Box::new(recruit),
            cost,
        }))
    }

    fn resolve_claim_item(
        &self,
        gauntlet: &Gauntlet,
        character_id: CharacterId,
        item: String,
    ) -> Result<Resolution, CampaignError> {
        require_phase(gauntlet, &[GauntletPhase::Camp], "claim items")?;
        let character = member(gauntlet, character_id)?;
        let found = gauntlet
            .stash
            .find_item(&item)
            .ok_or_else(|| CampaignError::ItemNotFound(item.clone()))?;
        Ok(
            Resolution::new(format!("{} takes the {}.", character.name, found.name)).with_effect(
                Effect::ItemClaimed {
                    character_id,
                    item: found.name.clone(),
                },
            ),
        )
    }

    fn resolve_use_potion<R: Rng + ?Sized>(
        &self,
        gauntlet: &Gauntlet,
        character_id: CharacterId,
        potion: &str,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        require_phase(gauntlet, &[GauntletPhase::Camp], "drink potions")?;
        let character = member(gauntlet, character_id)?;
        let (item, from_stash) = match character.inventory.find_item(potion) {
            Some(item) => (item, false),
            None => (
                gauntlet
                    .stash
                    .find_item(potion)
                    .ok_or_else(|| CampaignError::ItemNotFound(potion.to_string()))?,
                true,
            ),
        };
        let Some(ConsumableEffect::Healing { dice: notation }) = &item.consumable else {
            return Err(CampaignError::NotAPotion(item.name.clone()));
        };
        let roll = dice::roll(notation, rng)?;
        let healing = roll.total.max(0);
        Ok(Resolution::new(format!(
            "{} drinks a {} and heals {healing}.",
            character.name, item.name
        ))
        .with_effect(Effect::PotionConsumed {
            character_id,
            potion: item.name.clone(),
            from_stash,
            roll,
            healing,
        }))
    }
}

fn require_phase(
    gauntlet: &Gauntlet,
    allowed: &[GauntletPhase],
    action: &'static str,
) -> Result<(), CampaignError> {
    if gauntlet.phase.is_terminal() {
        return Err(CampaignError::GauntletOver(gauntlet.phase));
    }
    if !allowed.contains(&gauntlet.phase) {
        return Err(CampaignError::WrongPhase {
            action,
            phase: gauntlet.phase,
        });
    }
    Ok(())
}

/// A living party member, or why there isn't one.
fn member(gauntlet: &Gauntlet, id: CharacterId) -> Result<&Character, CampaignError> {
    if let Some(character) = gauntlet.member(id) {
        return Ok(character);
    }
    match gauntlet.fallen_member(id) {
        Some(fallen) => Err(CampaignError::CharacterDead(fallen.character.name.clone())),
        None => Err(CampaignError::UnknownCharacter(id)),
    }
}

fn choice_target<'a>(
    gauntlet: &'a Gauntlet,
    id: CharacterId,
    action: &'static str,
) -> Result<&'a Character, CampaignError> {
    require_phase(gauntlet, CHOICE_PHASES, action)?;
    member(gauntlet, id)
}

fn plan_experience<R: Rng + ?Sized>(
    gauntlet: &Gauntlet,
    character: &Character,
    amount: u32,
    rng: &mut R,
) -> Result<Vec<Effect>, CampaignError> {
    if amount == 0 {
        return Ok(Vec::new());
    }
    let new_xp = character.experience.saturating_add(amount);
    let records =
        progression::plan_level_ups(character, new_xp, gauntlet.rules.hp_method, rng)?;
    let mut effects = vec![Effect::ExperienceGained {
        character_id: character.id,
        amount,
    }];
    effects.extend(records.into_iter().map(|record| Effect::LeveledUp {
        character_id: character.id,
        record,
    }));
    Ok(effects)
}

fn living_mut(gauntlet: &mut Gauntlet, id: CharacterId) -> Result<&mut Character, CampaignError> {
    gauntlet
        .member_mut(id)
        .ok_or(CampaignError::UnknownCharacter(id))
}

/// Apply effects in order. Stops at the first one that fails; callers that
/// need all-or-nothing should apply to a copy (see `commit`).
pub fn apply_effects(gauntlet: &mut Gauntlet, effects: &[Effect]) -> Result<(), CampaignError> {
    for effect in effects {
        apply_effect(gauntlet, effect)?;
    }
    Ok(())
}

/// Apply a single effect.
pub fn apply_effect(gauntlet: &mut Gauntlet, effect: &Effect) -> Result<(), CampaignError> {
    match effect {
        Effect::PhaseChanged { to, .. } => {
            gauntlet.phase = *to;
        }
        Effect::EncounterStarted {
            index,
            difficulty,
            monsters,
        } => {
            gauntlet.encounters.retain(|e| e.index != *index);
            gauntlet.encounters.push(EncounterRecord {
                index: *index,
                difficulty: *difficulty,
                monsters: monsters.clone(),
                status: EncounterStatus::Active,
                xp_each: 0,
                gold: 0,
                casualties: Vec::new(),
            });
        }
        Effect::HpSet { character_id, hp } => {
            living_mut(gauntlet, *character_id)?
                .hit_points
                .set_current(*hp);
        }
        Effect::SlotsExpended {
            character_id,
            levels,
        } => {
            let character = living_mut(gauntlet, *character_id)?;
            for level in levels {
                spellcasting::expend_slot(character, *level)?;
            }
        }
        Effect::CharacterDied {
            character_id,
            encounter,
            cause,
        } => {
            let idx = gauntlet
                .party
                .iter()
                .position(|c| c.id == *character_id)
                .ok_or(CampaignError::UnknownCharacter(*character_id))?;
            let mut character = gauntlet.party.remove(idx);
            character.status = crate::character::CharacterStatus::Dead;
            character.hit_points.set_current(0);
            warn!(gauntlet = %gauntlet.id, name = %character.name, encounter, "character died");
            if let Some(record) = gauntlet.encounter_mut(*encounter) {
                record.casualties.push(character.name.clone());
            }
            gauntlet.fallen.push(FallenCharacter {
                character,
                encounter: *encounter,
                cause: cause.clone(),
            });
        }
        Effect::EncounterResolved {
            index,
            victory,
            xp_each,
            gold,
        } => {
            let record = gauntlet
                .encounter_mut(*index)
                .ok_or(CampaignError::NoSuchEncounter(*index))?;
            if record.is_resolved() {
                return Err(CampaignError::EncounterAlreadyResolved(*index));
            }
            record.status = if *victory {
                EncounterStatus::Won
            } else {
                EncounterStatus::Lost
            };
            record.xp_each = *xp_each;
            record.gold = *gold;
            gauntlet.current_encounter = index + 1;
            gauntlet.short_rest_taken = false;
        }
        Effect::ExperienceGained {
            character_id,
            amount,
        } => {
            let character = living_mut(gauntlet, *character_id)?;
            character.experience = character.experience.saturating_add(*amount);
        }
        Effect::LeveledUp {
            character_id,
            record,
        } => {
            let character = living_mut(gauntlet, *character_id)?;
            progression::apply_level_up(character, record)?;
            info!(name = %character.name, level = record.level, hp_gained = record.hp_gained, "level up");
        }
        Effect::GoldAwarded {
            character_id,
            amount,
        } => {
            let character = living_mut(gauntlet, *character_id)?;
            character.inventory.gold = character.inventory.gold.saturating_add(*amount);
        }
        Effect::StashGoldAdded { amount } => {
            gauntlet.stash.gold = gauntlet.stash.gold.saturating_add(*amount);
        }
        Effect::StashGoldSpent { amount } => {
            gauntlet.stash.gold = gauntlet.stash.gold.checked_sub(*amount).ok_or(
                CampaignError::InsufficientGold {
                    needed: *amount,
                    available: gauntlet.stash.gold,
                },
            )?;
        }
        Effect::ItemStashed { item } => {
            gauntlet.stash.add_item(item.clone());
        }
        Effect::ItemClaimed { character_id, item } => {
            living_mut(gauntlet, *character_id)?;
            let taken = gauntlet
                .stash
                .take_item(item, 1)
                .ok_or_else(|| CampaignError::ItemNotFound(item.clone()))?;
            living_mut(gauntlet, *character_id)?
                .inventory
                .add_item(taken);
        }
        Effect::HitDieSpent {
            character_id,
            healing,
            ..
        } => {
            let character = living_mut(gauntlet, *character_id)?;
            if !character.hit_dice.spend() {
                return Err(CampaignError::NotEnoughHitDice {
                    name: character.name.clone(),
                    available: 0,
                });
            }
            character.hit_points.heal(*healing);
        }
        Effect::ShortRestTaken => {
            gauntlet.short_rest_taken = true;
            for character in &mut gauntlet.party {
                class_data::recharge_features(character, RechargeType::ShortRest);
                spellcasting::restore_short_rest(character);
            }
        }
        Effect::LongRestTaken => {
            gauntlet.long_rests_remaining = gauntlet
                .long_rests_remaining
                .checked_sub(1)
                .ok_or(CampaignError::NoLongRestsRemaining)?;
            for character in &mut gauntlet.party {
                character.hit_points.restore_full();
                character.hit_dice.recover_half();
                spellcasting::restore_all(character);
                class_data::recharge_features(character, RechargeType::LongRest);
            }
        }
        Effect::PotionConsumed {
            character_id,
            potion,
            from_stash,
            healing,
            ..
        } => {
            let taken = if *from_stash {
                gauntlet.stash.take_item(potion, 1)
            } else {
                living_mut(gauntlet, *character_id)?
                    .inventory
                    .take_item(potion, 1)
            };
            if taken.is_none() {
                return Err(CampaignError::ItemNotFound(potion.clone()));
            }
            living_mut(gauntlet, *character_id)?
                .hit_points
                .heal(*healing);
        }
        Effect::MemberRecruited { character, .. } => {
            if gauntlet.party.len() >= gauntlet.rules.max_party_size {
                return Err(CampaignError::PartyFull(gauntlet.party.len()));
            }
            gauntlet.party.push(character.as_ref().clone());
        }
        Effect::AsiApplied {
            character_id,
            choice,
        } => {
            progression::apply_asi(living_mut(gauntlet, *character_id)?, choice)?;
        }
        Effect::SubclassChosen {
            character_id,
            subclass,
        } => {
            progression::choose_subclass(living_mut(gauntlet, *character_id)?, subclass)?;
        }
        Effect::CantripsLearned {
            character_id,
            cantrips,
        } => {
            spellcasting::learn_cantrips(living_mut(gauntlet, *character_id)?, cantrips)?;
        }
        Effect::SpellsLearned {
            character_id,
            spells,
        } => {
            spellcasting::learn_spells(living_mut(gauntlet, *character_id)?, spells)?;
        }
        Effect::SpellsPrepared {
            character_id,
            spells,
        } => {
            spellcasting::prepare_spells(living_mut(gauntlet, *character_id)?, spells.clone())?;
        }
    }
    Ok(())
}

/// Apply a resolution to a copy of the gauntlet. Returns the new state, with
/// the narrative logged and `version` bumped, only if every effect applied.
pub fn commit(gauntlet: &Gauntlet, resolution: &Resolution) -> Result<Gauntlet, CampaignError> {
    let mut working = gauntlet.clone();
    apply_effects(&mut working, &resolution.effects)?;
    working.record(resolution.narrative.clone());
    working.version += 1;
    working.updated_at = Utc::now();
    Ok(working)
}

impl CampaignEngine {
    /// Resolve and commit in one step. On error the gauntlet is untouched.
    pub fn execute<R: Rng + ?Sized>(
        &self,
        gauntlet: &mut Gauntlet,
        intent: CampaignIntent,
        rng: &mut R,
    ) -> Result<Resolution, CampaignError> {
        let resolution = self.resolve(gauntlet, intent, rng)?;
        *gauntlet = commit(gauntlet, &resolution)?;
        Ok(resolution)
    }
}
