//! Encounter building with the DMG difficulty math.
//!
//! XP thresholds per character level, the multiplier for monster count and
//! party size, difficulty rating, and a generator that picks monsters from a
//! pool to hit a target difficulty.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncounterError {
    #[error("Monster pool is empty")]
    EmptyPool,
    #[error("Party has no members")]
    EmptyParty,
    #[error("Invalid challenge rating: {0}")]
    InvalidChallengeRating(String),
    #[error("Monster group {0} has no monsters")]
    EmptyGroup(String),
    #[error("Encounter has {count} monsters, at most {max} allowed")]
    TooManyMonsters { count: u32, max: u32 },
}

/// A monster's challenge rating (0, 1/8, 1/4, 1/2, 1..=30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChallengeRating {
    Zero,
    Eighth,
    Quarter,
    Half,
    Whole(u8),
}

// XP by whole CR, index = CR.
const WHOLE_CR_XP: [u32; 31] = [
    10, 200, 450, 700, 1100, 1800, 2300, 2900, 3900, 5000, 5900, 7200, 8400, 10000, 11500, 13000,
    15000, 18000, 20000, 22000, 25000, 33000, 41000, 50000, 62000, 75000, 90000, 105000, 120000,
    135000, 155000,
];

impl ChallengeRating {
    pub fn whole(cr: u8) -> Result<Self, EncounterError> {
        match cr {
            0 => Ok(ChallengeRating::Zero),
            1..=30 => Ok(ChallengeRating::Whole(cr)),
            _ => Err(EncounterError::InvalidChallengeRating(cr.to_string())),
        }
    }

    /// XP value from the DMG.
    pub fn xp(&self) -> u32 {
        match self {
            ChallengeRating::Zero => 10,
            ChallengeRating::Eighth => 25,
            ChallengeRating::Quarter => 50,
            ChallengeRating::Half => 100,
            ChallengeRating::Whole(cr) => WHOLE_CR_XP[(*cr).min(30) as usize],
        }
    }

    /// CR rounded down to a whole number (fractions count as 0).
    pub fn floor(&self) -> u8 {
        match self {
            ChallengeRating::Whole(cr) => *cr,
            _ => 0,
        }
    }
}

impl FromStr for ChallengeRating {
    type Err = EncounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1/8" => Ok(ChallengeRating::Eighth),
            "1/4" => Ok(ChallengeRating::Quarter),
            "1/2" => Ok(ChallengeRating::Half),
            other => other
                .parse::<u8>()
                .map_err(|_| EncounterError::InvalidChallengeRating(other.to_string()))
                .and_then(ChallengeRating::whole),
        }
    }
}

impl fmt::Display for ChallengeRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeRating::Zero => write!(f, "0"),
            ChallengeRating::Eighth => write!(f, "1/8"),
            ChallengeRating::Quarter => write!(f, "1/4"),
            ChallengeRating::Half => write!(f, "1/2"),
            ChallengeRating::Whole(cr) => write!(f, "{cr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterTemplate {
    pub name: String,
    pub challenge_rating: ChallengeRating,
}

impl MonsterTemplate {
    pub fn new(name: impl Into<String>, challenge_rating: ChallengeRating) -> Self {
        Self {
            name: name.into(),
            challenge_rating,
        }
    }
}

/// A number of identical monsters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterGroup {
    pub template: MonsterTemplate,
    pub count: u32,
}

impl MonsterGroup {
    pub fn new(template: MonsterTemplate, count: u32) -> Self {
        Self { template, count }
    }

    pub fn xp(&self) -> u32 {
        self.template.challenge_rating.xp().saturating_mul(self.count)
    }
}

impl fmt::Display for MonsterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x {} (CR {})",
            self.count, self.template.name, self.template.challenge_rating
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Trivial,
    Easy,
    Medium,
    Hard,
    Deadly,
}

impl Difficulty {
    fn next(&self) -> Option<Difficulty> {
        match self {
            Difficulty::Trivial => Some(Difficulty::Easy),
            Difficulty::Easy => Some(Difficulty::Medium),
            Difficulty::Medium => Some(Difficulty::Hard),
            Difficulty::Hard => Some(Difficulty::Deadly),
            Difficulty::Deadly => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Trivial => "trivial",
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Deadly => "deadly",
        };
        write!(f, "{name}")
    }
}

// Easy / medium / hard / deadly XP per character level 1-20.
const LEVEL_THRESHOLDS: [[u32; 4]; 20] = [
    [25, 50, 75, 100],
    [50, 100, 150, 200],
    [75, 150, 225, 400],
    [125, 250, 375, 500],
    [250, 500, 750, 1100],
    [300, 600, 900, 1400],
    [350, 750, 1100, 1700],
    [450, 900, 1400, 2100],
    [550, 1100, 1600, 2400],
    [600, 1200, 1900, 2800],
    [800, 1600, 2400, 3600],
    [1000, 2000, 3000, 4500],
    [1100, 2200, 3400, 5100],
    [1250, 2500, 3800, 5700],
    [1400, 2800, 4300, 6400],
    [1600, 3200, 4800, 7200],
    [2000, 3900, 5900, 8800],
    [2100, 4200, 6300, 9500],
    [2400, 4900, 7300, 10900],
    [2800, 5700, 8500, 12700],
];

/// Party XP thresholds: the sum of every member's thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartyThresholds {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
    pub deadly: u32,
}

impl PartyThresholds {
    pub fn for_levels(levels: &[u8]) -> Self {
        levels.iter().fold(Self::default(), |acc, level| {
            let [easy, medium, hard, deadly] = LEVEL_THRESHOLDS[(*level).clamp(1, 20) as usize - 1];
            Self {
                easy: acc.easy + easy,
                medium: acc.medium + medium,
                hard: acc.hard + hard,
                deadly: acc.deadly + deadly,
            }
        })
    }

    pub fn threshold(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Trivial => 0,
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
            Difficulty::Deadly => self.deadly,
        }
    }

    pub fn rate(&self, adjusted_xp: u32) -> Difficulty {
        if adjusted_xp >= self.deadly {
            Difficulty::Deadly
        } else if adjusted_xp >= self.hard {
            Difficulty::Hard
        } else if adjusted_xp >= self.medium {
            Difficulty::Medium
        } else if adjusted_xp >= self.easy {
            Difficulty::Easy
        } else {
            Difficulty::Trivial
        }
    }
}

const MULTIPLIERS: [f64; 8] = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0];

/// DMG encounter multiplier for a monster count, stepped up for parties of
/// fewer than three and down for parties of six or more.
pub fn encounter_multiplier(monster_count: u32, party_size: usize) -> f64 {
    let base = match monster_count {
        0 | 1 => 1,
        2 => 2,
        3..=6 => 3,
        7..=10 => 4,
        11..=14 => 5,
        _ => 6,
    };
    let idx = match party_size {
        0..=2 => base + 1,
        3..=5 => base,
        _ => base - 1,
    };
    MULTIPLIERS[idx]
}

/// Raw XP of all monsters. This is what the party earns.
pub fn raw_xp(groups: &[MonsterGroup]) -> u32 {
    groups
        .iter()
        .fold(0u32, |total, g| total.saturating_add(g.xp()))
}

/// XP after the multiplier; only used to judge difficulty.
pub fn adjusted_xp(groups: &[MonsterGroup], party_size: usize) -> u32 {
    let count = groups
        .iter()
        .fold(0u32, |total, g| total.saturating_add(g.count));
    (raw_xp(groups) as f64 * encounter_multiplier(count, party_size)).floor() as u32
}

/// Rate a monster list against a party.
pub fn rate_encounter(groups: &[MonsterGroup], party_levels: &[u8]) -> Difficulty {
    PartyThresholds::for_levels(party_levels).rate(adjusted_xp(groups, party_levels.len()))
}

/// Largest group the generator will field.
pub const MAX_GROUP_SIZE: u32 = 8;

/// Most monsters a hand-built encounter may field across all its groups.
pub const MAX_ENCOUNTER_MONSTERS: u32 = 50;

/// Check a hand-built monster list: no empty groups, and no more than
/// [`MAX_ENCOUNTER_MONSTERS`] in total.
pub fn validate_groups(groups: &[MonsterGroup]) -> Result<(), EncounterError> {
    let mut total = 0u32;
    for group in groups {
        if group.count == 0 {
            return Err(EncounterError::EmptyGroup(group.template.name.clone()));
        }
        total = total.saturating_add(group.count);
    }
    if total > MAX_ENCOUNTER_MONSTERS {
        return Err(EncounterError::TooManyMonsters {
            count: total,
            max: MAX_ENCOUNTER_MONSTERS,
        });
    }
    Ok(())
}

/// Builds single-template encounters from a monster pool.
#[derive(Debug, Clone, Default)]
pub struct EncounterGenerator;

impl EncounterGenerator {
    /// Pick a template and count whose adjusted XP lands in the difficulty's
    /// band (at or above its threshold, below the next). Any in-band option may
    /// be chosen; when none fits, the option closest to the threshold wins.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        party_levels: &[u8],
        difficulty: Difficulty,
        pool: &[MonsterTemplate],
        rng: &mut R,
    ) -> Result<Vec<MonsterGroup>, EncounterError> {
        if pool.is_empty() {
            return Err(EncounterError::EmptyPool);
        }
        if party_levels.is_empty() {
            return Err(EncounterError::EmptyParty);
        }
        let thresholds = PartyThresholds::for_levels(party_levels);
        let target = thresholds.threshold(difficulty);
        let ceiling = difficulty
            .next()
            .map(|d| thresholds.threshold(d))
            .unwrap_or(u32::MAX);

        let mut in_band = Vec::new();
        let mut closest: Option<(u32, MonsterGroup)> = None;
        for template in pool {
            for count in 1..=MAX_GROUP_SIZE {
                let group = MonsterGroup::new(template.clone(), count);
                let adjusted = adjusted_xp(std::slice::from_ref(&group), party_levels.len());
                if adjusted >= target && adjusted < ceiling {
                    in_band.push(group);
                    continue;
                }
                let distance = adjusted.abs_diff(target);
                if closest.as_ref().map_or(true, |(best, _)| distance < *best) {
                    closest = Some((distance, group));
                }
            }
        }

        let picked = match in_band.choose(rng) {
            Some(group) => group.clone(),
            None => closest.map(|(_, g)| g).ok_or(EncounterError::EmptyPool)?,
        };
        Ok(vec![picked])
    }
}

fn cr(value: &str) -> ChallengeRating {
    value.parse().unwrap_or(ChallengeRating::Zero)
}

/// A small bestiary covering CR 1/8 to 30.
pub fn default_monster_pool() -> Vec<MonsterTemplate> {
    [
        ("Kobold", "1/8"),
        ("Giant Rat", "1/8"),
        ("Goblin", "1/4"),
        ("Wolf", "1/4"),
        ("Orc", "1/2"),
        ("Gnoll", "1/2"),
        ("Bugbear", "1"),
        ("Ghoul", "1"),
        ("Ogre", "2"),
        ("Owlbear", "3"),
        ("Wight", "3"),
        ("Ettin", "4"),
        ("Troll", "5"),
        ("Hill Giant", "5"),
        ("Stone Giant", "7"),
        ("Young Green Dragon", "8"),
        ("Cloud Giant", "9"),
        ("Young Red Dragon", "10"),
        ("Aboleth", "10"),
        ("Behir", "11"),
        ("Archmage", "12"),
        ("Adult Green Dragon", "15"),
        ("Purple Worm", "15"),
        ("Adult Red Dragon", "17"),
        ("Lich", "21"),
        ("Ancient Red Dragon", "24"),
        ("Tarrasque", "30"),
    ]
    .into_iter()
    .map(|(name, rating)| MonsterTemplate::new(name, cr(rating)))
    .collect()
}
