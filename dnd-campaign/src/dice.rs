//! Dice notation and rolling.
//!
//! Supports XdY+Z with keep-highest/keep-lowest (`4d6kh3`). Every roll takes
//! an explicit RNG so campaign resolution can be replayed from a seed.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// Fixed value used instead of rolling (half the die, rounded up, plus one
    /// for even dice): d6 = 4, d8 = 5, d10 = 6, d12 = 7.
    pub fn average(&self) -> u32 {
        self.sides() / 2 + 1
    }

    /// Roll a single die.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(1..=self.sides())
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Which dice of a pool count toward its total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

impl Keep {
    fn count(self) -> u32 {
        match self {
            Keep::Highest(n) | Keep::Lowest(n) => n,
        }
    }
}

/// `count` dice of one size, e.g. the `4d6kh3` in `4d6kh3+1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicePool {
    pub count: u32,
    pub die: DieType,
    pub keep: Option<Keep>,
}

impl DicePool {
    pub fn new(count: u32, die: DieType) -> Self {
        Self {
            count,
            die,
            keep: None,
        }
    }

    pub fn keeping(mut self, keep: Keep) -> Self {
        self.keep = Some(keep);
        self
    }

    fn counted(&self) -> u32 {
        self.keep.map(Keep::count).unwrap_or(self.count)
    }

    fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> PoolResult {
        let rolls: Vec<u32> = (0..self.count).map(|_| self.die.roll(rng)).collect();
        let mut kept = rolls.clone();
        match self.keep {
            Some(Keep::Highest(n)) => {
                kept.sort_unstable_by(|a, b| b.cmp(a));
                kept.truncate(n as usize);
            }
            Some(Keep::Lowest(n)) => {
                kept.sort_unstable();
                kept.truncate(n as usize);
            }
            None => {}
        }
        PoolResult {
            die: self.die,
            subtotal: kept.iter().sum(),
            rolls,
            kept,
        }
    }
}

/// Dice pools plus a flat modifier, e.g. `2d6+1d4+3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub pools: Vec<DicePool>,
    pub modifier: i32,
    pub notation: String,
}

impl DiceExpression {
    pub fn from_pool(pool: DicePool) -> Self {
        let notation = match pool.keep {
            Some(Keep::Highest(n)) => format!("{}{}kh{}", pool.count, pool.die, n),
            Some(Keep::Lowest(n)) => format!("{}{}kl{}", pool.count, pool.die, n),
            None => format!("{}{}", pool.count, pool.die),
        };
        Self {
            pools: vec![pool],
            modifier: 0,
            notation,
        }
    }

    /// Parse notation such as `d20`, `2d6+3`, `4d6kh3` or `1d8-1`.
    /// Dice pools may not be subtracted.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation: String = notation
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        let mut pools = Vec::new();
        let mut modifier = 0i32;
        for (negative, term) in split_terms(&notation)? {
            if term.contains('d') {
                if negative {
                    return Err(DiceError::InvalidNotation(term.to_string()));
                }
                pools.push(parse_pool(term)?);
            } else {
                let value: i32 = term
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(term.to_string()))?;
                modifier += if negative { -value } else { value };
            }
        }

        if pools.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }
        Ok(Self {
            pools,
            modifier,
            notation,
        })
    }

    /// Roll the expression with the given RNG.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> RollResult {
        let pools: Vec<PoolResult> = self.pools.iter().map(|p| p.roll(rng)).collect();
        let dice: u32 = pools.iter().map(|p| p.subtotal).sum();
        RollResult {
            notation: self.notation.clone(),
            total: dice as i32 + self.modifier,
            modifier: self.modifier,
            pools,
        }
    }

    /// The value of the expression if every die rolled its average.
    pub fn average(&self) -> i32 {
        let dice: u32 = self
            .pools
            .iter()
            .map(|p| p.counted() * p.die.average())
            .sum();
        dice as i32 + self.modifier
    }
}

/// Split `2d6+3-1` into signed terms: `[(false, "2d6"), (false, "3"), (true, "1")]`.
fn split_terms(notation: &str) -> Result<Vec<(bool, &str)>, DiceError> {
    if notation.is_empty() {
        return Err(DiceError::NoDice);
    }
    let mut terms = Vec::new();
    let mut negative = false;
    let mut start = 0;
    for (i, ch) in notation.char_indices() {
        if ch == '+' || ch == '-' {
            if i > start {
                terms.push((negative, &notation[start..i]));
            } else if i > 0 {
                // two signs in a row
                return Err(DiceError::InvalidNotation(notation.to_string()));
            }
            negative = ch == '-';
            start = i + 1;
        }
    }
    if start >= notation.len() {
        return Err(DiceError::InvalidNotation(notation.to_string()));
    }
    terms.push((negative, &notation[start..]));
    Ok(terms)
}

fn parse_pool(term: &str) -> Result<DicePool, DiceError> {
    let invalid = || DiceError::InvalidNotation(term.to_string());
    let (count, rest) = term.split_once('d').ok_or_else(invalid)?;
    let count: u32 = match count {
        "" => 1,
        digits => digits.parse().map_err(|_| invalid())?,
    };
    if count == 0 {
        return Err(DiceError::NoDice);
    }

    let (sides, keep) = match rest.split_once('k') {
        None => (rest, None),
        Some((sides, suffix)) => {
            let digits = |d: &str| d.parse::<u32>().map_err(|_| invalid());
            let keep = if let Some(d) = suffix.strip_prefix('h') {
                Keep::Highest(digits(d)?)
            } else if let Some(d) = suffix.strip_prefix('l') {
                Keep::Lowest(digits(d)?)
            } else {
                return Err(invalid());
            };
            (sides, Some(keep))
        }
    };

    let sides: u32 = sides.parse().map_err(|_| invalid())?;
    let die = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;
    if let Some(keep) = keep {
        if keep.count() > count {
            return Err(DiceError::InvalidKeepCount {
                keep: keep.count(),
                count,
                notation: term.to_string(),
            });
        }
    }
    Ok(DicePool { count, die, keep })
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.notation)
    }
}

/// Rolls of one pool and the ones that counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResult {
    pub die: DieType,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub notation: String,
    pub pools: Vec<PoolResult>,
    pub modifier: i32,
    pub total: i32,
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dice: Vec<String> = self
            .pools
            .iter()
            .map(|p| format!("{:?}", p.rolls))
            .collect();
        write!(f, "{}: {}", self.notation, dice.join(" + "))?;
        match self.modifier {
            0 => {}
            m if m > 0 => write!(f, " + {m}")?,
            m => write!(f, " - {}", -m)?,
        }
        write!(f, " = {}", self.total)
    }
}

/// Parse and roll in one step.
pub fn roll<R: Rng + ?Sized>(notation: &str, rng: &mut R) -> Result<RollResult, DiceError> {
    Ok(DiceExpression::parse(notation)?.roll(rng))
}
