//! Configuration for gauntlet sessions.

use crate::gauntlet::{GauntletRules, XpMode};
use crate::progression::HpMethod;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

impl FromStr for HpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolled" | "roll" => Ok(HpMethod::Rolled),
            "average" | "fixed" => Ok(HpMethod::Average),
            other => Err(other.to_string()),
        }
    }
}

impl FromStr for XpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "experience" | "xp" => Ok(XpMode::Experience),
            "milestone" => Ok(XpMode::Milestone),
            other => Err(other.to_string()),
        }
    }
}

/// Settings for a gauntlet session.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignConfig {
    /// Directory for save files.
    pub save_dir: PathBuf,

    /// Fixed RNG seed for reproducible runs. Random when unset.
    pub seed: Option<u64>,

    /// Rules for newly created gauntlets.
    pub rules: GauntletRules,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves"),
            seed: None,
            rules: GauntletRules::default(),
        }
    }
}

impl CampaignConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `GAUNTLET_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like `from_env`, with variables supplied by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("GAUNTLET_SAVE_DIR") {
            config.save_dir = PathBuf::from(dir);
        }
        config.seed = parse_var(&lookup, "GAUNTLET_SEED")?;
        if let Some(method) = parse_var(&lookup, "GAUNTLET_HP_METHOD")? {
            config.rules.hp_method = method;
        }
        if let Some(mode) = parse_var(&lookup, "GAUNTLET_XP_MODE")? {
            config.rules.xp_mode = mode;
        }
        if let Some(size) = parse_var(&lookup, "GAUNTLET_MAX_PARTY")? {
            config.rules.max_party_size = size;
        }
        if let Some(count) = parse_var(&lookup, "GAUNTLET_ENCOUNTERS")? {
            config.rules.encounter_count = count;
        }
        if let Some(rests) = parse_var(&lookup, "GAUNTLET_LONG_RESTS")? {
            config.rules.long_rests = rests;
        }
        if let Some(cost) = parse_var(&lookup, "GAUNTLET_RECRUIT_COST")? {
            config.rules.recruit_cost_per_level = cost;
        }

        Ok(config)
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_hp_method(mut self, method: HpMethod) -> Self {
        self.rules.hp_method = method;
        self
    }

    pub fn with_xp_mode(mut self, mode: XpMode) -> Self {
        self.rules.xp_mode = mode;
        self
    }

    pub fn with_max_party_size(mut self, size: usize) -> Self {
        self.rules.max_party_size = size;
        self
    }

    /// Number of encounters, the last being the boss.
    pub fn with_encounter_count(mut self, count: usize) -> Self {
        self.rules.encounter_count = count;
        self
    }

    pub fn with_long_rests(mut self, rests: u8) -> Self {
        self.rules.long_rests = rests;
        self
    }

    pub fn with_recruit_cost(mut self, gold_per_level: u32) -> Self {
        self.rules.recruit_cost_per_level = gold_per_level;
        self
    }

    pub fn rules(&self) -> GauntletRules {
        self.rules.clone()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
