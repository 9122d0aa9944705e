//! Treasure rolls and loot distribution.

use crate::character::{ConsumableEffect, Item, ItemType, Rarity};
use crate::dice::DieType;
use crate::encounter::MonsterGroup;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Gold and items won from an encounter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasure {
    pub gold: u32,
    pub items: Vec<Item>,
}

/// Party tier by average level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    One,
    Two,
    Three,
    Four,
}

impl Tier {
    pub fn for_level(level: u8) -> Self {
        match level {
            0..=4 => Tier::One,
            5..=10 => Tier::Two,
            11..=16 => Tier::Three,
            _ => Tier::Four,
        }
    }

    /// Number of d6 and the multiplier for a hoard's gold.
    fn hoard_gold(&self) -> (u32, u32) {
        match self {
            Tier::One => (6, 10),
            Tier::Two => (6, 100),
            Tier::Three => (4, 1000),
            Tier::Four => (12, 1000),
        }
    }
}

fn roll_d6s<R: Rng + ?Sized>(count: u32, rng: &mut R) -> u32 {
    (0..count).map(|_| DieType::D6.roll(rng)).sum()
}

/// Individual treasure for one monster of the given whole CR, in gp.
pub fn individual_gold<R: Rng + ?Sized>(cr: u8, rng: &mut R) -> u32 {
    match cr {
        0..=4 => roll_d6s(3, rng),
        5..=10 => roll_d6s(4, rng) * 10,
        11..=16 => roll_d6s(4, rng) * 100,
        _ => roll_d6s(8, rng) * 100,
    }
}

/// Individual treasure for every monster in an encounter.
pub fn roll_individual<R: Rng + ?Sized>(groups: &[MonsterGroup], rng: &mut R) -> Treasure {
    let gold = groups
        .iter()
        .flat_map(|g| std::iter::repeat(g.template.challenge_rating.floor()).take(g.count as usize))
        .map(|cr| individual_gold(cr, rng))
        .sum();
    Treasure {
        gold,
        items: Vec::new(),
    }
}

/// A boss hoard: tier gold plus one magic item.
pub fn roll_hoard<R: Rng + ?Sized>(tier: Tier, rng: &mut R) -> Treasure {
    let (dice, multiplier) = tier.hoard_gold();
    let gold = roll_d6s(dice, rng) * multiplier;
    let item = magic_item_table(tier)
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| healing_potion(Rarity::Common));
    Treasure {
        gold,
        items: vec![item],
    }
}

/// Healing potion of the given rarity.
pub fn healing_potion(rarity: Rarity) -> Item {
    let (name, dice) = match rarity {
        Rarity::Common => ("Potion of Healing", "2d4+2"),
        Rarity::Uncommon => ("Potion of Greater Healing", "4d4+4"),
        Rarity::Rare => ("Potion of Superior Healing", "8d4+8"),
        Rarity::VeryRare | Rarity::Legendary => ("Potion of Supreme Healing", "10d4+20"),
    };
    Item {
        name: name.to_string(),
        quantity: 1,
        item_type: ItemType::Potion,
        rarity,
        consumable: Some(ConsumableEffect::Healing {
            dice: dice.to_string(),
        }),
    }
}

fn permanent(name: &str, item_type: ItemType, rarity: Rarity) -> Item {
    Item {
        name: name.to_string(),
        quantity: 1,
        item_type,
        rarity,
        consumable: None,
    }
}

/// Magic items a hoard of this tier can hold.
pub fn magic_item_table(tier: Tier) -> Vec<Item> {
    match tier {
        Tier::One => vec![
            healing_potion(Rarity::Common),
            healing_potion(Rarity::Uncommon),
            permanent("+1 Shield", ItemType::Armor, Rarity::Uncommon),
            permanent("Cloak of Protection", ItemType::Wondrous, Rarity::Uncommon),
            permanent("Bag of Holding", ItemType::Wondrous, Rarity::Uncommon),
        ],
        Tier::Two => vec![
            healing_potion(Rarity::Uncommon),
            healing_potion(Rarity::Rare),
            permanent("+1 Longsword", ItemType::Weapon, Rarity::Uncommon),
            permanent("Ring of Protection", ItemType::Ring, Rarity::Rare),
            permanent("Flame Tongue", ItemType::Weapon, Rarity::Rare),
        ],
        Tier::Three => vec![
            healing_potion(Rarity::Rare),
            healing_potion(Rarity::VeryRare),
            permanent("+2 Plate Armor", ItemType::Armor, Rarity::VeryRare),
            permanent("Staff of Power", ItemType::Wondrous, Rarity::VeryRare),
            permanent("Ring of Spell Storing", ItemType::Ring, Rarity::Rare),
        ],
        Tier::Four => vec![
            healing_potion(Rarity::VeryRare),
            permanent("Holy Avenger", ItemType::Weapon, Rarity::Legendary),
            permanent("Vorpal Sword", ItemType::Weapon, Rarity::Legendary),
            permanent("Ring of Three Wishes", ItemType::Ring, Rarity::Legendary),
        ],
    }
}

/// Gold divided among survivors; what doesn't divide evenly stays with the party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoldSplit {
    pub per_member: u32,
    pub remainder: u32,
}

pub fn split_gold(total: u32, survivors: usize) -> GoldSplit {
    if survivors == 0 {
        return GoldSplit {
            per_member: 0,
            remainder: total,
        };
    }
    let survivors = survivors as u32;
    GoldSplit {
        per_member: total / survivors,
        remainder: total % survivors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encounter::{ChallengeRating, MonsterTemplate};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_individual_gold_bands() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            assert!((3..=18).contains(&individual_gold(1, &mut rng)));
            let mid = individual_gold(7, &mut rng);
            assert!((40..=240).contains(&mid) && mid % 10 == 0);
            let high = individual_gold(20, &mut rng);
            assert!((800..=4800).contains(&high) && high % 100 == 0);
        }
    }

    #[test]
    fn test_roll_individual_counts_every_monster() {
        let groups = vec![MonsterGroup::new(
            MonsterTemplate::new("Goblin", ChallengeRating::Quarter),
            4,
        )];
        let mut rng = StdRng::seed_from_u64(2);
        let treasure = roll_individual(&groups, &mut rng);
        assert!((12..=72).contains(&treasure.gold));
        assert!(treasure.items.is_empty());
    }

    #[test]
    fn test_hoard_has_one_item() {
        let mut rng = StdRng::seed_from_u64(5);
        for tier in [Tier::One, Tier::Two, Tier::Three, Tier::Four] {
            let hoard = roll_hoard(tier, &mut rng);
            assert_eq!(hoard.items.len(), 1);
            assert!(hoard.gold > 0);
        }
        assert_eq!(Tier::for_level(4), Tier::One);
        assert_eq!(Tier::for_level(11), Tier::Three);
    }

    #[test]
    fn test_split_gold() {
        assert_eq!(
            split_gold(100, 3),
            GoldSplit {
                per_member: 33,
                remainder: 1
            }
        );
        assert_eq!(
            split_gold(10, 0),
            GoldSplit {
                per_member: 0,
                remainder: 10
            }
        );
    }

    #[test]
    fn test_potion_dice() {
        let potion = healing_potion(Rarity::VeryRare);
        assert_eq!(
            potion.consumable,
            Some(ConsumableEffect::Healing {
                dice: "10d4+20".to_string()
            })
        );
        assert!(potion.is_stackable());
    }
}
