//! QA tests for the gauntlet loop: encounters, treasure, rests, recruits
//! and permadeath, driven through the rules engine.
//!
//! Run with: `cargo test -p dnd-campaign --test qa_gauntlet`

use dnd_campaign::character::{Rarity, RechargeType};
use dnd_campaign::encounter::{
    self, ChallengeRating, Difficulty, EncounterError, MonsterGroup, MonsterTemplate,
};
use dnd_campaign::gauntlet::{EncounterStatus, XpMode};
use dnd_campaign::rules::Effect;
use dnd_campaign::spellcasting::SpellError;
use dnd_campaign::testing::{
    assert_fallen, assert_level, assert_phase, goblins, ogres, sample_party, TestHarness,
};
use dnd_campaign::treasure::healing_potion;
use dnd_campaign::{
    CampaignError, CampaignIntent, CharacterClass, EncounterOutcome, GauntletPhase,
    GauntletRules, HpMethod, RaceType,
};
use std::collections::BTreeMap;

fn rules(encounters: usize) -> GauntletRules {
    GauntletRules {
        encounter_count: encounters,
        hp_method: HpMethod::Average,
        ..GauntletRules::default()
    }
}

fn harness(encounters: usize) -> TestHarness {
    TestHarness::with_party(rules(encounters), sample_party().unwrap())
}

// =============================================================================
// FULL RUNS
// =============================================================================

#[test]
fn test_three_encounter_victory() {
    let mut h = harness(3);
    h.start().unwrap();
    assert_phase(&h, GauntletPhase::Camp);

    h.clear(goblins(4)).unwrap();
    h.clear(goblins(8)).unwrap();
    assert_eq!(h.gauntlet.current_encounter, 2);

    h.clear(ogres(2)).unwrap();
    assert_phase(&h, GauntletPhase::Victorious);

    // 4 + 8 goblins and 2 ogres: 200 + 400 + 900 XP over four survivors
    for member in &h.gauntlet.party {
        assert_eq!(member.experience, 50 + 100 + 225);
        assert_eq!(member.level, 2);
    }

    // the boss hoard left one item in the stash
    assert_eq!(h.gauntlet.stash.items.len(), 1);

    // all gold is accounted for
    let won: u32 = h.gauntlet.encounters.iter().map(|e| e.gold).sum();
    let held: u32 = h.gauntlet.party.iter().map(|c| c.inventory.gold).sum();
    assert_eq!(held + h.gauntlet.stash.gold, won);
    assert!(h
        .gauntlet
        .encounters
        .iter()
        .all(|e| e.status == EncounterStatus::Won));

    assert_eq!(
        h.execute(CampaignIntent::LongRest),
        Err(CampaignError::GauntletOver(GauntletPhase::Victorious))
    );
}

#[test]
fn test_milestone_mode_levels_every_win() {
    let rules = GauntletRules {
        xp_mode: XpMode::Milestone,
        ..rules(3)
    };
    let mut h = TestHarness::with_party(rules, sample_party().unwrap());
    h.start().unwrap();
    h.clear(goblins(1)).unwrap();
    assert_level(&h, "Bruna", 2);
    h.clear(goblins(1)).unwrap();
    assert_level(&h, "Pell", 3);
    assert_eq!(h.gauntlet.encounter(1).unwrap().xp_each, 0);
    // XP follows the level
    assert!(h.gauntlet.party.iter().all(|c| c.experience == 900));
}

#[test]
fn test_generated_encounter_matches_plan() {
    let mut h = harness(5);
    h.start().unwrap();
    h.execute(CampaignIntent::BeginEncounter {
        index: 0,
        monsters: None,
    })
    .unwrap();

    let record = h.gauntlet.encounter(0).unwrap();
    assert_eq!(record.difficulty, Difficulty::Easy);
    assert_eq!(record.status, EncounterStatus::Active);
    assert!(!record.monsters.is_empty());
    for group in &record.monsters {
        assert!(h
            .gauntlet
            .monster_pool
            .iter()
            .any(|m| m.name == group.template.name));
    }
    let adjusted = encounter::adjusted_xp(&record.monsters, h.gauntlet.party.len());
    assert!(adjusted > 0);
}

// =============================================================================
// SEQUENCING AND IDEMPOTENCY
// =============================================================================

#[test]
fn test_encounters_run_in_order() {
    let mut h = harness(3);
    h.start().unwrap();

    assert_eq!(
        h.execute(CampaignIntent::BeginEncounter {
            index: 1,
            monsters: Some(goblins(2)),
        }),
        Err(CampaignError::EncounterOutOfOrder {
            expected: 0,
            got: 1
        })
    );
    assert!(matches!(
        h.execute(CampaignIntent::ResolveEncounter {
            index: 0,
            outcome: EncounterOutcome::victory(),
        }),
        Err(CampaignError::WrongPhase { .. })
    ));

    h.begin(goblins(2)).unwrap();
    assert!(matches!(
        h.execute(CampaignIntent::LongRest),
        Err(CampaignError::WrongPhase { .. })
    ));
}

#[test]
fn test_oversized_encounter_is_refused() {
    let mut h = harness(3);
    h.start().unwrap();
    let tarrasques = vec![MonsterGroup::new(
        MonsterTemplate::new("Tarrasque", ChallengeRating::Whole(30)),
        30_000,
    )];
    assert_eq!(
        h.begin(tarrasques),
        Err(CampaignError::Encounter(EncounterError::TooManyMonsters {
            count: 30_000,
            max: encounter::MAX_ENCOUNTER_MONSTERS,
        }))
    );
    assert_phase(&h, GauntletPhase::Camp);
    assert_eq!(h.gauntlet.version, 1);

    // the largest allowed horde still resolves cleanly
    h.clear(goblins(encounter::MAX_ENCOUNTER_MONSTERS)).unwrap();
    let record = h.gauntlet.encounter(0).unwrap();
    assert_eq!(record.status, EncounterStatus::Won);
    assert_eq!(record.xp_each, 50 * encounter::MAX_ENCOUNTER_MONSTERS / 4);
}

#[test]
fn test_replayed_outcome_changes_nothing() {
    let mut h = harness(3);
    h.start().unwrap();
    h.begin(goblins(6)).unwrap();
    let resolve = CampaignIntent::ResolveEncounter {
        index: 0,
        outcome: EncounterOutcome::victory(),
    };
    h.execute(resolve.clone()).unwrap();
    let snapshot = h.gauntlet.clone();

    assert_eq!(
        h.execute(resolve),
        Err(CampaignError::EncounterAlreadyResolved(0))
    );
    assert_eq!(h.gauntlet, snapshot);
}

#[test]
fn test_bad_outcome_is_rejected_whole() {
    let mut h = harness(3);
    h.start().unwrap();
    h.begin(goblins(2)).unwrap();
    let fighter = h.id("Bruna").unwrap();
    let wizard = h.id("Pell").unwrap();
    let snapshot = h.gauntlet.clone();

    // a level 1 wizard has no 3rd level slot
    let outcome = EncounterOutcome::victory()
        .with_hp(fighter, 3)
        .with_slots(wizard, vec![1, 3]);
    assert_eq!(
        h.finish(outcome),
        Err(CampaignError::Spell(SpellError::NoSlotAvailable(3)))
    );
    assert_eq!(h.gauntlet, snapshot);

    // the fighter has no slots at all
    let outcome = EncounterOutcome::victory().with_slots(fighter, vec![1]);
    assert!(matches!(
        h.finish(outcome),
        Err(CampaignError::Spell(SpellError::NotASpellcaster(_)))
    ));
}

#[test]
fn test_outcome_hp_and_slots_apply() {
    let mut h = harness(3);
    h.start().unwrap();
    h.begin(goblins(2)).unwrap();
    let fighter = h.id("Bruna").unwrap();
    let wizard = h.id("Pell").unwrap();
    h.finish(
        EncounterOutcome::victory()
            .with_hp(fighter, 3)
            .with_slots(wizard, vec![1]),
    )
    .unwrap();

    assert_eq!(h.member("Bruna").unwrap().hit_points.current, 3);
    let slots = &h.member("Pell").unwrap().spellcasting.as_ref().unwrap().spell_slots;
    assert_eq!(slots.available(1), 1);
}

// =============================================================================
// PERMADEATH
// =============================================================================

#[test]
fn test_casualties_share_nothing() {
    let mut h = harness(3);
    h.start().unwrap();
    h.begin(goblins(6)).unwrap();
    let quill = h.id("Quill").unwrap();
    h.finish(EncounterOutcome::victory().with_casualty(quill))
        .unwrap();

    assert_fallen(&h, "Quill");
    assert_eq!(h.gauntlet.party.len(), 3);
    // 300 XP among three survivors
    assert!(h.gauntlet.party.iter().all(|c| c.experience == 100));
    assert_eq!(
        h.gauntlet.encounter(0).unwrap().casualties,
        vec!["Quill".to_string()]
    );
    assert_eq!(h.gauntlet.fallen[0].encounter, 0);

    assert!(matches!(
        h.execute(CampaignIntent::ClaimItem {
            character_id: quill,
            item: "anything".into()
        }),
        Err(CampaignError::CharacterDead(_))
    ));
}

#[test]
fn test_defeat_ends_the_run() {
    let mut h = harness(3);
    h.start().unwrap();
    h.clear(goblins(2)).unwrap();
    h.begin(ogres(3)).unwrap();
    let pell = h.id("Pell").unwrap();
    h.finish(EncounterOutcome::defeat().with_casualty(pell))
        .unwrap();

    assert_phase(&h, GauntletPhase::Defeated);
    assert_eq!(
        h.gauntlet.encounter(1).unwrap().status,
        EncounterStatus::Lost
    );
    assert_eq!(h.gauntlet.encounter(1).unwrap().xp_each, 0);
    assert_eq!(
        h.execute(CampaignIntent::Recruit {
            name: "Late".into(),
            race: RaceType::Human,
            class: CharacterClass::Fighter
        }),
        Err(CampaignError::GauntletOver(GauntletPhase::Defeated))
    );
}

#[test]
fn test_abandon() {
    let mut h = harness(3);
    h.start().unwrap();
    h.execute(CampaignIntent::Abandon).unwrap();
    assert_phase(&h, GauntletPhase::Abandoned);
    assert!(h.execute(CampaignIntent::Abandon).is_err());
}

// =============================================================================
// CAMP: RESTS, LOOT, RECRUITS
// =============================================================================

#[test]
fn test_short_rest_spends_hit_dice_and_recharges() {
    let mut h = harness(3);
    h.start().unwrap();
    h.clear(goblins(2)).unwrap();

    let fighter = h.id("Bruna").unwrap();
    {
        let bruna = h.gauntlet.member_mut(fighter).unwrap();
        bruna.hit_points.set_current(2);
        bruna.feature_mut("Second Wind").unwrap().uses.as_mut().unwrap().current = 0;
    }

    let mut dice = BTreeMap::new();
    dice.insert(fighter, 1);
    let resolution = h
        .execute(CampaignIntent::ShortRest {
            hit_dice: dice.clone(),
        })
        .unwrap();

    let healed: i32 = resolution
        .effects
        .iter()
        .filter_map(|e| match e {
            Effect::HitDieSpent { healing, .. } => Some(*healing),
            _ => None,
        })
        .sum();
    let bruna = h.member("Bruna").unwrap();
    assert_eq!(
        bruna.hit_points.current,
        (2 + healed).min(bruna.hit_points.maximum)
    );
    assert_eq!(bruna.hit_dice.remaining, 0);
    let uses = bruna.feature("Second Wind").unwrap().uses.as_ref().unwrap();
    assert_eq!(uses.recharge, RechargeType::ShortRest);
    assert_eq!(uses.current, uses.maximum);

    assert_eq!(
        h.execute(CampaignIntent::ShortRest { hit_dice: dice }),
        Err(CampaignError::ShortRestAlreadyTaken)
    );
}

#[test]
fn test_short_rest_needs_hit_dice() {
    let mut h = harness(3);
    h.start().unwrap();
    let fighter = h.id("Bruna").unwrap();
    let mut dice = BTreeMap::new();
    dice.insert(fighter, 2);
    assert!(matches!(
        h.execute(CampaignIntent::ShortRest { hit_dice: dice }),
        Err(CampaignError::NotEnoughHitDice { available: 1, .. })
    ));
}

#[test]
fn test_long_rest_restores_everything() {
    let mut h = harness(3);
    h.start().unwrap();
    h.begin(goblins(2)).unwrap();
    let wizard = h.id("Pell").unwrap();
    h.finish(
        EncounterOutcome::victory()
            .with_hp(wizard, 1)
            .with_slots(wizard, vec![1, 1]),
    )
    .unwrap();

    h.execute(CampaignIntent::LongRest).unwrap();
    let pell = h.member("Pell").unwrap();
    assert_eq!(pell.hit_points.current, pell.hit_points.maximum);
    assert_eq!(
        pell.spellcasting.as_ref().unwrap().spell_slots.available(1),
        2
    );
    assert_eq!(h.gauntlet.long_rests_remaining, 1);
}

#[test]
fn test_potion_from_stash() {
    let mut h = harness(3);
    h.start().unwrap();
    h.gauntlet.stash.add_item(healing_potion(Rarity::Common));
    let cleric = h.id("Sister Ama").unwrap();
    h.gauntlet
        .member_mut(cleric)
        .unwrap()
        .hit_points
        .set_current(1);

    let resolution = h
        .execute(CampaignIntent::UsePotion {
            character_id: cleric,
            potion: "potion of healing".into(),
        })
        .unwrap();
    let Some(Effect::PotionConsumed {
        healing,
        from_stash,
        ..
    }) = resolution.effects.first()
    else {
        panic!("expected a potion effect");
    };
    assert!(*from_stash);
    assert!((4..=10).contains(healing));
    assert!(h.gauntlet.stash.items.is_empty());
    let ama = h.member("Sister Ama").unwrap();
    assert_eq!(
        ama.hit_points.current,
        (1 + healing).min(ama.hit_points.maximum)
    );

    assert_eq!(
        h.execute(CampaignIntent::UsePotion {
            character_id: cleric,
            potion: "Potion of Healing".into(),
        }),
        Err(CampaignError::ItemNotFound("Potion of Healing".into()))
    );
}

#[test]
fn test_claim_item_from_stash() {
    let mut h = harness(3);
    h.start().unwrap();
    h.gauntlet.stash.add_item(healing_potion(Rarity::Uncommon));
    h.gauntlet.stash.add_item(healing_potion(Rarity::Uncommon));
    let rogue = h.id("Quill").unwrap();

    h.execute(CampaignIntent::ClaimItem {
        character_id: rogue,
        item: "Potion of Greater Healing".into(),
    })
    .unwrap();

    let quill = h.member("Quill").unwrap();
    assert_eq!(
        quill
            .inventory
            .find_item("Potion of Greater Healing")
            .unwrap()
            .quantity,
        1
    );
    assert_eq!(h.gauntlet.stash.items[0].quantity, 1);
}

#[test]
fn test_recruiting_is_free_before_start() {
    let mut h = TestHarness::new(rules(3));
    h.execute(CampaignIntent::Recruit {
        name: "Vex".into(),
        race: RaceType::Tiefling,
        class: CharacterClass::Warlock,
    })
    .unwrap();
    assert_eq!(h.gauntlet.party.len(), 1);
    assert_level(&h, "Vex", 1);
    h.start().unwrap();
    assert_phase(&h, GauntletPhase::Camp);
}

#[test]
fn test_recruits_join_at_party_level_and_cost_gold() {
    let mut h = harness(5);
    h.start().unwrap();
    // 1200 XP: 300 each, level 2
    h.clear(goblins(24)).unwrap();
    let quill = h.id("Quill").unwrap();
    h.begin(goblins(2)).unwrap();
    h.finish(EncounterOutcome::victory().with_casualty(quill))
        .unwrap();
    h.gauntlet.stash.gold = 500;

    h.execute(CampaignIntent::Recruit {
        name: "Vex".into(),
        race: RaceType::Tiefling,
        class: CharacterClass::Warlock,
    })
    .unwrap();
    assert_level(&h, "Vex", 2);
    assert_eq!(h.gauntlet.stash.gold, 400);

    assert_eq!(
        h.execute(CampaignIntent::Recruit {
            name: "Extra".into(),
            race: RaceType::Human,
            class: CharacterClass::Fighter,
        }),
        Err(CampaignError::PartyFull(4))
    );
}

#[test]
fn test_choices_through_the_engine() {
    let mut h = harness(5);
    h.start().unwrap();
    let ama = h.id("Sister Ama").unwrap();

    h.execute(CampaignIntent::ChooseSubclass {
        character_id: ama,
        subclass: "Life Domain".into(),
    })
    .unwrap();
    assert_eq!(
        h.member("Sister Ama").unwrap().subclass.as_deref(),
        Some("Life Domain")
    );
    assert!(matches!(
        h.execute(CampaignIntent::ChooseSubclass {
            character_id: ama,
            subclass: "War Domain".into(),
        }),
        Err(CampaignError::Progression(_))
    ));

    h.execute(CampaignIntent::LearnCantrips {
        character_id: ama,
        cantrips: vec!["Guidance".into(), "Light".into(), "Sacred Flame".into()],
    })
    .unwrap();
    assert!(!h.member("Sister Ama").unwrap().has_pending_choices());

    h.execute(CampaignIntent::CastSpell {
        character_id: ama,
        slot_level: 1,
    })
    .unwrap();
    let slots = &h
        .member("Sister Ama")
        .unwrap()
        .spellcasting
        .as_ref()
        .unwrap()
        .spell_slots;
    assert_eq!(slots.available(1), 1);
}

#[test]
fn test_manual_experience_levels_up() {
    let mut h = harness(3);
    h.start().unwrap();
    let fighter = h.id("Bruna").unwrap();
    let resolution = h
        .execute(CampaignIntent::AwardExperience {
            character_id: fighter,
            amount: 900,
        })
        .unwrap();
    assert_eq!(resolution.level_ups().count(), 2);
    assert_level(&h, "Bruna", 3);
    assert_eq!(h.gauntlet.version, 2);
}
