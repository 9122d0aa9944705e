//! Headless gauntlet simulator.
//!
//! Runs a scripted gauntlet to the end with a file-backed store:
//! every encounter is generated from the monster pool and won, the party
//! takes damage, and camp decisions (rests, ASIs, subclasses) are made
//! automatically.
//!
//! Configure with `GAUNTLET_*` variables (or a `.env` file) and
//! `RUST_LOG` for log levels.

use anyhow::{Context, Result};
use dnd_campaign::character::{Ability, Character, CharacterClass, PendingChoice, RaceType};
use dnd_campaign::character_builder::ability_priority;
use dnd_campaign::{
    AsiChoice, CampaignConfig, CampaignIntent, CharacterBuilder, EncounterOutcome, FileStore,
    GauntletId, GauntletPhase, GauntletSession,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dnd_campaign=info,gauntlet_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CampaignConfig::from_env().context("reading GAUNTLET_* configuration")?;
    let seed = config.seed.unwrap_or(7);
    let config = config.with_seed(seed);
    info!(save_dir = %config.save_dir.display(), seed, "starting gauntlet simulation");

    let party = build_party(&config, seed)?;
    let session = GauntletSession::new(FileStore::new(config.save_dir.clone()), config);
    let gauntlet = session.new_gauntlet("The Sunless Vault", party).await?;
    let id = gauntlet.id;

    session.execute(id, CampaignIntent::Start).await?;

    loop {
        let gauntlet = session.gauntlet(id).await?;
        if gauntlet.phase.is_terminal() {
            break;
        }
        let index = gauntlet.current_encounter;

        let begun = session
            .execute(
                id,
                CampaignIntent::BeginEncounter {
                    index,
                    monsters: None,
                },
            )
            .await?;
        info!("{}", begun.narrative);

        let gauntlet = session.gauntlet(id).await?;
        let mut outcome = EncounterOutcome::victory();
        for member in &gauntlet.party {
            // everyone ends the fight bloodied
            outcome = outcome.with_hp(member.id, (member.hit_points.current / 2).max(1));
            let top_slot = member.spellcasting.as_ref().and_then(|s| {
                (1..=9u8).rev().find(|&level| s.spell_slots.available(level) > 0)
            });
            if let Some(level) = top_slot {
                outcome = outcome.with_slots(member.id, vec![level]);
            }
        }
        let resolved = session
            .execute(id, CampaignIntent::ResolveEncounter { index, outcome })
            .await?;
        info!("{}", resolved.narrative);
        for (character_id, record) in resolved.level_ups() {
            info!(%character_id, level = record.level, hp_gained = record.hp_gained, "level up");
        }

        make_camp(&session, id).await?;
    }

    let gauntlet = session.gauntlet(id).await?;
    info!(
        phase = %gauntlet.phase,
        survivors = gauntlet.party.len(),
        fallen = gauntlet.fallen.len(),
        stash_gold = gauntlet.stash.gold,
        "gauntlet finished"
    );
    for member in &gauntlet.party {
        println!(
            "{:<12} {} {:>2}  HP {:>3}/{:<3} XP {:>6}  {} gp",
            member.name,
            member.class,
            member.level,
            member.hit_points.current,
            member.hit_points.maximum,
            member.experience,
            member.inventory.gold
        );
    }

    if gauntlet.phase == GauntletPhase::Victorious {
        for member in &gauntlet.party {
            let path = session.export_character(id, member.id).await?;
            info!(name = %member.name, path = %path.display(), "survivor exported");
        }
    }
    Ok(())
}

fn build_party(config: &CampaignConfig, seed: u64) -> Result<Vec<Character>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let roster = [
        ("Bruna", RaceType::Dwarf, CharacterClass::Fighter),
        ("Pell", RaceType::Human, CharacterClass::Wizard),
        ("Sister Ama", RaceType::Human, CharacterClass::Cleric),
        ("Quill", RaceType::Halfling, CharacterClass::Rogue),
    ];
    roster
        .into_iter()
        .take(config.rules.max_party_size)
        .map(|(name, race, class)| {
            CharacterBuilder::quick(name, race, class)
                .build_at_level(1, config.rules.hp_method, &mut rng)
                .with_context(|| format!("building {name}"))
        })
        .collect()
}

/// Settle pending choices, then rest.
async fn make_camp(session: &GauntletSession<FileStore>, id: GauntletId) -> Result<()> {
    let gauntlet = session.gauntlet(id).await?;
    if gauntlet.phase != GauntletPhase::Camp {
        return Ok(());
    }

    for member in &gauntlet.party {
        for choice in &member.pending_choices {
            let intent = match choice {
                PendingChoice::AbilityScoreImprovement { .. } => CampaignIntent::ApplyAsi {
                    character_id: member.id,
                    choice: pick_asi(member),
                },
                PendingChoice::Subclass { .. } => CampaignIntent::ChooseSubclass {
                    character_id: member.id,
                    subclass: default_subclass(member.class).to_string(),
                },
                // spell picks are left for a player to make
                _ => continue,
            };
            if let Err(err) = session.execute(id, intent).await {
                warn!(name = %member.name, %err, "choice skipped");
            }
        }
    }

    let gauntlet = session.gauntlet(id).await?;
    let badly_hurt = gauntlet
        .party
        .iter()
        .any(|c| c.hit_points.current * 2 < c.hit_points.maximum);
    if badly_hurt && gauntlet.long_rests_remaining > 0 {
        session.execute(id, CampaignIntent::LongRest).await?;
    } else {
        let hit_dice: BTreeMap<_, _> = gauntlet
            .party
            .iter()
            .filter(|c| c.hit_points.missing() > 0 && c.hit_dice.remaining > 0)
            .map(|c| (c.id, 1))
            .collect();
        session
            .execute(id, CampaignIntent::ShortRest { hit_dice })
            .await?;
    }
    Ok(())
}

fn pick_asi(character: &Character) -> AsiChoice {
    let priority = ability_priority(character.class);
    let score = |a: Ability| character.ability_scores.get(a);
    if let Some(&ability) = priority.iter().find(|&&a| score(a) <= 18) {
        return AsiChoice::Single(ability);
    }
    let open: Vec<Ability> = priority.iter().copied().filter(|&a| score(a) < 20).collect();
    match open.as_slice() {
        [first, second, ..] => AsiChoice::Split(*first, *second),
        _ => AsiChoice::Feat("Tough".to_string()),
    }
}

fn default_subclass(class: CharacterClass) -> &'static str {
    match class {
        CharacterClass::Barbarian => "Berserker",
        CharacterClass::Bard => "College of Lore",
        CharacterClass::Cleric => "Life Domain",
        CharacterClass::Druid => "Circle of the Land",
        CharacterClass::Fighter => "Champion",
        CharacterClass::Monk => "Way of the Open Hand",
        CharacterClass::Paladin => "Oath of Devotion",
        CharacterClass::Ranger => "Hunter",
        CharacterClass::Rogue => "Thief",
        CharacterClass::Sorcerer => "Draconic Bloodline",
        CharacterClass::Warlock => "The Fiend",
        CharacterClass::Wizard => "School of Evocation",
    }
}
