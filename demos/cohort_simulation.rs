//! Cohort Simulation: a full public-goods game with peer exclusion
//!
//! Simulates a cohort of four playing three rounds with exclusion and
//! reputation faking enabled. Participant #4 free-rides while claiming to
//! contribute everything, gets voted out, and sits out the last round.
//!
//! Configuration comes from the environment (`PGG_PASSCODE`,
//! `PGG_MAX_PART_SIZE`, `PGG_RNG_SEED`); log level from `RUST_LOG`.
//!
//! Run with: cargo run --example cohort_simulation

use std::collections::HashMap;

use anyhow::{Context, Result};
use public_goods::experiment::{ExperimentSettings, RecordStore};
use public_goods::kv::MemoryKvStore;
use public_goods::{telemetry, EngineConfig, RoundCoordinator, Stage};

const FREE_RIDER: &str = "Participant #4";

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = EngineConfig::from_env().context("reading PGG_* environment")?;
    let passcode = config.passcode.clone();
    let coordinator = RoundCoordinator::builder(RecordStore::new(MemoryKvStore::new()))
        .config(config)
        .build()?;

    println!("=== Public Goods Game: Cohort Simulation ===\n");
    let settings = ExperimentSettings::new(4, 3)
        .with_kick(true)
        .with_fake_reputation(true);
    let id = coordinator.create_experiment(&passcode, settings).await?;
    let parts = coordinator.read_experiment(id).await?.participants().to_vec();
    println!("Created experiment {id} with {} participants\n", parts.len());

    let answers: HashMap<String, String> = [("q1", "c"), ("q2", "b")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for &pid in &parts {
        coordinator.submit_comprehension_answers(pid, &answers).await?;
    }

    for round in 0..settings.num_rounds {
        for &pid in &parts {
            let part = coordinator.read_participant(pid).await?;
            let (actual, claimed) = if part.name() == FREE_RIDER {
                ("0", "10")
            } else {
                ("8", "8")
            };
            coordinator.submit_contribution(pid, actual, Some(claimed)).await?;
        }

        let report = coordinator.round_report(parts[0], round).await?;
        println!("=== Round {} ===", round + 1);
        println!(
            "  Fund: {:.0} (claimed {:.0}) x {:.1} = {:.1}",
            report.fund, report.claimed_fund, report.multiplier, report.earnings
        );
        if let Some(kicked) = &report.kicked {
            println!("  Sitting out: {kicked}");
        }
        for &pid in &parts {
            let part = coordinator.read_participant(pid).await?;
            println!(
                "  {:<15} income {:>6.2}  balance {:>6.2}  (shown as {:>6.2})",
                part.name(),
                part.incomes()[round as usize],
                part.balance(),
                part.claimed_balance()
            );
        }
        println!();

        for &pid in &parts {
            coordinator.ready_for_next_round(pid).await?;
        }
        for &pid in &parts {
            let part = coordinator.read_participant(pid).await?;
            if part.stage() == Stage::ExclusionVote {
                let vote = if part.name() == FREE_RIDER {
                    "None"
                } else {
                    FREE_RIDER
                };
                coordinator.submit_exclusion_vote(pid, vote).await?;
            }
        }
    }

    let full = coordinator.load_full_experiment(id).await?;
    full.check_invariants()?;
    println!("=== Final Balances ===");
    for part in &full.participants {
        println!("  {:<15} {:>6.2}", part.name(), part.balance());
    }
    Ok(())
}
