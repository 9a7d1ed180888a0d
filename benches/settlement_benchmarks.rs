//! Settlement and round benchmarks
//!
//! - Pure settlement arithmetic across cohort sizes
//! - Majority tally for the exclusion vote
//! - One full round through the coordinator on the in-memory store
//!
//! Run with: cargo bench --bench settlement_benchmarks

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use public_goods::exclusion::majority_candidates;
use public_goods::experiment::ExperimentSettings;
use public_goods::settlement::{compute, Ballot};
use public_goods::{RoundCoordinator, SettlementRules};

const COHORT_SIZES: [usize; 3] = [2, 10, 1_000];

fn ballots(size: usize) -> Vec<Ballot> {
    (0..size)
        .map(|i| {
            let contribution = u32::try_from(i % 11).unwrap();
            Ballot {
                contribution,
                claimed_contribution: (contribution + 2).min(10),
                excluded: i == 0,
            }
        })
        .collect()
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement_compute");
    let rules = SettlementRules::default();

    for size in COHORT_SIZES {
        let data = ballots(size);
        group.bench_with_input(BenchmarkId::new("no_kick", size), &data, |b, data| {
            b.iter(|| compute(black_box(data), false, &rules));
        });
        group.bench_with_input(BenchmarkId::new("kick_active", size), &data, |b, data| {
            b.iter(|| compute(black_box(data), true, &rules));
        });
    }

    group.finish();
}

fn bench_majority(c: &mut Criterion) {
    let mut group = c.benchmark_group("exclusion_majority");

    for size in COHORT_SIZES {
        let names: Vec<String> = (1..=size).map(|i| format!("Participant #{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let votes: Vec<Option<&str>> = (0..size)
            .map(|i| if i % 3 == 0 { None } else { Some(refs[(i * 7) % size]) })
            .collect();
        group.bench_with_input(BenchmarkId::new("tally", size), &size, |b, &size| {
            b.iter(|| majority_candidates(black_box(&refs), black_box(&votes), size));
        });
    }

    group.finish();
}

fn bench_full_round(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let answers: HashMap<String, String> = [("q1", "c"), ("q2", "b")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    c.bench_function("coordinator_round_10_participants", |b| {
        b.to_async(&runtime).iter(|| async {
            let coordinator = RoundCoordinator::in_memory();
            let id = coordinator
                .create_experiment("pg", ExperimentSettings::new(10, 1))
                .await
                .unwrap();
            let parts = coordinator
                .read_experiment(id)
                .await
                .unwrap()
                .participants()
                .to_vec();
            for &pid in &parts {
                coordinator
                    .submit_comprehension_answers(pid, &answers)
                    .await
                    .unwrap();
            }
            for &pid in &parts {
                coordinator.submit_contribution(pid, "7", None).await.unwrap();
            }
            black_box(coordinator.load_full_experiment(id).await.unwrap())
        });
    });
}

criterion_group!(benches, bench_compute, bench_majority, bench_full_round);
criterion_main!(benches);
