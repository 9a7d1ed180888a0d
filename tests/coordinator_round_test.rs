//! Integration tests for the round coordinator: normal multi-round play
//!
//! Drives a whole cohort through comprehension, contribution and result
//! screens against the in-memory store.

use std::collections::HashMap;

use public_goods::experiment::{ExperimentId, ExperimentSettings, ParticipantId};
use public_goods::{BarrierOutcome, Error, RoundCoordinator, Stage, WaitPhase};

const EPS: f64 = 1e-9;

fn correct_answers() -> HashMap<String, String> {
    [("q1", "c"), ("q2", "b")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn cohort(
    coordinator: &RoundCoordinator<public_goods::kv::MemoryKvStore>,
    settings: ExperimentSettings,
) -> (ExperimentId, Vec<ParticipantId>) {
    let id = coordinator.create_experiment("pg", settings).await.unwrap();
    let experiment = coordinator.read_experiment(id).await.unwrap();
    (id, experiment.participants().to_vec())
}

async fn pass_comprehension(
    coordinator: &RoundCoordinator<public_goods::kv::MemoryKvStore>,
    parts: &[ParticipantId],
) {
    for &pid in parts {
        let result = coordinator
            .submit_comprehension_answers(pid, &correct_answers())
            .await
            .unwrap();
        assert!(result.passed());
    }
}

#[tokio::test]
async fn test_new_cohort_starts_in_instruction() {
    let coordinator = RoundCoordinator::in_memory();
    let (id, parts) = cohort(&coordinator, ExperimentSettings::new(3, 2)).await;

    let full = coordinator.load_full_experiment(id).await.unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(full.experiment.finished_round(), 0);
    assert_eq!(full.experiment.kicked_parts(), &[None]);
    for (i, part) in full.participants.iter().enumerate() {
        assert_eq!(part.stage(), Stage::Instruction);
        assert_eq!(part.name(), format!("Participant #{}", i + 1));
        assert_eq!(part.exclusion_votes(), &[None]);
    }
    full.check_invariants().unwrap();
}

#[tokio::test]
async fn test_failed_comprehension_changes_nothing() {
    let coordinator = RoundCoordinator::in_memory();
    let (_, parts) = cohort(&coordinator, ExperimentSettings::new(2, 1)).await;

    let mut answers = correct_answers();
    answers.insert("q2".to_string(), "a".to_string());
    let result = coordinator
        .submit_comprehension_answers(parts[0], &answers)
        .await
        .unwrap();

    assert!(!result.passed());
    assert_eq!(result.missed_questions, vec!["Question 2".to_string()]);
    assert_eq!(result.barrier, BarrierOutcome::NotApplicable);
    let part = coordinator.read_participant(parts[0]).await.unwrap();
    assert_eq!(part.stage(), Stage::Instruction);
}

#[tokio::test]
async fn test_comprehension_barrier_releases_on_last_pass() {
    let coordinator = RoundCoordinator::in_memory();
    let (_, parts) = cohort(&coordinator, ExperimentSettings::new(3, 1)).await;

    let first = coordinator
        .submit_comprehension_answers(parts[0], &correct_answers())
        .await
        .unwrap();
    assert_eq!(first.barrier, BarrierOutcome::Pending { ready: 1, total: 3 });
    assert_eq!(
        coordinator.read_participant(parts[0]).await.unwrap().stage(),
        Stage::Wait
    );

    coordinator
        .submit_comprehension_answers(parts[1], &correct_answers())
        .await
        .unwrap();
    let last = coordinator
        .submit_comprehension_answers(parts[2], &correct_answers())
        .await
        .unwrap();
    assert_eq!(last.barrier, BarrierOutcome::Released(WaitPhase::Comprehension));

    for &pid in &parts {
        let part = coordinator.read_participant(pid).await.unwrap();
        assert_eq!(part.stage(), Stage::SelectContribution);
    }
}

#[tokio::test]
async fn test_full_game_without_exclusion() {
    let coordinator = RoundCoordinator::in_memory();
    let (id, parts) = cohort(&coordinator, ExperimentSettings::new(4, 2)).await;
    pass_comprehension(&coordinator, &parts).await;

    // Round 0: everybody contributes everything.
    for (i, &pid) in parts.iter().enumerate() {
        let outcome = coordinator.submit_contribution(pid, "10", None).await.unwrap();
        if i + 1 < parts.len() {
            assert!(!outcome.is_released());
        } else {
            assert_eq!(outcome, BarrierOutcome::Released(WaitPhase::Contribution));
        }
    }
    let full = coordinator.load_full_experiment(id).await.unwrap();
    assert_eq!(full.experiment.finished_round(), 1);
    assert!((full.experiment.funds()[0] - 40.0).abs() < EPS);
    assert!((full.experiment.earnings()[0] - 80.0).abs() < EPS);
    for part in &full.participants {
        assert_eq!(part.stage(), Stage::ViewResult);
        assert!((part.balance() - 20.0).abs() < EPS);
    }

    for &pid in &parts {
        let next = coordinator.ready_for_next_round(pid).await.unwrap();
        assert_eq!(next.stage, Stage::SelectContribution);
        assert_eq!(next.barrier, BarrierOutcome::NotApplicable);
    }

    // Round 1: 10 / 8 / 8 / 6.
    for (&pid, amount) in parts.iter().zip(["10", "8", "8", "6"]) {
        coordinator.submit_contribution(pid, amount, None).await.unwrap();
    }
    let full = coordinator.load_full_experiment(id).await.unwrap();
    assert_eq!(full.experiment.finished_round(), 2);
    assert!((full.experiment.funds()[1] - 32.0).abs() < EPS);
    assert!((full.participants[0].incomes()[1] - 16.0).abs() < EPS);
    assert!((full.participants[3].incomes()[1] - 20.0).abs() < EPS);
    assert!((full.participants[3].balance() - 40.0).abs() < EPS);
    full.check_invariants().unwrap();

    // Last round settled: everybody finishes.
    for &pid in &parts {
        let next = coordinator.ready_for_next_round(pid).await.unwrap();
        assert_eq!(next.stage, Stage::Final);
    }
    let err = coordinator.ready_for_next_round(parts[0]).await.unwrap_err();
    assert!(matches!(err, Error::StageViolation { actual: Stage::Final, .. }));
}

#[tokio::test]
async fn test_out_of_order_operations_are_rejected() {
    let coordinator = RoundCoordinator::in_memory();
    let (_, parts) = cohort(&coordinator, ExperimentSettings::new(2, 1)).await;

    let err = coordinator.submit_contribution(parts[0], "5", None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::StageViolation {
            expected: Stage::SelectContribution,
            actual: Stage::Instruction,
            ..
        }
    ));
    assert!(matches!(
        coordinator.submit_exclusion_vote(parts[0], "None").await,
        Err(Error::StageViolation { .. })
    ));
    assert!(matches!(
        coordinator.ready_for_next_round(parts[0]).await,
        Err(Error::StageViolation { .. })
    ));

    pass_comprehension(&coordinator, &parts).await;
    assert!(matches!(
        coordinator
            .submit_comprehension_answers(parts[0], &correct_answers())
            .await,
        Err(Error::StageViolation { .. })
    ));

    coordinator.submit_contribution(parts[0], "5", None).await.unwrap();
    let err = coordinator.submit_contribution(parts[0], "5", None).await.unwrap_err();
    assert!(matches!(err, Error::StageViolation { actual: Stage::Wait, .. }));
}

#[tokio::test]
async fn test_invalid_contributions_leave_state_unchanged() {
    let coordinator = RoundCoordinator::in_memory();
    let (_, parts) = cohort(&coordinator, ExperimentSettings::new(2, 1)).await;
    pass_comprehension(&coordinator, &parts).await;

    for bad in ["11", "-1", "abc", "", "3.5"] {
        let err = coordinator.submit_contribution(parts[0], bad, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "accepted {bad:?}");
    }
    let part = coordinator.read_participant(parts[0]).await.unwrap();
    assert_eq!(part.stage(), Stage::SelectContribution);
    assert!(part.contributions().is_empty());

    // Claims are ignored without reputation faking.
    coordinator.submit_contribution(parts[0], "3", Some("9")).await.unwrap();
    let part = coordinator.read_participant(parts[0]).await.unwrap();
    assert_eq!(part.contributions(), &[3]);
    assert_eq!(part.claimed_contributions(), &[3]);
}

#[tokio::test]
async fn test_unknown_ids() {
    let coordinator = RoundCoordinator::in_memory();
    assert!(matches!(
        coordinator.read_participant(ParticipantId::new(404)).await,
        Err(Error::NotFound { kind: "participant", .. })
    ));
    assert!(matches!(
        coordinator.submit_contribution(ParticipantId::new(404), "1", None).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        coordinator.load_full_experiment(ExperimentId::new(404)).await,
        Err(Error::NotFound { kind: "experiment", .. })
    ));
}

#[tokio::test]
async fn test_round_report() {
    let coordinator = RoundCoordinator::in_memory();
    let (_, parts) = cohort(&coordinator, ExperimentSettings::new(2, 2)).await;
    pass_comprehension(&coordinator, &parts).await;

    assert!(matches!(
        coordinator.round_report(parts[0], 0).await,
        Err(Error::InvalidInput(_))
    ));

    coordinator.submit_contribution(parts[0], "4", None).await.unwrap();
    coordinator.submit_contribution(parts[1], "6", None).await.unwrap();

    let report = coordinator.round_report(parts[0], 0).await.unwrap();
    assert_eq!(report.round, 0);
    assert_eq!(report.viewer, "Participant #1");
    assert_eq!(report.contribution, 4);
    assert!((report.fund - 10.0).abs() < EPS);
    assert!((report.earnings - 20.0).abs() < EPS);
    // 10 - 4 + 20 / 2
    assert!((report.income - 16.0).abs() < EPS);
    assert!((report.balance - 16.0).abs() < EPS);
    assert_eq!(report.kicked, None);
    assert_eq!(report.peers.len(), 2);
    assert_eq!(report.peers[1].claimed_contribution, 6);
}
