//! Integration tests for experiment creation, listing and persistence
//!
//! Covers the passcode gate, settings validation, newest-first listing and
//! reopening a populated store.

use std::sync::Arc;

use public_goods::exclusion::SeededRandom;
use public_goods::experiment::{ExperimentSettings, RecordStore};
use public_goods::kv::{KvStore, MemoryKvStore};
use public_goods::{EngineConfig, Error, RoundCoordinator, Stage};

#[tokio::test]
async fn test_wrong_passcode_is_unauthorized() {
    let coordinator = RoundCoordinator::in_memory();
    let err = coordinator
        .create_experiment("letmein", ExperimentSettings::new(4, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
    assert!(coordinator.list_experiments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let coordinator = RoundCoordinator::in_memory();
    for settings in [
        ExperimentSettings::new(1, 2),
        ExperimentSettings::new(11, 2),
        ExperimentSettings::new(4, 0),
    ] {
        assert!(matches!(
            coordinator.create_experiment("pg", settings).await,
            Err(Error::InvalidInput(_))
        ));
    }
    assert!(coordinator.list_experiments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_passcode_and_bound() {
    let config = EngineConfig::from_lookup(|key| match key {
        "PGG_PASSCODE" => Some("secret".to_string()),
        "PGG_MAX_PART_SIZE" => Some("20".to_string()),
        _ => None,
    })
    .unwrap();
    let coordinator = RoundCoordinator::builder(RecordStore::new(MemoryKvStore::new()))
        .config(config)
        .random_source(Arc::new(SeededRandom::seeded(1)))
        .build()
        .unwrap();

    assert!(matches!(
        coordinator
            .create_experiment("pg", ExperimentSettings::new(4, 1))
            .await,
        Err(Error::Unauthorized)
    ));
    let id = coordinator
        .create_experiment("secret", ExperimentSettings::new(15, 1))
        .await
        .unwrap();
    let full = coordinator.load_full_experiment(id).await.unwrap();
    assert_eq!(full.participants.len(), 15);
    assert_eq!(full.participants[14].name(), "Participant #15");
}

#[tokio::test]
async fn test_list_newest_first() {
    let coordinator = RoundCoordinator::in_memory();
    let mut ids = Vec::new();
    for rounds in 1..=3 {
        ids.push(
            coordinator
                .create_experiment("pg", ExperimentSettings::new(2, rounds))
                .await
                .unwrap(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let listed: Vec<_> = coordinator
        .list_experiments()
        .await
        .unwrap()
        .iter()
        .map(public_goods::experiment::Experiment::id)
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_settings_are_copied_to_participants() {
    let coordinator = RoundCoordinator::in_memory();
    let settings = ExperimentSettings::new(3, 4)
        .with_kick(true)
        .with_fake_reputation(true);
    let id = coordinator.create_experiment("pg", settings).await.unwrap();

    let full = coordinator.load_full_experiment(id).await.unwrap();
    assert_eq!(full.experiment.settings(), &settings);
    for part in &full.participants {
        assert_eq!(part.experiment_settings(), &settings);
        assert_eq!(part.experiment_id(), id);
        assert_eq!(part.stage(), Stage::Instruction);
    }
}

#[tokio::test]
async fn test_reopened_store_keeps_records_and_ids() {
    let store = RecordStore::new(MemoryKvStore::new());
    let (first, _) = store
        .create_cohort(ExperimentSettings::new(2, 1), chrono::Utc::now())
        .await
        .unwrap();

    let reopened = RecordStore::open(store.into_kv()).await.unwrap();
    let coordinator = RoundCoordinator::builder(reopened).build().unwrap();
    assert_eq!(coordinator.read_experiment(first.id()).await.unwrap(), first);

    let second = coordinator
        .create_experiment("pg", ExperimentSettings::new(2, 1))
        .await
        .unwrap();
    assert!(second.get() > first.participants()[1].get());
    assert_eq!(coordinator.list_experiments().await.unwrap().len(), 2);
    assert_eq!(
        coordinator
            .store()
            .kv()
            .scan_prefix("participant:")
            .await
            .unwrap()
            .len(),
        4
    );
}
