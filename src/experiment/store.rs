//! Record Store - experiment and participant records over a `KvStore`
//!
//! Records are JSON-encoded under `experiment:{id}` and `participant:{id}`.
//! Ids come from a single counter shared by both kinds.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::{Experiment, ExperimentId, ExperimentSettings, Participant, ParticipantId};
use crate::kv::KvStore;
use crate::{Error, Result};

const EXPERIMENT_PREFIX: &str = "experiment:";
const PARTICIPANT_PREFIX: &str = "participant:";

fn experiment_key(id: ExperimentId) -> String {
    format!("{EXPERIMENT_PREFIX}{id}")
}

fn participant_key(id: ParticipantId) -> String {
    format!("{PARTICIPANT_PREFIX}{id}")
}

/// Storage gateway for experiment and participant records.
///
/// ## Consistency
///
/// Inherits per-key read-after-write consistency from the backend.
/// [`RecordStore::write_cohort`] encodes every record before handing one
/// batch to [`KvStore::batch_set`], so an experiment and its participants
/// are stored together or not at all.
#[derive(Debug)]
pub struct RecordStore<S> {
    kv: S,
    next_id: AtomicU64,
}

impl<S: KvStore> RecordStore<S> {
    /// Wrap an empty backend.
    #[must_use]
    pub const fn new(kv: S) -> Self {
        Self {
            kv,
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap a backend that may already hold records.
    ///
    /// The id counter resumes after the largest id found.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be scanned.
    pub async fn open(kv: S) -> Result<Self> {
        let mut max_id = 0;
        for prefix in [EXPERIMENT_PREFIX, PARTICIPANT_PREFIX] {
            for key in kv.scan_prefix(prefix).await? {
                if let Ok(id) = key[prefix.len()..].parse::<u64>() {
                    max_id = max_id.max(id);
                }
            }
        }
        Ok(Self {
            kv,
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    /// Underlying key-value backend.
    #[must_use]
    pub const fn kv(&self) -> &S {
        &self.kv
    }

    /// Release the backend, e.g. to reopen it later with [`RecordStore::open`].
    #[must_use]
    pub fn into_kv(self) -> S {
        self.kv
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create an experiment together with its full cohort.
    ///
    /// The experiment and every participant land in a single batch.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend fails.
    pub async fn create_cohort(
        &self,
        settings: ExperimentSettings,
        created_at: DateTime<Utc>,
    ) -> Result<(Experiment, Vec<Participant>)> {
        let experiment_id = ExperimentId::new(self.allocate_id());
        let participants: Vec<Participant> = (1..=settings.part_size)
            .map(|position| {
                Participant::new(
                    ParticipantId::new(self.allocate_id()),
                    experiment_id,
                    u32::try_from(position).unwrap_or(u32::MAX),
                    settings,
                )
            })
            .collect();

        let experiment = Experiment::builder(experiment_id, settings)
            .participants(participants.iter().map(Participant::id).collect())
            .created_at(created_at)
            .build();
        experiment.check_invariants()?;

        self.write_cohort(&experiment, &participants).await?;
        Ok((experiment, participants))
    }

    /// Read one experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn read_experiment(&self, id: ExperimentId) -> Result<Experiment> {
        let bytes = self
            .kv
            .get(&experiment_key(id))
            .await?
            .ok_or_else(|| Error::experiment_not_found(id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read one participant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn read_participant(&self, id: ParticipantId) -> Result<Participant> {
        let bytes = self
            .kv
            .get(&participant_key(id))
            .await?
            .ok_or_else(|| Error::participant_not_found(id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read many participants, ordered by `id_in_game`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if any id is unknown.
    pub async fn read_participants(&self, ids: &[ParticipantId]) -> Result<Vec<Participant>> {
        let keys: Vec<String> = ids.iter().copied().map(participant_key).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let values = self.kv.batch_get(&key_refs).await?;

        let mut participants = Vec::with_capacity(ids.len());
        for (id, value) in ids.iter().zip(values) {
            let bytes = value.ok_or_else(|| Error::participant_not_found(id))?;
            participants.push(serde_json::from_slice::<Participant>(&bytes)?);
        }
        participants.sort_by_key(Participant::id_in_game);
        Ok(participants)
    }

    /// Write one participant.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend fails.
    pub async fn write_participant(&self, participant: &Participant) -> Result<()> {
        let bytes = serde_json::to_vec(participant)?;
        self.kv.set(&participant_key(participant.id()), bytes).await
    }

    /// Write an experiment and its participants as one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend fails. Encoding errors
    /// are reported before anything is written.
    pub async fn write_cohort(
        &self,
        experiment: &Experiment,
        participants: &[Participant],
    ) -> Result<()> {
        let mut keys: Vec<String> = participants
            .iter()
            .map(|p| participant_key(p.id()))
            .collect();
        keys.push(experiment_key(experiment.id()));

        let mut values = Vec::with_capacity(keys.len());
        for participant in participants {
            values.push(serde_json::to_vec(participant)?);
        }
        values.push(serde_json::to_vec(experiment)?);

        let pairs = keys.iter().map(String::as_str).zip(values).collect();
        self.kv.batch_set(pairs).await
    }

    /// All experiments, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or a record cannot be decoded.
    pub async fn list_experiments(&self) -> Result<Vec<Experiment>> {
        let keys = self.kv.scan_prefix(EXPERIMENT_PREFIX).await?;
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mut experiments = Vec::with_capacity(keys.len());
        for bytes in self.kv.batch_get(&key_refs).await?.into_iter().flatten() {
            experiments.push(serde_json::from_slice::<Experiment>(&bytes)?);
        }
        experiments.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(experiments)
    }
}
