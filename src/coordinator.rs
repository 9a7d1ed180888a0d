//! Round coordinator
//!
//! Public entry point of the engine. Every state-changing operation:
//!
//! 1. resolves the participant's experiment and takes its cohort lock
//! 2. re-reads the participant under the lock and validates the event
//! 3. evaluates the round barrier against the updated participant
//! 4. writes the participant alone, or, if the barrier fires, settles or
//!    resolves the phase and writes the experiment and whole cohort (the
//!    triggering participant included) in one batch
//!
//! all before releasing the lock. A failed write leaves the stored cohort
//! as it was, so the request can simply be retried. A request whose peers are not ready
//! returns [`BarrierOutcome::Pending`] immediately.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::barrier::{self, BarrierOutcome, BarrierState, CohortGuard, CohortLocks};
use crate::comprehension::{AnswerKey, StandardAnswerKey};
use crate::config::EngineConfig;
use crate::exclusion::{self, RandomSource, SeededRandom};
use crate::experiment::{
    participant_name, Experiment, ExperimentId, ExperimentSettings, FullExperiment, Participant,
    ParticipantId, RecordStore,
};
use crate::kv::{KvStore, MemoryKvStore};
use crate::report::{self, RoundReport};
use crate::settlement;
use crate::stage::{Stage, StageEvent, WaitPhase};
use crate::{Error, Result};

/// Vote value meaning "exclude nobody".
pub const NO_EXCLUSION_VOTE: &str = "None";

/// Result of a comprehension test submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComprehensionResult {
    /// Legends of the missed questions; empty on a pass.
    pub missed_questions: Vec<String>,
    /// Barrier state after a pass.
    pub barrier: BarrierOutcome,
}

impl ComprehensionResult {
    /// Whether every question was answered correctly.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.missed_questions.is_empty()
    }
}

/// Result of "ready for next round".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextRound {
    /// Stage the participant moved to.
    pub stage: Stage,
    /// Barrier state if the participant moved to `Wait`.
    pub barrier: BarrierOutcome,
}

/// Orchestrates the stage machine, barrier, settlement and exclusion.
pub struct RoundCoordinator<S> {
    store: RecordStore<S>,
    answer_key: Arc<dyn AnswerKey>,
    random: Arc<dyn RandomSource>,
    config: EngineConfig,
    locks: CohortLocks,
}

impl RoundCoordinator<MemoryKvStore> {
    /// Coordinator over a fresh in-memory store with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: RecordStore::new(MemoryKvStore::new()),
            answer_key: Arc::new(StandardAnswerKey::new()),
            random: Arc::new(SeededRandom::from_entropy()),
            config: EngineConfig::default(),
            locks: CohortLocks::new(),
        }
    }
}

impl<S: KvStore> RoundCoordinator<S> {
    /// Create a coordinator builder over `store`.
    #[must_use]
    pub fn builder(store: RecordStore<S>) -> RoundCoordinatorBuilder<S> {
        RoundCoordinatorBuilder::new(store)
    }

    /// Underlying record store.
    #[must_use]
    pub const fn store(&self) -> &RecordStore<S> {
        &self.store
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Experiment lifecycle
    // ------------------------------------------------------------------

    /// Create an experiment and its cohort.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] on a wrong passcode, [`Error::InvalidInput`]
    /// on invalid settings.
    #[instrument(skip(self, passcode))]
    pub async fn create_experiment(
        &self,
        passcode: &str,
        settings: ExperimentSettings,
    ) -> Result<ExperimentId> {
        if passcode != self.config.passcode {
            warn!("experiment creation rejected: wrong passcode");
            return Err(Error::Unauthorized);
        }
        settings.validate(self.config.max_part_size)?;

        let (experiment, _) = self.store.create_cohort(settings, Utc::now()).await?;
        info!(
            experiment = %experiment.id(),
            part_size = settings.part_size,
            num_rounds = settings.num_rounds,
            kick = settings.kick_enabled,
            fake_reputation = settings.fake_reputation_enabled,
            "experiment created"
        );
        Ok(experiment.id())
    }

    /// All experiments, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_experiments(&self) -> Result<Vec<Experiment>> {
        self.store.list_experiments().await
    }

    /// Read one experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn read_experiment(&self, id: ExperimentId) -> Result<Experiment> {
        self.store.read_experiment(id).await
    }

    /// Read one participant.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn read_participant(&self, id: ParticipantId) -> Result<Participant> {
        self.store.read_participant(id).await
    }

    /// Read an experiment with its cohort sorted by `id_in_game`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the experiment or any member is missing.
    pub async fn load_full_experiment(&self, id: ExperimentId) -> Result<FullExperiment> {
        let experiment = self.store.read_experiment(id).await?;
        let participants = self.store.read_participants(experiment.participants()).await?;
        Ok(FullExperiment {
            experiment,
            participants,
        })
    }

    /// The report of a settled `round` as `participant_id` sees it.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown participant, [`Error::InvalidInput`]
    /// for an unsettled round.
    pub async fn round_report(&self, participant_id: ParticipantId, round: u32) -> Result<RoundReport> {
        let participant = self.store.read_participant(participant_id).await?;
        let full = self.load_full_experiment(participant.experiment_id()).await?;
        report::round_report(&full, participant_id, round)
    }

    // ------------------------------------------------------------------
    // Round operations
    // ------------------------------------------------------------------

    /// Grade the comprehension test.
    ///
    /// On a pass, round-0 bookkeeping is cleared and the participant waits
    /// for the rest of the cohort. On a miss nothing changes.
    ///
    /// # Errors
    ///
    /// [`Error::StageViolation`] unless the participant is in `Instruction`.
    #[instrument(skip(self, answers))]
    pub async fn submit_comprehension_answers(
        &self,
        participant_id: ParticipantId,
        answers: &HashMap<String, String>,
    ) -> Result<ComprehensionResult> {
        let (_guard, mut participant) = self.lock_participant(participant_id).await?;

        let missed_questions = self.answer_key.missed_questions(answers);
        if !missed_questions.is_empty() {
            participant
                .stage()
                .apply(StageEvent::ComprehensionFailed)
                .inspect_err(|e| warn!(error = %e, "comprehension submission rejected"))?;
            debug!(missed = missed_questions.len(), "comprehension test failed");
            return Ok(ComprehensionResult {
                missed_questions,
                barrier: BarrierOutcome::NotApplicable,
            });
        }

        participant
            .apply(StageEvent::ComprehensionPassed)
            .inspect_err(|e| warn!(error = %e, "comprehension submission rejected"))?;
        participant.reset_for_first_round();
        debug!("comprehension test passed");

        let barrier = self.commit(participant).await?;
        Ok(ComprehensionResult {
            missed_questions,
            barrier,
        })
    }

    /// Record this round's contribution.
    ///
    /// `claimed` is ignored (forced equal to `contribution`) unless the
    /// experiment enables reputation faking. Excluded participants always
    /// record 0 for both, whatever was submitted.
    ///
    /// # Errors
    ///
    /// [`Error::StageViolation`] unless in `SelectContribution`;
    /// [`Error::InvalidInput`] for unparsable or out-of-range values, a claim
    /// below the actual contribution, or a repeated submission.
    #[instrument(skip(self))]
    pub async fn submit_contribution(
        &self,
        participant_id: ParticipantId,
        contribution: &str,
        claimed: Option<&str>,
    ) -> Result<BarrierOutcome> {
        let (_guard, mut participant) = self.lock_participant(participant_id).await?;

        participant
            .stage()
            .apply(StageEvent::ContributionSubmitted)
            .inspect_err(|e| warn!(error = %e, "contribution rejected"))?;
        if participant.has_contributed_this_round() {
            warn!("contribution rejected: already recorded this round");
            return Err(Error::InvalidInput(format!(
                "a contribution was already recorded for round {}",
                participant.finished_round()
            )));
        }

        let (actual, claimed) = self
            .parse_contribution(&participant, contribution, claimed)
            .inspect_err(|e| warn!(error = %e, "contribution rejected"))?;
        participant.record_contribution(actual, claimed);
        participant.apply(StageEvent::ContributionSubmitted)?;
        debug!(actual, claimed, "contribution recorded");

        self.commit(participant).await
    }

    /// Leave the result screen.
    ///
    /// Moves to `Final` after the last round, otherwise to the next
    /// contribution, the exclusion vote, or (for a participant who just sat
    /// out) straight to `Wait`.
    ///
    /// # Errors
    ///
    /// [`Error::StageViolation`] unless in `ViewResult`.
    #[instrument(skip(self))]
    pub async fn ready_for_next_round(&self, participant_id: ParticipantId) -> Result<NextRound> {
        let (_guard, mut participant) = self.lock_participant(participant_id).await?;
        let experiment = self.store.read_experiment(participant.experiment_id()).await?;

        let stage = participant
            .apply(StageEvent::ReadyForNextRound {
                game_over: experiment.is_finished(),
                kick_enabled: participant.experiment_settings().kick_enabled,
                excluded: participant.excluded(),
            })
            .inspect_err(|e| warn!(error = %e, "next round rejected"))?;
        debug!(%stage, "advanced past result");

        let barrier = if stage == Stage::Wait {
            // Sitting out the vote; keep the vote history aligned.
            participant.record_vote(None);
            self.commit(participant).await?
        } else {
            participant.check_invariants()?;
            self.store.write_participant(&participant).await?;
            BarrierOutcome::NotApplicable
        };
        Ok(NextRound { stage, barrier })
    }

    /// Record an exclusion vote: a cohort member's name or `"None"`.
    ///
    /// # Errors
    ///
    /// [`Error::StageViolation`] unless in `ExclusionVote`;
    /// [`Error::InvalidInput`] for an unknown name or a repeated vote.
    #[instrument(skip(self))]
    pub async fn submit_exclusion_vote(
        &self,
        participant_id: ParticipantId,
        vote: &str,
    ) -> Result<BarrierOutcome> {
        let (_guard, mut participant) = self.lock_participant(participant_id).await?;

        participant
            .stage()
            .apply(StageEvent::ExclusionVoteSubmitted)
            .inspect_err(|e| warn!(error = %e, "exclusion vote rejected"))?;
        if participant.has_voted_this_round() {
            warn!("exclusion vote rejected: already recorded this round");
            return Err(Error::InvalidInput(format!(
                "an exclusion vote was already recorded for round {}",
                participant.finished_round()
            )));
        }

        let target = parse_vote(&participant, vote)
            .inspect_err(|e| warn!(error = %e, "exclusion vote rejected"))?;
        debug!(
            vote_for = target.as_deref().unwrap_or(NO_EXCLUSION_VOTE),
            "exclusion vote recorded"
        );
        participant.record_vote(target);
        participant.apply(StageEvent::ExclusionVoteSubmitted)?;

        self.commit(participant).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Take the cohort lock for a participant and read it fresh.
    async fn lock_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<(CohortGuard<'_>, Participant)> {
        // experiment_id never changes, so this unlocked read is safe.
        let experiment_id = self.store.read_participant(participant_id).await?.experiment_id();
        let guard = self.locks.acquire(experiment_id).await;
        let participant = self.store.read_participant(participant_id).await?;
        Ok((guard, participant))
    }

    /// Persist a participant that just moved to `Wait`, firing the barrier
    /// if the whole cohort now waits on one phase.
    ///
    /// Nothing is written until the barrier is evaluated: a pending cohort
    /// stores the participant alone, a released one stores the participant,
    /// its peers and the experiment in a single batch.
    ///
    /// Caller must hold the experiment's cohort lock.
    async fn commit(&self, participant: Participant) -> Result<BarrierOutcome> {
        participant.check_invariants()?;
        let experiment_id = participant.experiment_id();
        let mut full = self.load_full_experiment(experiment_id).await?;
        let Some(position) = full
            .participants
            .iter()
            .position(|p| p.id() == participant.id())
        else {
            return Err(Error::InvariantViolation(format!(
                "participant {} is not in the cohort of experiment {experiment_id}",
                participant.id()
            )));
        };
        full.participants[position] = participant;

        let phase = match barrier::evaluate(&full.participants) {
            BarrierState::Pending { ready, total } => {
                self.store
                    .write_participant(&full.participants[position])
                    .await?;
                debug!(%experiment_id, ready, total, "barrier pending");
                return Ok(BarrierOutcome::Pending { ready, total });
            }
            BarrierState::Ready(phase) => phase,
        };

        match phase {
            WaitPhase::Comprehension => {
                for participant in &mut full.participants {
                    participant.apply(StageEvent::BarrierReleased(phase))?;
                }
            }
            WaitPhase::Contribution => {
                let outcome = settlement::settle(
                    &mut full.experiment,
                    &mut full.participants,
                    &self.config.rules,
                )?;
                info!(
                    %experiment_id,
                    round = full.experiment.finished_round(),
                    fund = outcome.totals.fund,
                    claimed_fund = outcome.totals.claimed_fund,
                    multiplier = outcome.totals.multiplier,
                    earnings = outcome.totals.earnings,
                    "round settled"
                );
            }
            WaitPhase::Exclusion => {
                let outcome = exclusion::resolve(
                    &mut full.experiment,
                    &mut full.participants,
                    self.random.as_ref(),
                )?;
                info!(
                    %experiment_id,
                    round = outcome.round,
                    candidates = outcome.candidates.len(),
                    kicked = outcome.kicked.as_deref().unwrap_or(NO_EXCLUSION_VOTE),
                    "exclusion resolved"
                );
            }
        }

        full.check_invariants()?;
        self.store
            .write_cohort(&full.experiment, &full.participants)
            .await?;
        info!(%experiment_id, %phase, "barrier released");
        Ok(BarrierOutcome::Released(phase))
    }

    fn parse_contribution(
        &self,
        participant: &Participant,
        contribution: &str,
        claimed: Option<&str>,
    ) -> Result<(u32, u32)> {
        if participant.excluded() {
            return Ok((0, 0));
        }

        let max = self.config.rules.endowment;
        let actual = parse_points("contribution", contribution, max)?;
        if !participant.experiment_settings().fake_reputation_enabled {
            return Ok((actual, actual));
        }

        let raw_claimed = claimed.ok_or_else(|| {
            Error::InvalidInput("claimed contribution is required".to_string())
        })?;
        let claimed = parse_points("claimed contribution", raw_claimed, max)?;
        if claimed < actual {
            return Err(Error::InvalidInput(format!(
                "claimed contribution ({claimed}) can not be lower than actual contribution ({actual})"
            )));
        }
        Ok((actual, claimed))
    }
}

fn parse_points(field: &str, raw: &str, max: u32) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|points| *points <= max)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "{field} must be an integer between 0 and {max}, got '{raw}'"
            ))
        })
}

/// Votes must match a member name or [`NO_EXCLUSION_VOTE`] exactly.
fn parse_vote(participant: &Participant, vote: &str) -> Result<Option<String>> {
    if vote == NO_EXCLUSION_VOTE {
        return Ok(None);
    }
    let part_size = participant.experiment_settings().part_size;
    let is_member = (1..=part_size)
        .filter_map(|position| u32::try_from(position).ok())
        .any(|position| participant_name(position) == vote);
    if is_member {
        Ok(Some(vote.to_string()))
    } else {
        Err(Error::InvalidInput(format!(
            "'{vote}' is not a participant of this experiment"
        )))
    }
}

/// Builder for `RoundCoordinator`.
pub struct RoundCoordinatorBuilder<S> {
    store: RecordStore<S>,
    answer_key: Option<Arc<dyn AnswerKey>>,
    random: Option<Arc<dyn RandomSource>>,
    config: EngineConfig,
}

impl<S: KvStore> RoundCoordinatorBuilder<S> {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(store: RecordStore<S>) -> Self {
        Self {
            store,
            answer_key: None,
            random: None,
            config: EngineConfig::default(),
        }
    }

    /// Set the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the comprehension answer key (default: [`StandardAnswerKey`]).
    #[must_use]
    pub fn answer_key(mut self, answer_key: Arc<dyn AnswerKey>) -> Self {
        self.answer_key = Some(answer_key);
        self
    }

    /// Set the exclusion tie-break source.
    ///
    /// Defaults to [`SeededRandom`], seeded from `config.rng_seed` if set.
    #[must_use]
    pub fn random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Build the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is inconsistent.
    pub fn build(self) -> Result<RoundCoordinator<S>> {
        self.config.validate()?;
        let random: Arc<dyn RandomSource> = match (self.random, self.config.rng_seed) {
            (Some(random), _) => random,
            (None, Some(seed)) => Arc::new(SeededRandom::seeded(seed)),
            (None, None) => Arc::new(SeededRandom::from_entropy()),
        };
        let answer_key: Arc<dyn AnswerKey> = match self.answer_key {
            Some(answer_key) => answer_key,
            None => Arc::new(StandardAnswerKey::new()),
        };
        Ok(RoundCoordinator {
            store: self.store,
            answer_key,
            random,
            config: self.config,
            locks: CohortLocks::new(),
        })
    }
}
