//! Participant - one cohort member tracked through the stage machine

use serde::{Deserialize, Serialize};

use super::{ExperimentId, ExperimentSettings, ParticipantId};
use crate::stage::{Stage, StageEvent, WaitPhase};
use crate::{Error, Result};

/// Participant record.
///
/// History vectors are indexed by round and aligned with the owning
/// experiment's. `contributions` may run one entry ahead of `finished_round`
/// between submission and settlement; `exclusion_votes` is pre-seeded with
/// one `None` so index 0 means "no vote before round 0".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    id: ParticipantId,
    id_in_game: u32,
    name: String,
    experiment_id: ExperimentId,
    experiment_settings: ExperimentSettings,
    stage: Stage,
    excluded: bool,
    finished_round: u32,
    contributions: Vec<u32>,
    claimed_contributions: Vec<u32>,
    incomes: Vec<f64>,
    claimed_incomes: Vec<f64>,
    exclusion_votes: Vec<Option<String>>,
    balance: f64,
    claimed_balance: f64,
}

/// Display name for the participant at 1-based position `id_in_game`.
#[must_use]
pub fn participant_name(id_in_game: u32) -> String {
    format!("Participant #{id_in_game}")
}

impl Participant {
    /// Create a participant in the `Instruction` stage.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier
    /// * `experiment_id` - Owning experiment
    /// * `id_in_game` - 1-based position in the cohort
    /// * `settings` - Copy of the owning experiment's settings
    #[must_use]
    pub fn new(
        id: ParticipantId,
        experiment_id: ExperimentId,
        id_in_game: u32,
        settings: ExperimentSettings,
    ) -> Self {
        Self {
            id,
            id_in_game,
            name: participant_name(id_in_game),
            experiment_id,
            experiment_settings: settings,
            stage: Stage::Instruction,
            excluded: false,
            finished_round: 0,
            contributions: Vec::new(),
            claimed_contributions: Vec::new(),
            incomes: Vec::new(),
            claimed_incomes: Vec::new(),
            exclusion_votes: vec![None],
            balance: 0.0,
            claimed_balance: 0.0,
        }
    }

    /// Get the participant ID.
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// 1-based position in the cohort.
    #[must_use]
    pub const fn id_in_game(&self) -> u32 {
        self.id_in_game
    }

    /// Display name, e.g. "Participant #3".
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning experiment.
    #[must_use]
    pub const fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    /// Settings captured at creation.
    #[must_use]
    pub const fn experiment_settings(&self) -> &ExperimentSettings {
        &self.experiment_settings
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether the participant sits out the current round.
    #[must_use]
    pub const fn excluded(&self) -> bool {
        self.excluded
    }

    /// Rounds this participant has completed.
    #[must_use]
    pub const fn finished_round(&self) -> u32 {
        self.finished_round
    }

    /// Actual contributions per round.
    #[must_use]
    pub fn contributions(&self) -> &[u32] {
        &self.contributions
    }

    /// Claimed contributions per round.
    #[must_use]
    pub fn claimed_contributions(&self) -> &[u32] {
        &self.claimed_contributions
    }

    /// Actual income per settled round.
    #[must_use]
    pub fn incomes(&self) -> &[f64] {
        &self.incomes
    }

    /// Claimed income per settled round.
    #[must_use]
    pub fn claimed_incomes(&self) -> &[f64] {
        &self.claimed_incomes
    }

    /// Exclusion votes per round (`None` = voted for nobody).
    #[must_use]
    pub fn exclusion_votes(&self) -> &[Option<String>] {
        &self.exclusion_votes
    }

    /// Running actual balance.
    #[must_use]
    pub const fn balance(&self) -> f64 {
        self.balance
    }

    /// Running claimed balance.
    #[must_use]
    pub const fn claimed_balance(&self) -> f64 {
        self.claimed_balance
    }

    /// Actual contribution for `round`, if submitted.
    #[must_use]
    pub fn contribution(&self, round: u32) -> Option<u32> {
        self.contributions.get(round as usize).copied()
    }

    /// Claimed contribution for `round`, if submitted.
    #[must_use]
    pub fn claimed_contribution(&self, round: u32) -> Option<u32> {
        self.claimed_contributions.get(round as usize).copied()
    }

    /// Name voted for in `round`, if the participant voted for someone.
    #[must_use]
    pub fn vote_in_round(&self, round: u32) -> Option<&str> {
        self.exclusion_votes
            .get(round as usize)
            .and_then(Option::as_deref)
    }

    /// Whether a contribution was already recorded for the current round.
    #[must_use]
    pub fn has_contributed_this_round(&self) -> bool {
        self.contributions.len() != self.finished_round as usize
    }

    /// Whether an exclusion vote was already recorded for the current round.
    #[must_use]
    pub fn has_voted_this_round(&self) -> bool {
        self.exclusion_votes.len() != self.finished_round as usize
    }

    /// Which step this participant is waiting on peers for.
    ///
    /// `None` unless the participant is in [`Stage::Wait`].
    #[must_use]
    pub fn wait_phase(&self) -> Option<WaitPhase> {
        if self.stage != Stage::Wait {
            return None;
        }
        let settled = self.finished_round as usize;
        let phase = if settled == 0 && self.contributions.is_empty() {
            WaitPhase::Comprehension
        } else if self.contributions.len() == settled + 1 {
            WaitPhase::Contribution
        } else {
            WaitPhase::Exclusion
        };
        Some(phase)
    }

    /// Drive the stage machine. No state changes on error.
    pub(crate) fn apply(&mut self, event: StageEvent) -> Result<Stage> {
        self.stage = self.stage.apply(event)?;
        Ok(self.stage)
    }

    /// Clear round-0 bookkeeping after a passed comprehension test.
    pub(crate) fn reset_for_first_round(&mut self) {
        self.finished_round = 0;
        self.excluded = false;
        self.contributions.clear();
        self.claimed_contributions.clear();
        self.incomes.clear();
        self.claimed_incomes.clear();
        self.exclusion_votes = vec![None];
        self.balance = 0.0;
        self.claimed_balance = 0.0;
    }

    pub(crate) fn record_contribution(&mut self, contribution: u32, claimed: u32) {
        self.contributions.push(contribution);
        self.claimed_contributions.push(claimed);
    }

    pub(crate) fn record_vote(&mut self, vote: Option<String>) {
        self.exclusion_votes.push(vote);
    }

    pub(crate) fn set_excluded(&mut self, excluded: bool) {
        self.excluded = excluded;
    }

    /// Book one settled round.
    pub(crate) fn settle(&mut self, income: f64, claimed_income: f64) {
        self.incomes.push(income);
        self.claimed_incomes.push(claimed_income);
        self.balance += income;
        self.claimed_balance += claimed_income;
        self.finished_round += 1;
    }

    /// Verify the per-round length invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] describing the first mismatch.
    pub fn check_invariants(&self) -> Result<()> {
        let settled = self.finished_round as usize;
        let fail = |what: String| {
            Err(Error::InvariantViolation(format!(
                "participant {}: {what}",
                self.id
            )))
        };

        if self.contributions.len() != self.claimed_contributions.len() {
            return fail(format!(
                "len(contributions) = {}, len(claimed_contributions) = {}",
                self.contributions.len(),
                self.claimed_contributions.len()
            ));
        }
        if !(settled..=settled + 1).contains(&self.contributions.len()) {
            return fail(format!(
                "len(contributions) = {}, finished_round = {settled}",
                self.contributions.len()
            ));
        }
        if self.incomes.len() != settled || self.claimed_incomes.len() != settled {
            return fail(format!(
                "len(incomes) = {}, len(claimed_incomes) = {}, finished_round = {settled}",
                self.incomes.len(),
                self.claimed_incomes.len()
            ));
        }
        if self.exclusion_votes.is_empty() || self.exclusion_votes.len() > settled + 1 {
            return fail(format!(
                "len(exclusion_votes) = {}, finished_round = {settled}",
                self.exclusion_votes.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Participant {
        Participant::new(
            ParticipantId::new(5),
            ExperimentId::new(1),
            3,
            ExperimentSettings::new(4, 2),
        )
    }

    #[test]
    fn test_new_participant() {
        let part = sample();
        assert_eq!(part.name(), "Participant #3");
        assert_eq!(part.stage(), Stage::Instruction);
        assert_eq!(part.exclusion_votes(), &[None]);
        assert!(part.wait_phase().is_none());
        part.check_invariants().unwrap();
    }

    #[test]
    fn test_wait_phase_tracks_progress() {
        let mut part = sample();
        part.apply(StageEvent::ComprehensionPassed).unwrap();
        assert_eq!(part.wait_phase(), Some(WaitPhase::Comprehension));

        part.apply(StageEvent::BarrierReleased(WaitPhase::Comprehension))
            .unwrap();
        part.record_contribution(4, 4);
        part.apply(StageEvent::ContributionSubmitted).unwrap();
        assert!(part.has_contributed_this_round());
        assert_eq!(part.wait_phase(), Some(WaitPhase::Contribution));

        part.settle(12.0, 12.0);
        part.apply(StageEvent::BarrierReleased(WaitPhase::Contribution))
            .unwrap();
        part.apply(StageEvent::ReadyForNextRound {
            game_over: false,
            kick_enabled: true,
            excluded: false,
        })
        .unwrap();
        part.record_vote(None);
        part.apply(StageEvent::ExclusionVoteSubmitted).unwrap();
        assert_eq!(part.wait_phase(), Some(WaitPhase::Exclusion));
        part.check_invariants().unwrap();
    }

    #[test]
    fn test_failed_apply_leaves_stage() {
        let mut part = sample();
        assert!(part.apply(StageEvent::ExclusionVoteSubmitted).is_err());
        assert_eq!(part.stage(), Stage::Instruction);
    }

    #[test]
    fn test_settle_updates_balances() {
        let mut part = sample();
        part.record_contribution(0, 10);
        part.settle(23.0, 15.0);
        assert_eq!(part.finished_round(), 1);
        assert!((part.balance() - 23.0).abs() < 1e-9);
        assert!((part.claimed_balance() - 15.0).abs() < 1e-9);
        part.check_invariants().unwrap();
    }
}
