//! Experiment - one run of the game with a fixed cohort

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExperimentId, ExperimentSettings, ParticipantId};
use crate::{Error, Result};

/// Round history recorded once per settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTotals {
    /// Sum of actual contributions.
    pub fund: f64,
    /// Sum of claimed contributions.
    pub claimed_fund: f64,
    /// Multiplier applied this round.
    pub multiplier: f64,
    /// `fund * multiplier`.
    pub earnings: f64,
}

/// Experiment record.
///
/// Settings and cohort membership are immutable after creation. The
/// per-round history vectors are indexed by round number and appended
/// exactly once per settled round.
///
/// `kicked_parts` always holds one slot more than `finished_round`: the last
/// slot belongs to the round being played and is filled by exclusion
/// resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    id: ExperimentId,
    created_at: DateTime<Utc>,
    settings: ExperimentSettings,
    participants: Vec<ParticipantId>,
    finished_round: u32,
    funds: Vec<f64>,
    claimed_funds: Vec<f64>,
    earnings: Vec<f64>,
    multipliers: Vec<f64>,
    kicked_parts: Vec<Option<String>>,
}

impl Experiment {
    /// Create a builder for an experiment with the given id and settings.
    #[must_use]
    pub fn builder(id: ExperimentId, settings: ExperimentSettings) -> ExperimentBuilder {
        ExperimentBuilder::new(id, settings)
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn id(&self) -> ExperimentId {
        self.id
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the settings snapshot.
    #[must_use]
    pub const fn settings(&self) -> &ExperimentSettings {
        &self.settings
    }

    /// Cohort member ids, in `id_in_game` order.
    #[must_use]
    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    /// Number of fully settled rounds.
    #[must_use]
    pub const fn finished_round(&self) -> u32 {
        self.finished_round
    }

    /// Whether every configured round has been settled.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished_round >= self.settings.num_rounds
    }

    /// Actual pooled contributions per round.
    #[must_use]
    pub fn funds(&self) -> &[f64] {
        &self.funds
    }

    /// Claimed pooled contributions per round.
    #[must_use]
    pub fn claimed_funds(&self) -> &[f64] {
        &self.claimed_funds
    }

    /// Group earnings per round.
    #[must_use]
    pub fn earnings(&self) -> &[f64] {
        &self.earnings
    }

    /// Multiplier per round.
    #[must_use]
    pub fn multipliers(&self) -> &[f64] {
        &self.multipliers
    }

    /// Excluded participant per round (`None` = nobody).
    #[must_use]
    pub fn kicked_parts(&self) -> &[Option<String>] {
        &self.kicked_parts
    }

    /// Name of the participant sitting out `round`, if any.
    #[must_use]
    pub fn kicked_in_round(&self, round: u32) -> Option<&str> {
        self.kicked_parts
            .get(round as usize)
            .and_then(Option::as_deref)
    }

    /// Whether an exclusion applies to `round`.
    #[must_use]
    pub fn is_kick_active(&self, round: u32) -> bool {
        self.settings.kick_enabled && self.kicked_in_round(round).is_some()
    }

    /// Totals of a settled round.
    #[must_use]
    pub fn round_totals(&self, round: u32) -> Option<RoundTotals> {
        let i = round as usize;
        Some(RoundTotals {
            fund: *self.funds.get(i)?,
            claimed_fund: *self.claimed_funds.get(i)?,
            multiplier: *self.multipliers.get(i)?,
            earnings: *self.earnings.get(i)?,
        })
    }

    /// Append a settled round and open the exclusion slot for the next one.
    pub(crate) fn record_round(&mut self, totals: RoundTotals) {
        self.funds.push(totals.fund);
        self.claimed_funds.push(totals.claimed_fund);
        self.multipliers.push(totals.multiplier);
        self.earnings.push(totals.earnings);
        self.finished_round += 1;
        self.kicked_parts.push(None);
    }

    /// Fill the exclusion slot of the round about to be played.
    pub(crate) fn set_kicked(&mut self, name: Option<String>) -> Result<()> {
        let round = self.finished_round as usize;
        let slot = self.kicked_parts.get_mut(round).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "experiment {} has no exclusion slot for round {round}",
                self.id
            ))
        })?;
        *slot = name;
        Ok(())
    }

    /// Verify the per-round length invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] describing the first mismatch.
    pub fn check_invariants(&self) -> Result<()> {
        let settled = self.finished_round as usize;
        let histories = [
            ("funds", self.funds.len()),
            ("claimed_funds", self.claimed_funds.len()),
            ("earnings", self.earnings.len()),
            ("multipliers", self.multipliers.len()),
        ];
        for (name, len) in histories {
            if len != settled {
                return Err(Error::InvariantViolation(format!(
                    "experiment {}: len({name}) = {len}, finished_round = {settled}",
                    self.id
                )));
            }
        }
        if self.kicked_parts.len() != settled + 1 {
            return Err(Error::InvariantViolation(format!(
                "experiment {}: len(kicked_parts) = {}, expected {}",
                self.id,
                self.kicked_parts.len(),
                settled + 1
            )));
        }
        if self.finished_round > self.settings.num_rounds {
            return Err(Error::InvariantViolation(format!(
                "experiment {}: finished_round {} exceeds num_rounds {}",
                self.id, self.finished_round, self.settings.num_rounds
            )));
        }
        if self.participants.len() != self.settings.part_size {
            return Err(Error::InvariantViolation(format!(
                "experiment {}: {} participants, part_size {}",
                self.id,
                self.participants.len(),
                self.settings.part_size
            )));
        }
        Ok(())
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: ExperimentId,
    created_at: DateTime<Utc>,
    settings: ExperimentSettings,
    participants: Vec<ParticipantId>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: ExperimentId, settings: ExperimentSettings) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            settings,
            participants: Vec::new(),
        }
    }

    /// Set the cohort, in `id_in_game` order.
    #[must_use]
    pub fn participants(mut self, participants: Vec<ParticipantId>) -> Self {
        self.participants = participants;
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the `Experiment` with empty round history.
    #[must_use]
    pub fn build(self) -> Experiment {
        Experiment {
            id: self.id,
            created_at: self.created_at,
            settings: self.settings,
            participants: self.participants,
            finished_round: 0,
            funds: Vec::new(),
            claimed_funds: Vec::new(),
            earnings: Vec::new(),
            multipliers: Vec::new(),
            kicked_parts: vec![None],
        }
    }
}
