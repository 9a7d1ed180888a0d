//! Settlement engine
//!
//! Turns one round's committed contributions into group earnings, per
//! participant incomes and updated balances. Runs exactly once per round,
//! when the round barrier releases the contribution phase.
//!
//! All amounts are `f64` and never rounded here; rounding is a display
//! concern.

use crate::config::SettlementRules;
use crate::experiment::{Experiment, Participant, RoundTotals};
use crate::stage::{StageEvent, WaitPhase};
use crate::{Error, Result};

/// One participant's committed input for the round being settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ballot {
    /// Points actually moved into the fund.
    pub contribution: u32,
    /// Points the participant tells peers they moved.
    pub claimed_contribution: u32,
    /// Participant sits out this round.
    pub excluded: bool,
}

impl Ballot {
    /// A truthful ballot.
    #[must_use]
    pub const fn honest(contribution: u32) -> Self {
        Self {
            contribution,
            claimed_contribution: contribution,
            excluded: false,
        }
    }
}

/// Result of settling one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// Round-level totals appended to the experiment.
    pub totals: RoundTotals,
    /// Actual income per participant, in cohort order.
    pub incomes: Vec<f64>,
    /// Claimed income per participant, in cohort order.
    pub claimed_incomes: Vec<f64>,
    /// Participants sharing the earnings this round.
    pub active_players: usize,
}

impl RoundOutcome {
    /// Each active participant's share of the group earnings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn share(&self) -> f64 {
        if self.active_players == 0 {
            0.0
        } else {
            self.totals.earnings / self.active_players as f64
        }
    }
}

/// Compute one round from the cohort's ballots.
///
/// `kick_active` is true when an exclusion applies to this round; it
/// removes one participant from the earnings split and switches to the
/// reduced multiplier.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute(ballots: &[Ballot], kick_active: bool, rules: &SettlementRules) -> RoundOutcome {
    let active_players = if kick_active {
        ballots.len().saturating_sub(1)
    } else {
        ballots.len()
    };
    let multiplier = if kick_active {
        rules.kick_multiplier
    } else {
        rules.multiplier
    };
    let endowment = f64::from(rules.endowment);

    let fund: f64 = ballots.iter().map(|b| f64::from(b.contribution)).sum();
    let claimed_fund: f64 = ballots
        .iter()
        .map(|b| f64::from(b.claimed_contribution))
        .sum();
    let earnings = fund * multiplier;
    let share = if active_players == 0 {
        0.0
    } else {
        earnings / active_players as f64
    };

    let mut incomes = Vec::with_capacity(ballots.len());
    let mut claimed_incomes = Vec::with_capacity(ballots.len());
    for ballot in ballots {
        let actual = f64::from(ballot.contribution);
        let claimed = f64::from(ballot.claimed_contribution);

        let mut income = if ballot.excluded { 0.0 } else { endowment - actual };
        if ballot.claimed_contribution > ballot.contribution {
            income -= (claimed - actual) * rules.reputation_penalty;
        }
        let mut claimed_income = if ballot.excluded {
            0.0
        } else {
            endowment - claimed
        };

        if !ballot.excluded {
            income += share;
            claimed_income += share;
        }
        incomes.push(income);
        claimed_incomes.push(claimed_income);
    }

    RoundOutcome {
        totals: RoundTotals {
            fund,
            claimed_fund,
            multiplier,
            earnings,
        },
        incomes,
        claimed_incomes,
        active_players,
    }
}

/// Settle the experiment's current round and move the cohort to
/// `ViewResult`.
///
/// Works on in-memory copies; nothing is persisted here. On error the
/// copies must be discarded.
pub(crate) fn settle(
    experiment: &mut Experiment,
    participants: &mut [Participant],
    rules: &SettlementRules,
) -> Result<RoundOutcome> {
    let round = experiment.finished_round();
    if experiment.is_finished() {
        return Err(Error::InvariantViolation(format!(
            "experiment {} already settled all {} rounds",
            experiment.id(),
            experiment.settings().num_rounds
        )));
    }

    let ballots = participants
        .iter()
        .map(|p| {
            let expected_len = round as usize + 1;
            match (p.contribution(round), p.claimed_contribution(round)) {
                (Some(contribution), Some(claimed_contribution))
                    if p.contributions().len() == expected_len =>
                {
                    Ok(Ballot {
                        contribution,
                        claimed_contribution,
                        excluded: p.excluded(),
                    })
                }
                _ => Err(Error::InvariantViolation(format!(
                    "participant {} has no contribution for round {round}",
                    p.id()
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let outcome = compute(&ballots, experiment.is_kick_active(round), rules);

    for ((participant, income), claimed_income) in participants
        .iter_mut()
        .zip(&outcome.incomes)
        .zip(&outcome.claimed_incomes)
    {
        participant.apply(StageEvent::BarrierReleased(WaitPhase::Contribution))?;
        participant.settle(*income, *claimed_income);
    }
    experiment.record_round(outcome.totals);

    Ok(outcome)
}
