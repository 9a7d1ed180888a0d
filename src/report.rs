//! Round report - what a participant is shown after a round settles
//!
//! Peers are only ever visible through their *claimed* numbers. The viewer
//! additionally sees their own actual contribution and income.

use serde::Serialize;

use crate::experiment::{FullExperiment, ParticipantId};
use crate::{Error, Result};

/// One row of the cohort table, as peers see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerLine {
    /// Display name.
    pub name: String,
    /// Claimed contribution.
    pub claimed_contribution: u32,
    /// Claimed income.
    pub claimed_income: f64,
    /// Sat out this round.
    pub excluded: bool,
}

/// A settled round from one participant's point of view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    /// Round index (0-based).
    pub round: u32,
    /// Viewer's display name.
    pub viewer: String,
    /// Viewer's actual contribution.
    pub contribution: u32,
    /// Viewer's claimed contribution.
    pub claimed_contribution: u32,
    /// Viewer's actual income.
    pub income: f64,
    /// Viewer's claimed income.
    pub claimed_income: f64,
    /// Viewer's actual balance after this round.
    pub balance: f64,
    /// Sum of actual contributions.
    pub fund: f64,
    /// Sum of claimed contributions.
    pub claimed_fund: f64,
    /// Multiplier applied.
    pub multiplier: f64,
    /// Group earnings.
    pub earnings: f64,
    /// Participant who sat out, if any.
    pub kicked: Option<String>,
    /// Whole cohort, claimed values only.
    pub peers: Vec<PeerLine>,
}

/// Build the report of `round` for `viewer`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `viewer` is not in the cohort and
/// [`Error::InvalidInput`] if `round` has not been settled.
pub fn round_report(full: &FullExperiment, viewer: ParticipantId, round: u32) -> Result<RoundReport> {
    let me = full
        .participants
        .iter()
        .find(|p| p.id() == viewer)
        .ok_or_else(|| Error::participant_not_found(viewer))?;
    let totals = full.experiment.round_totals(round).ok_or_else(|| {
        Error::InvalidInput(format!(
            "round {round} has not been settled (finished rounds: {})",
            full.experiment.finished_round()
        ))
    })?;

    let i = round as usize;
    let settled = |value: Option<f64>| {
        value.ok_or_else(|| {
            Error::InvariantViolation(format!(
                "participant {} missing history for settled round {round}",
                me.id()
            ))
        })
    };
    let income = settled(me.incomes().get(i).copied())?;
    let claimed_income = settled(me.claimed_incomes().get(i).copied())?;
    let balance: f64 = me.incomes()[..=i].iter().sum();

    let kicked = if full.experiment.is_kick_active(round) {
        full.experiment.kicked_in_round(round).map(str::to_string)
    } else {
        None
    };

    let peers = full
        .participants
        .iter()
        .map(|p| PeerLine {
            name: p.name().to_string(),
            claimed_contribution: p.claimed_contribution(round).unwrap_or(0),
            claimed_income: p.claimed_incomes().get(i).copied().unwrap_or(0.0),
            excluded: kicked.as_deref() == Some(p.name()),
        })
        .collect();

    Ok(RoundReport {
        round,
        viewer: me.name().to_string(),
        contribution: me.contribution(round).unwrap_or(0),
        claimed_contribution: me.claimed_contribution(round).unwrap_or(0),
        income,
        claimed_income,
        balance,
        fund: totals.fund,
        claimed_fund: totals.claimed_fund,
        multiplier: totals.multiplier,
        earnings: totals.earnings,
        kicked,
        peers,
    })
}
