//! Exclusion resolver
//!
//! Tallies peer exclusion votes once every participant has voted (or sat
//! out) and picks at most one participant to sit out the coming round.
//!
//! A participant is a candidate when `votes * 2 >= part_size`, counting
//! only votes cast by *other* participants. Ties between candidates are
//! broken by a [`RandomSource`], which is injectable so tests can be
//! deterministic.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::experiment::{Experiment, Participant};
use crate::stage::{StageEvent, WaitPhase};
use crate::{Error, Result};

/// Source of randomness for the exclusion tie-break.
pub trait RandomSource: Send + Sync {
    /// Return an index in `0..len`. `len` is at least 1.
    fn pick_index(&self, len: usize) -> usize;
}

/// `StdRng`-backed random source.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Seed from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for a given seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn pick_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..len)
    }
}

/// Result of one exclusion resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionOutcome {
    /// Round the exclusion applies to.
    pub round: u32,
    /// Names of every participant that reached the majority threshold.
    pub candidates: Vec<String>,
    /// Name of the participant who sits out, if any.
    pub kicked: Option<String>,
}

/// Indices of participants whose peer votes reach the majority threshold.
///
/// `votes[j]` is the name participant `j` voted for. Self-votes are ignored.
#[must_use]
pub fn majority_candidates(names: &[&str], votes: &[Option<&str>], part_size: usize) -> Vec<usize> {
    let mut tally: FxHashMap<&str, usize> = FxHashMap::default();
    for (voter, vote) in names.iter().zip(votes) {
        if let Some(target) = vote {
            if target != voter {
                *tally.entry(*target).or_insert(0) += 1;
            }
        }
    }

    names
        .iter()
        .enumerate()
        .filter(|(_, name)| tally.get(*name).is_some_and(|count| count * 2 >= part_size))
        .map(|(i, _)| i)
        .collect()
}

/// Resolve the exclusion vote for the round about to be played and move the
/// cohort to `SelectContribution`.
///
/// Works on in-memory copies; nothing is persisted here.
pub(crate) fn resolve(
    experiment: &mut Experiment,
    participants: &mut [Participant],
    random: &dyn RandomSource,
) -> Result<ExclusionOutcome> {
    let round = experiment.finished_round();

    for participant in participants.iter_mut() {
        if !participant.has_voted_this_round() {
            return Err(Error::InvariantViolation(format!(
                "participant {} has no exclusion vote for round {round}",
                participant.id()
            )));
        }
        participant.set_excluded(false);
    }

    let names: Vec<&str> = participants.iter().map(Participant::name).collect();
    let votes: Vec<Option<&str>> = participants
        .iter()
        .map(|p| p.vote_in_round(round))
        .collect();
    let candidate_idx = majority_candidates(&names, &votes, experiment.settings().part_size);
    let candidates: Vec<String> = candidate_idx
        .iter()
        .map(|&i| names[i].to_string())
        .collect();

    let kicked_idx = if candidate_idx.is_empty() {
        None
    } else {
        let pick = random.pick_index(candidate_idx.len()).min(candidate_idx.len() - 1);
        Some(candidate_idx[pick])
    };

    let kicked = kicked_idx.map(|i| {
        participants[i].set_excluded(true);
        participants[i].name().to_string()
    });
    experiment.set_kicked(kicked.clone())?;

    for participant in participants.iter_mut() {
        participant.apply(StageEvent::BarrierReleased(WaitPhase::Exclusion))?;
    }

    Ok(ExclusionOutcome {
        round,
        candidates,
        kicked,
    })
}
