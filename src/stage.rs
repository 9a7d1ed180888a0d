//! Per-participant stage machine
//!
//! ```text
//! INSTRUCTION ──passed──> WAIT ──release──> SELECT_CONTRIBUTION
//!                                                │ submit
//!                                                v
//!        ┌──────────── VIEW_RESULT <──release── WAIT
//!        │ ready            │ ready (last round)
//!        │                  v
//!        │                FINAL
//!        ├─ kick off ──────────────> SELECT_CONTRIBUTION
//!        ├─ kick on, excluded ─────> WAIT ──release──> SELECT_CONTRIBUTION
//!        └─ kick on ───────────────> EXCLUSION_VOTE ──vote──> WAIT
//! ```
//!
//! Transitions are a pure function of the current stage and the event.
//! Unknown stage strings fail at deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Position of a participant in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading instructions / taking the comprehension test (initial).
    Instruction,
    /// Blocked on peers.
    Wait,
    /// Choosing this round's contribution.
    SelectContribution,
    /// Voting on whom to exclude from the next round.
    ExclusionVote,
    /// Looking at the settled round.
    ViewResult,
    /// All rounds played (terminal).
    Final,
}

impl Stage {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Instruction => "instruction",
            Self::Wait => "wait",
            Self::SelectContribution => "select_contribution",
            Self::ExclusionVote => "exclusion_vote",
            Self::ViewResult => "view_result",
            Self::Final => "final",
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }

    /// Apply `event` to this stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StageViolation`] if the event's precondition stage
    /// does not match `self`.
    pub fn apply(self, event: StageEvent) -> Result<Self> {
        let expected = event.required_stage();
        if self != expected {
            return Err(Error::StageViolation {
                operation: event.operation(),
                expected,
                actual: self,
            });
        }

        let next = match event {
            StageEvent::ComprehensionPassed
            | StageEvent::ContributionSubmitted
            | StageEvent::ExclusionVoteSubmitted => Self::Wait,
            StageEvent::ComprehensionFailed => Self::Instruction,
            StageEvent::ReadyForNextRound {
                game_over,
                kick_enabled,
                excluded,
            } => {
                if game_over {
                    Self::Final
                } else if !kick_enabled {
                    Self::SelectContribution
                } else if excluded {
                    Self::Wait
                } else {
                    Self::ExclusionVote
                }
            }
            StageEvent::BarrierReleased(phase) => phase.release_stage(),
        };
        Ok(next)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step a waiting cohort has just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitPhase {
    /// Everyone passed the comprehension test.
    Comprehension,
    /// Everyone submitted a contribution; the round can be settled.
    Contribution,
    /// Everyone voted (or sat out); exclusions can be resolved.
    Exclusion,
}

impl WaitPhase {
    /// Stage the cohort moves to when the barrier releases this phase.
    #[must_use]
    pub const fn release_stage(&self) -> Stage {
        match self {
            Self::Contribution => Stage::ViewResult,
            Self::Comprehension | Self::Exclusion => Stage::SelectContribution,
        }
    }
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Comprehension => "comprehension",
            Self::Contribution => "contribution",
            Self::Exclusion => "exclusion",
        };
        f.write_str(name)
    }
}

/// Events that drive the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Comprehension test answered with no misses.
    ComprehensionPassed,
    /// Comprehension test answered with at least one miss.
    ComprehensionFailed,
    /// Contribution recorded for the current round.
    ContributionSubmitted,
    /// Participant has seen the result and wants to continue.
    ReadyForNextRound {
        /// `finished_round == num_rounds`
        game_over: bool,
        /// Experiment has peer exclusion enabled
        kick_enabled: bool,
        /// Participant sat out the round that just settled
        excluded: bool,
    },
    /// Exclusion vote recorded for the upcoming round.
    ExclusionVoteSubmitted,
    /// The round barrier fired for the given phase.
    BarrierReleased(WaitPhase),
}

impl StageEvent {
    /// Stage the participant must be in for this event.
    #[must_use]
    pub const fn required_stage(&self) -> Stage {
        match self {
            Self::ComprehensionPassed | Self::ComprehensionFailed => Stage::Instruction,
            Self::ContributionSubmitted => Stage::SelectContribution,
            Self::ReadyForNextRound { .. } => Stage::ViewResult,
            Self::ExclusionVoteSubmitted => Stage::ExclusionVote,
            Self::BarrierReleased(_) => Stage::Wait,
        }
    }

    /// Human-readable operation name used in errors.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::ComprehensionPassed | Self::ComprehensionFailed => "submit comprehension answers",
            Self::ContributionSubmitted => "submit contribution",
            Self::ReadyForNextRound { .. } => "advance to next round",
            Self::ExclusionVoteSubmitted => "submit exclusion vote",
            Self::BarrierReleased(_) => "release barrier",
        }
    }
}
