//! Experiment records and the storage gateway
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Participant (part_size)
//!     │                   │
//!     ├─ funds[r]         ├─ contributions[r] / claimed_contributions[r]
//!     ├─ claimed_funds[r] ├─ incomes[r] / claimed_incomes[r]
//!     ├─ earnings[r]      ├─ exclusion_votes[r]
//!     ├─ multipliers[r]   └─ balance / claimed_balance
//!     └─ kicked_parts[r]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use public_goods::experiment::{ExperimentSettings, RecordStore};
//! use public_goods::kv::MemoryKvStore;
//!
//! # async fn example() -> public_goods::Result<()> {
//! let store = RecordStore::new(MemoryKvStore::new());
//! let (experiment, participants) = store
//!     .create_cohort(ExperimentSettings::new(4, 2), chrono::Utc::now())
//!     .await?;
//! assert_eq!(participants.len(), 4);
//! assert_eq!(experiment.finished_round(), 0);
//! # Ok(())
//! # }
//! ```

mod experiment_record;
mod ids;
mod participant_record;
mod settings;
mod store;

pub use experiment_record::{Experiment, ExperimentBuilder, RoundTotals};
pub use ids::{ExperimentId, ParticipantId};
pub use participant_record::{participant_name, Participant};
pub use settings::ExperimentSettings;
pub use store::RecordStore;

use crate::{Error, Result};

/// An experiment together with its cohort, sorted by `id_in_game`.
#[derive(Debug, Clone, PartialEq)]
pub struct FullExperiment {
    /// The experiment record.
    pub experiment: Experiment,
    /// Cohort members in `id_in_game` order.
    pub participants: Vec<Participant>,
}

impl FullExperiment {
    /// Find a cohort member by display name.
    #[must_use]
    pub fn participant_named(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name() == name)
    }

    /// Verify record-level and cross-record invariants.
    ///
    /// Participants at rest must agree with the experiment on
    /// `finished_round`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] describing the first mismatch.
    pub fn check_invariants(&self) -> Result<()> {
        self.experiment.check_invariants()?;
        if self.participants.len() != self.experiment.participants().len() {
            return Err(Error::InvariantViolation(format!(
                "experiment {}: loaded {} of {} participants",
                self.experiment.id(),
                self.participants.len(),
                self.experiment.participants().len()
            )));
        }
        for participant in &self.participants {
            participant.check_invariants()?;
            if participant.finished_round() != self.experiment.finished_round() {
                return Err(Error::InvariantViolation(format!(
                    "participant {} finished_round {} != experiment {} finished_round {}",
                    participant.id(),
                    participant.finished_round(),
                    self.experiment.id(),
                    self.experiment.finished_round()
                )));
            }
        }
        Ok(())
    }
}
