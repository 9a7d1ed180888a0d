//! Round barrier
//!
//! Decides whether an entire cohort is waiting on the same step, and
//! serializes every read-modify-write on an experiment so the barrier fires
//! exactly once per phase.
//!
//! ## Locking
//!
//! [`CohortLocks`] hands out one async mutex per experiment. A coordinator
//! operation holds it from the first read of the participant until the last
//! write of the barrier batch, so:
//! - two "last" submissions cannot both observe a full barrier
//! - a participant record cannot be overwritten from a stale read
//!
//! Waiting on the lock is bounded by the length of one batch write; peers
//! that are merely slow never block anyone. An experiment's entry is dropped
//! from the table once its last holder or waiter lets go.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::experiment::{ExperimentId, Participant};
use crate::stage::WaitPhase;

/// Barrier evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Not everyone is waiting on the same step yet.
    Pending {
        /// Participants currently in `Wait`.
        ready: usize,
        /// Cohort size.
        total: usize,
    },
    /// Everyone is waiting on `phase`; the barrier may fire.
    Ready(WaitPhase),
}

/// What the caller of a coordinator operation learns about the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Input recorded; still waiting on peers.
    Pending {
        /// Participants currently in `Wait`.
        ready: usize,
        /// Cohort size.
        total: usize,
    },
    /// This call completed the cohort and the barrier fired.
    Released(WaitPhase),
    /// The operation did not involve the barrier.
    NotApplicable,
}

impl BarrierOutcome {
    /// Whether this call fired the barrier.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Released(_))
    }
}

/// Check whether every participant is waiting on the same phase.
#[must_use]
pub fn evaluate(participants: &[Participant]) -> BarrierState {
    let total = participants.len();
    let phases: Vec<WaitPhase> = participants
        .iter()
        .filter_map(Participant::wait_phase)
        .collect();
    let pending = BarrierState::Pending {
        ready: phases.len(),
        total,
    };

    let Some(&first) = phases.first() else {
        return pending;
    };
    if phases.len() != total {
        return pending;
    }
    if phases.iter().any(|&phase| phase != first) {
        warn!(
            ?phases,
            "cohort waiting on mixed phases, holding barrier"
        );
        return pending;
    }
    BarrierState::Ready(first)
}

/// One async mutex per experiment.
///
/// Entries exist only while some task holds or waits on the lock.
#[derive(Debug, Default)]
pub struct CohortLocks {
    locks: DashMap<ExperimentId, Arc<Mutex<()>>>,
}

/// Exclusive access to one experiment, released on drop.
#[derive(Debug)]
#[must_use = "the cohort is unlocked as soon as the guard is dropped"]
pub struct CohortGuard<'a> {
    locks: &'a CohortLocks,
    experiment: ExperimentId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl CohortGuard<'_> {
    /// Experiment this guard locks.
    #[must_use]
    pub const fn experiment(&self) -> ExperimentId {
        self.experiment
    }
}

impl Drop for CohortGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the
        // table still references the mutex.
        self.locks
            .locks
            .remove_if(&self.experiment, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl CohortLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `experiment`, waiting for the current holder.
    pub async fn acquire(&self, experiment: ExperimentId) -> CohortGuard<'_> {
        let lock = Arc::clone(self.locks.entry(experiment).or_default().value());
        let guard = lock.lock_owned().await;
        CohortGuard {
            locks: self,
            experiment,
            guard: Some(guard),
        }
    }

    /// Number of experiments currently locked or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no experiment is locked or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
