//! # Public Goods: Round Engine for Public-Goods Game Experiments
//!
//! **Version**: 0.1.0
//!
//! Coordinates cohorts of participants through a multi-round public-goods
//! game: comprehension test, per-round contributions, settlement of a shared
//! fund, and (optionally) a peer vote that excludes one participant from the
//! next round.
//!
//! ## Design Principles
//!
//! - **Closed stage machine**: every participant event is checked against a
//!   transition table; out-of-order requests fail with a stage violation
//! - **Round barrier**: a phase advances only when the whole cohort waits on
//!   it, and fires exactly once under a per-experiment lock
//! - **Pure settlement**: round arithmetic is a function of the ballots, so it
//!   can be tested and benchmarked without storage
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use public_goods::experiment::ExperimentSettings;
//! use public_goods::RoundCoordinator;
//!
//! # async fn example() -> public_goods::Result<()> {
//! let coordinator = RoundCoordinator::in_memory();
//! let id = coordinator
//!     .create_experiment("pg", ExperimentSettings::new(4, 3).with_kick(true))
//!     .await?;
//!
//! let full = coordinator.load_full_experiment(id).await?;
//! for participant in &full.participants {
//!     println!("{} is in stage {}", participant.name(), participant.stage());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod barrier;
pub mod comprehension;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod exclusion;
pub mod experiment;
pub mod kv;
pub mod report;
pub mod settlement;
pub mod stage;
pub mod telemetry;

pub use barrier::BarrierOutcome;
pub use config::{EngineConfig, SettlementRules};
pub use coordinator::{ComprehensionResult, NextRound, RoundCoordinator, RoundCoordinatorBuilder};
pub use error::{Error, Result};
pub use stage::{Stage, WaitPhase};
