//! Immutable experiment configuration snapshot

use serde::{Deserialize, Serialize};

use crate::config::MIN_PART_SIZE;
use crate::{Error, Result};

/// Settings fixed at experiment creation.
///
/// Participants carry a copy so contribution validation never needs to read
/// the owning experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Cohort size.
    pub part_size: usize,
    /// Number of rounds to play.
    pub num_rounds: u32,
    /// Peer exclusion votes between rounds.
    pub kick_enabled: bool,
    /// Participants may claim more than they contribute.
    pub fake_reputation_enabled: bool,
}

impl ExperimentSettings {
    /// Settings with both optional mechanics disabled.
    #[must_use]
    pub const fn new(part_size: usize, num_rounds: u32) -> Self {
        Self {
            part_size,
            num_rounds,
            kick_enabled: false,
            fake_reputation_enabled: false,
        }
    }

    /// Enable or disable peer exclusion.
    #[must_use]
    pub const fn with_kick(mut self, enabled: bool) -> Self {
        self.kick_enabled = enabled;
        self
    }

    /// Enable or disable reputation faking.
    #[must_use]
    pub const fn with_fake_reputation(mut self, enabled: bool) -> Self {
        self.fake_reputation_enabled = enabled;
        self
    }

    /// Check the settings against the allowed cohort bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `part_size` is outside
    /// `2..=max_part_size` or `num_rounds` is zero.
    pub fn validate(&self, max_part_size: usize) -> Result<()> {
        if !(MIN_PART_SIZE..=max_part_size).contains(&self.part_size) {
            return Err(Error::InvalidInput(format!(
                "number of participants must be between {MIN_PART_SIZE} and {max_part_size}, got {}",
                self.part_size
            )));
        }
        if self.num_rounds == 0 {
            return Err(Error::InvalidInput(
                "number of rounds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(ExperimentSettings::new(2, 1).validate(10).is_ok());
        assert!(ExperimentSettings::new(10, 5).validate(10).is_ok());
        assert!(ExperimentSettings::new(1, 5).validate(10).is_err());
        assert!(ExperimentSettings::new(11, 5).validate(10).is_err());
        assert!(ExperimentSettings::new(4, 0).validate(10).is_err());
    }

    #[test]
    fn test_builder_flags() {
        let settings = ExperimentSettings::new(4, 2)
            .with_kick(true)
            .with_fake_reputation(true);
        assert!(settings.kick_enabled);
        assert!(settings.fake_reputation_enabled);
    }
}
