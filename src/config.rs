//! Engine configuration
//!
//! Environment variables read by [`EngineConfig::from_env`]:
//! - `PGG_PASSCODE`: experiment creation passcode (default: `pg`)
//! - `PGG_MAX_PART_SIZE`: largest allowed cohort (default: 10)
//! - `PGG_RNG_SEED`: seed for the exclusion tie-break (default: entropy)

use crate::{Error, Result};

/// Smallest cohort that can play.
pub const MIN_PART_SIZE: usize = 2;

/// Default largest cohort.
pub const DEFAULT_MAX_PART_SIZE: usize = 10;

/// Numeric rules applied by the settlement engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlementRules {
    /// Points each participant receives per round. Also the upper bound of a
    /// contribution.
    pub endowment: u32,
    /// Multiplier applied to the fund in a normal round.
    pub multiplier: f64,
    /// Multiplier applied to the fund while a participant is excluded.
    pub kick_multiplier: f64,
    /// Income deducted per point of claimed-but-not-contributed reputation.
    pub reputation_penalty: f64,
}

impl Default for SettlementRules {
    fn default() -> Self {
        Self {
            endowment: 10,
            multiplier: 2.0,
            kick_multiplier: 1.5,
            reputation_penalty: 0.2,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Shared secret required to create an experiment.
    pub passcode: String,
    /// Largest allowed cohort size.
    pub max_part_size: usize,
    /// Seed for the exclusion tie-break; `None` draws from OS entropy.
    pub rng_seed: Option<u64>,
    /// Settlement constants.
    pub rules: SettlementRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            passcode: "pg".to_string(),
            max_part_size: DEFAULT_MAX_PART_SIZE,
            rng_seed: None,
            rules: SettlementRules::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment.
    ///
    /// Missing variables fall back to [`EngineConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is present but unparsable, or
    /// if the resulting configuration fails [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(passcode) = lookup("PGG_PASSCODE") {
            config.passcode = passcode;
        }
        if let Some(val) = lookup("PGG_MAX_PART_SIZE") {
            config.max_part_size = val
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::Config(format!("PGG_MAX_PART_SIZE invalid: '{val}'")))?;
        }
        if let Some(val) = lookup("PGG_RNG_SEED") {
            let seed = val
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("PGG_RNG_SEED invalid: '{val}'")))?;
            config.rng_seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty passcode or a cohort bound below
    /// [`MIN_PART_SIZE`].
    pub fn validate(&self) -> Result<()> {
        if self.passcode.is_empty() {
            return Err(Error::Config("passcode must not be empty".to_string()));
        }
        if self.max_part_size < MIN_PART_SIZE {
            return Err(Error::Config(format!(
                "max_part_size must be at least {MIN_PART_SIZE}, got {}",
                self.max_part_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_game_rules() {
        let config = EngineConfig::default();
        assert_eq!(config.passcode, "pg");
        assert_eq!(config.max_part_size, 10);
        assert_eq!(config.rules.endowment, 10);
        assert!((config.rules.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.rules.kick_multiplier - 1.5).abs() < f64::EPSILON);
        assert!((config.rules.reputation_penalty - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("PGG_PASSCODE", "secret"),
            ("PGG_MAX_PART_SIZE", "6"),
            ("PGG_RNG_SEED", "42"),
        ]))
        .unwrap();
        assert_eq!(config.passcode, "secret");
        assert_eq!(config.max_part_size, 6);
        assert_eq!(config.rng_seed, Some(42));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = EngineConfig::from_lookup(lookup_from(&[("PGG_RNG_SEED", "abc")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err =
            EngineConfig::from_lookup(lookup_from(&[("PGG_MAX_PART_SIZE", "1")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
