//! Engine Configuration
//!
//! Defaults match the production table. Every field can be overridden from
//! the environment with a `CRASH_*` variable.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fixed::{Amount, Multiplier};
use crate::game::generator::GeneratorConfig;
use crate::game::history::HISTORY_CAPACITY;
use crate::game::live_table::LiveTableConfig;
use crate::TICK_RATE;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Variable present but unparseable.
    #[error("{key}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// Value parsed but out of range.
    #[error("{key}: {reason}")]
    OutOfRange {
        /// Variable name.
        key: &'static str,
        /// What is wrong.
        reason: &'static str,
    },
}

/// Configuration for the round engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Idle phase length in milliseconds.
    pub idle_ms: u64,
    /// Betting window in milliseconds.
    pub betting_ms: u64,
    /// Crash display time in milliseconds.
    pub cooldown_ms: u64,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Entries kept in each history list.
    pub history_capacity: usize,
    /// Balance of a participant seen for the first time.
    pub starting_balance: Amount,
    /// Bet panels per participant.
    pub panels_per_participant: u8,
    /// Crash point generation.
    pub generator: GeneratorConfig,
    /// Simulated participants.
    pub live_table: LiveTableConfig,
    /// Where the JSON store lives.
    pub state_path: PathBuf,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            idle_ms: 6_000,
            betting_ms: 6_000,
            cooldown_ms: 6_000,
            tick_rate: TICK_RATE,
            history_capacity: HISTORY_CAPACITY,
            starting_balance: Amount::from_units(5_000),
            panels_per_participant: 2,
            generator: GeneratorConfig::default(),
            live_table: LiveTableConfig::default(),
            state_path: PathBuf::from("crash-round-state.json"),
        }
    }
}

impl RoundConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_with(&lookup, "CRASH_IDLE_MS", &mut config.idle_ms)?;
        override_with(&lookup, "CRASH_BETTING_MS", &mut config.betting_ms)?;
        override_with(&lookup, "CRASH_COOLDOWN_MS", &mut config.cooldown_ms)?;
        override_with(&lookup, "CRASH_TICK_RATE", &mut config.tick_rate)?;
        override_with(&lookup, "CRASH_HISTORY_CAPACITY", &mut config.history_capacity)?;
        override_with(&lookup, "CRASH_STARTING_BALANCE", &mut config.starting_balance)?;
        override_with(&lookup, "CRASH_PANELS", &mut config.panels_per_participant)?;
        override_with(&lookup, "CRASH_MAX_MULTIPLIER", &mut config.generator.max_multiplier)?;
        override_with(&lookup, "CRASH_CEILING", &mut config.generator.crash_ceiling)?;
        if let Some(path) = lookup("CRASH_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::OutOfRange { key: "CRASH_TICK_RATE", reason: "must be positive" });
        }
        if self.panels_per_participant == 0 {
            return Err(ConfigError::OutOfRange { key: "CRASH_PANELS", reason: "must be positive" });
        }
        if !self.starting_balance.is_positive() {
            return Err(ConfigError::OutOfRange {
                key: "CRASH_STARTING_BALANCE",
                reason: "must be positive",
            });
        }
        if !self.generator.crash_ceiling.is_valid() {
            return Err(ConfigError::OutOfRange { key: "CRASH_CEILING", reason: "must be at least 1.00x" });
        }
        if self.generator.instant_crash_percent > 100 {
            return Err(ConfigError::OutOfRange {
                key: "instant_crash_percent",
                reason: "must be at most 100",
            });
        }
        Ok(())
    }

    /// Tick period in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        (1_000 / self.tick_rate.max(1) as u64).max(1)
    }
}

fn override_with<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(key) {
        *slot = value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RoundConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RoundConfig::default());
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.starting_balance, Amount::from_units(5000));
        assert_eq!(config.tick_interval_ms(), 16);
    }

    #[test]
    fn test_overrides() {
        let config = RoundConfig::from_lookup(lookup_from(&[
            ("CRASH_BETTING_MS", "2500"),
            ("CRASH_STARTING_BALANCE", "100.50"),
            ("CRASH_CEILING", "1000x"),
            ("CRASH_STATE_PATH", "/tmp/state.json"),
        ]))
        .unwrap();

        assert_eq!(config.betting_ms, 2500);
        assert_eq!(config.starting_balance, Amount::from_cents(10_050));
        assert_eq!(config.generator.crash_ceiling, Multiplier::from_hundredths(100_000));
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = RoundConfig::from_lookup(lookup_from(&[("CRASH_IDLE_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CRASH_IDLE_MS", .. }));
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        let err = RoundConfig::from_lookup(lookup_from(&[("CRASH_TICK_RATE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "CRASH_TICK_RATE", .. }));
    }
}
