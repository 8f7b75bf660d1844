//! Runtime Configuration
//!
//! Tunables for a reactive root. Hosts usually take the defaults; the JSON
//! form exists so a tour definition can ship its own tuning next to its steps.
//!
//! ```json
//! { "gc_interval_ms": 1000, "max_fixpoint_rounds": 100 }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default delay between the first subscription mark and the GC sweep.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_millis(1000);

/// Default cap on derivation rounds within one commit.
pub const DEFAULT_MAX_FIXPOINT_ROUNDS: usize = 100;

/// Configuration for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Debounce delay of the subscription sweep.
    pub gc_interval: Duration,

    /// Maximum number of derivation rounds per commit. Bounds cyclic
    /// derivation graphs.
    pub max_fixpoint_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_interval: DEFAULT_GC_INTERVAL,
            max_fixpoint_rounds: DEFAULT_MAX_FIXPOINT_ROUNDS,
        }
    }
}

/// Wire form. Missing fields fall back to the defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_gc_interval_ms")]
    gc_interval_ms: u64,
    #[serde(default = "default_max_fixpoint_rounds")]
    max_fixpoint_rounds: usize,
}

fn default_gc_interval_ms() -> u64 {
    DEFAULT_GC_INTERVAL.as_millis() as u64
}

fn default_max_fixpoint_rounds() -> usize {
    DEFAULT_MAX_FIXPOINT_ROUNDS
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(source: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(source)?;
        let config = Self {
            gc_interval: Duration::from_millis(raw.gc_interval_ms),
            max_fixpoint_rounds: raw.max_fixpoint_rounds,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the sweep delay.
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Set the derivation round cap.
    pub fn with_max_fixpoint_rounds(mut self, rounds: usize) -> Self {
        self.max_fixpoint_rounds = rounds;
        self
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_fixpoint_rounds == 0 {
            return Err(Error::InvalidConfig {
                field: "max_fixpoint_rounds",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.gc_interval, Duration::from_secs(1));
        assert_eq!(config.max_fixpoint_rounds, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_json() {
        let config = RuntimeConfig::from_json(r#"{ "gc_interval_ms": 250 }"#).unwrap();
        assert_eq!(config.gc_interval, Duration::from_millis(250));
        assert_eq!(config.max_fixpoint_rounds, DEFAULT_MAX_FIXPOINT_ROUNDS);
    }

    #[test]
    fn rejects_zero_rounds() {
        let err = RuntimeConfig::from_json(r#"{ "max_fixpoint_rounds": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfig { field: "max_fixpoint_rounds", .. }
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = RuntimeConfig::from_json(r#"{ "gc": 1 }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
