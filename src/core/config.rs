//! # Configuration
//!
//! Environment-driven settings for the nudge daemon. Values are read after
//! `dotenvy` has loaded any `.env` file.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Added scheduler capacity and repeat cap validation
//! - 1.0.0: Initial release

use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Default outstanding-alert ceiling of the delivery primitive
pub const DEFAULT_SCHEDULER_CAPACITY: usize = 64;

/// Default number of alerts a single repeating step expands into
pub const DEFAULT_MAX_REPEAT_ALERTS: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    pub scheduler_capacity: usize,
    pub max_repeat_alerts: usize,
    pub sync_tick_seconds: u64,
    pub delivery_tick_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub policies_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: "nudge.db".to_string(),
            log_level: "info".to_string(),
            scheduler_capacity: DEFAULT_SCHEDULER_CAPACITY,
            max_repeat_alerts: DEFAULT_MAX_REPEAT_ALERTS,
            sync_tick_seconds: 60,
            delivery_tick_seconds: 15,
            fetch_timeout_seconds: 30,
            policies_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            database_path: lookup("NUDGE_DATABASE_PATH").unwrap_or(defaults.database_path),
            log_level: lookup("NUDGE_LOG_LEVEL").unwrap_or(defaults.log_level),
            scheduler_capacity: parse_var(
                &lookup,
                "NUDGE_SCHEDULER_CAPACITY",
                defaults.scheduler_capacity,
            )?,
            max_repeat_alerts: parse_var(
                &lookup,
                "NUDGE_MAX_REPEAT_ALERTS",
                defaults.max_repeat_alerts,
            )?,
            sync_tick_seconds: parse_var(
                &lookup,
                "NUDGE_SYNC_TICK_SECONDS",
                defaults.sync_tick_seconds,
            )?,
            delivery_tick_seconds: parse_var(
                &lookup,
                "NUDGE_DELIVERY_TICK_SECONDS",
                defaults.delivery_tick_seconds,
            )?,
            fetch_timeout_seconds: parse_var(
                &lookup,
                "NUDGE_FETCH_TIMEOUT_SECONDS",
                defaults.fetch_timeout_seconds,
            )?,
            policies_path: lookup("NUDGE_POLICIES_PATH").filter(|p| !p.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler_capacity == 0 {
            return Err(anyhow!("NUDGE_SCHEDULER_CAPACITY must be at least 1"));
        }
        if self.max_repeat_alerts == 0 {
            return Err(anyhow!("NUDGE_MAX_REPEAT_ALERTS must be at least 1"));
        }
        if self.max_repeat_alerts > self.scheduler_capacity {
            return Err(anyhow!(
                "NUDGE_MAX_REPEAT_ALERTS ({}) exceeds scheduler capacity ({})",
                self.max_repeat_alerts,
                self.scheduler_capacity
            ));
        }
        if self.sync_tick_seconds == 0 || self.delivery_tick_seconds == 0 {
            return Err(anyhow!("tick intervals must be at least one second"));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {key} ({raw}): {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_path, "nudge.db");
        assert_eq!(config.scheduler_capacity, 64);
        assert_eq!(config.max_repeat_alerts, 50);
        assert!(config.policies_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("NUDGE_DATABASE_PATH", "/tmp/n.db"),
            ("NUDGE_MAX_REPEAT_ALERTS", "10"),
            ("NUDGE_POLICIES_PATH", "policies.yaml"),
        ]))
        .unwrap();
        assert_eq!(config.database_path, "/tmp/n.db");
        assert_eq!(config.max_repeat_alerts, 10);
        assert_eq!(config.policies_path.as_deref(), Some("policies.yaml"));
    }

    #[test]
    fn test_rejects_repeat_cap_above_capacity() {
        let result = Config::from_lookup(lookup_from(&[
            ("NUDGE_SCHEDULER_CAPACITY", "20"),
            ("NUDGE_MAX_REPEAT_ALERTS", "50"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_garbage_numbers() {
        let result = Config::from_lookup(lookup_from(&[("NUDGE_SYNC_TICK_SECONDS", "soon")]));
        assert!(result.is_err());
    }
}
