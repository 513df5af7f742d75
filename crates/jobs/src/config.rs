// crates/jobs/src/config.rs
//! Runner configuration, read from `JOBSMITH_*` environment variables.

use std::time::Duration;

use crate::error::JobsError;

/// Timeout applied by [`JobRunner::submit_default`](crate::JobRunner::submit_default).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How often the periodic sweeper runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// How long finished jobs stay pollable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

pub const ENV_DEFAULT_TIMEOUT: &str = "JOBSMITH_DEFAULT_TIMEOUT_SECS";
pub const ENV_SWEEP_INTERVAL: &str = "JOBSMITH_SWEEP_INTERVAL_SECS";
pub const ENV_RETENTION: &str = "JOBSMITH_RETENTION_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
    pub default_timeout: Duration,
    pub sweep_interval: Duration,
    pub retention: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retention: DEFAULT_RETENTION,
        }
    }
}

impl JobsConfig {
    /// Load from the environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, JobsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, JobsError> {
        let defaults = Self::default();
        let config = Self {
            default_timeout: secs(&lookup, ENV_DEFAULT_TIMEOUT, false)?
                .unwrap_or(defaults.default_timeout),
            sweep_interval: secs(&lookup, ENV_SWEEP_INTERVAL, true)?
                .unwrap_or(defaults.sweep_interval),
            retention: secs(&lookup, ENV_RETENTION, false)?.unwrap_or(defaults.retention),
        };
        tracing::debug!(
            default_timeout_secs = config.default_timeout.as_secs(),
            sweep_interval_secs = config.sweep_interval.as_secs(),
            retention_secs = config.retention.as_secs(),
            "Jobs config loaded"
        );
        Ok(config)
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    non_zero: bool,
) -> Result<Option<Duration>, JobsError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let invalid = || JobsError::InvalidConfig {
        key,
        value: raw.clone(),
    };
    let secs: u64 = raw.trim().parse().map_err(|_| invalid())?;
    if non_zero && secs == 0 {
        return Err(invalid());
    }
    Ok(Some(Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = JobsConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, JobsConfig::default());
        assert_eq!(config.default_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_overrides() {
        let config = JobsConfig::from_lookup(lookup(&[
            (ENV_DEFAULT_TIMEOUT, "90"),
            (ENV_SWEEP_INTERVAL, " 15 "),
            (ENV_RETENTION, "0"),
        ]))
        .unwrap();
        assert_eq!(config.default_timeout, Duration::from_secs(90));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.retention, Duration::ZERO);
    }

    #[test]
    fn test_rejects_garbage() {
        let err = JobsConfig::from_lookup(lookup(&[(ENV_RETENTION, "an hour")])).unwrap_err();
        assert!(matches!(
            err,
            JobsError::InvalidConfig { key: ENV_RETENTION, .. }
        ));
    }

    #[test]
    fn test_rejects_zero_sweep_interval() {
        let err = JobsConfig::from_lookup(lookup(&[(ENV_SWEEP_INTERVAL, "0")])).unwrap_err();
        assert!(matches!(
            err,
            JobsError::InvalidConfig { key: ENV_SWEEP_INTERVAL, .. }
        ));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(ENV_DEFAULT_TIMEOUT, "5");
        let config = JobsConfig::from_env();
        std::env::remove_var(ENV_DEFAULT_TIMEOUT);

        assert_eq!(config.unwrap().default_timeout, Duration::from_secs(5));
    }
}
