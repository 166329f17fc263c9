use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// What a mutating operation does when the job id is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingJobPolicy {
    /// Silently do nothing.
    #[default]
    Ignore,
    /// Return `CoreError::NotFound`.
    Error,
}

impl FromStr for MissingJobPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "error" => Ok(Self::Error),
            other => Err(CoreError::Validation(format!(
                "missing job policy must be 'ignore' or 'error', got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub missing_job_policy: MissingJobPolicy,
    /// No timeout when unset; a hung executor then keeps its job `Running`.
    pub executor_timeout_secs: Option<u64>,
    /// Buffer of the job event broadcast channel.
    pub event_capacity: usize,
    /// Mark jobs persisted as `Running` as `Failed` when loading.
    pub recover_interrupted_runs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            missing_job_policy: MissingJobPolicy::Ignore,
            executor_timeout_secs: None,
            event_capacity: 256,
            recover_interrupted_runs: true,
        }
    }
}

impl EngineConfig {
    pub fn executor_timeout(&self) -> Option<Duration> {
        self.executor_timeout_secs.map(Duration::from_secs)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `OPENSCAN_*` keys through `lookup`; absent keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(policy) = lookup("OPENSCAN_MISSING_JOB_POLICY") {
            config.missing_job_policy = policy.parse()?;
        }
        if let Some(secs) = parse_var(&lookup, "OPENSCAN_EXECUTOR_TIMEOUT_SECS")? {
            config.executor_timeout_secs = Some(secs);
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "OPENSCAN_EVENT_CAPACITY")? {
            if capacity == 0 {
                return Err(CoreError::Validation(
                    "OPENSCAN_EVENT_CAPACITY must be positive".to_string(),
                ));
            }
            config.event_capacity = capacity;
        }
        if let Some(recover) = parse_var(&lookup, "OPENSCAN_RECOVER_INTERRUPTED")? {
            config.recover_interrupted_runs = recover;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub simulated_delay_ms: u64,
    /// Directory of extra YAML finding templates.
    pub catalog_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            simulated_delay_ms: 15_000,
            catalog_dir: None,
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(delay) = parse_var(&lookup, "OPENSCAN_SIMULATED_DELAY_MS")? {
            config.simulated_delay_ms = delay;
        }
        config.catalog_dir = lookup("OPENSCAN_CATALOG_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CoreError::Validation(format!("{}: {}", key, e))),
    }
}
