//! Control plane configuration.
//!
//! Defaults are usable as-is for local runs. Deployments override individual
//! values through `STRATA_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::retention::SafetyWindow;
use strata_core::{Error, Result};

const ENV_APPROVAL_TIMEOUT_SECS: &str = "STRATA_APPROVAL_TIMEOUT_SECS";
const ENV_COMMIT_LOCK_TTL_SECS: &str = "STRATA_COMMIT_LOCK_TTL_SECS";
const ENV_GC_ONPREM_DELAY_SECS: &str = "STRATA_GC_ONPREM_DELAY_SECS";
const ENV_GC_CLOUD_DELAY_SECS: &str = "STRATA_GC_CLOUD_DELAY_SECS";
const ENV_WORKER_POLL_INTERVAL_SECS: &str = "STRATA_WORKER_POLL_INTERVAL_SECS";
const ENV_RETRY_FAILED_EVENTS: &str = "STRATA_RETRY_FAILED_EVENTS";
const ENV_TABLE_DATA_PATH_PREFIX: &str = "STRATA_TABLE_DATA_PATH_PREFIX";

/// Configuration shared by the coordinators and region workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// How long a write waits for every required region to vote.
    pub approval_timeout: Duration,
    /// TTL of the per-table commit lock.
    pub commit_lock_ttl: Duration,
    /// Delay between delete plan generation and execution, per side.
    pub safety_window: SafetyWindow,
    /// Sleep between region worker passes.
    pub worker_poll_interval: Duration,
    /// Whether region workers re-queue failed sync events each pass.
    pub retry_failed_events: bool,
    /// Prefix of table data paths registered by metadata sync.
    pub table_data_path_prefix: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            approval_timeout: Duration::from_secs(30),
            commit_lock_ttl: Duration::from_secs(60),
            safety_window: SafetyWindow::default(),
            worker_poll_interval: Duration::from_secs(5),
            retry_failed_events: true,
            table_data_path_prefix: "tables".to_string(),
        }
    }
}

impl ControlConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the variable when a value does
    /// not parse, or when the resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = env_u64(&get_env, ENV_APPROVAL_TIMEOUT_SECS)? {
            config.approval_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64(&get_env, ENV_COMMIT_LOCK_TTL_SECS)? {
            config.commit_lock_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64(&get_env, ENV_GC_ONPREM_DELAY_SECS)? {
            config.safety_window.onprem_delay_secs = secs;
        }
        if let Some(secs) = env_u64(&get_env, ENV_GC_CLOUD_DELAY_SECS)? {
            config.safety_window.cloud_delay_secs = secs;
        }
        if let Some(secs) = env_u64(&get_env, ENV_WORKER_POLL_INTERVAL_SECS)? {
            config.worker_poll_interval = Duration::from_secs(secs);
        }
        if let Some(value) = env_bool(&get_env, ENV_RETRY_FAILED_EVENTS)? {
            config.retry_failed_events = value;
        }
        if let Some(prefix) = env_string(&get_env, ENV_TABLE_DATA_PATH_PREFIX) {
            config.table_data_path_prefix = prefix.trim_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a timeout is zero, the commit lock
    /// could expire while a write still waits for votes, a GC delay is too
    /// large to represent, or the cloud GC delay is shorter than the on-prem
    /// one.
    pub fn validate(&self) -> Result<()> {
        if self.approval_timeout.is_zero() {
            return Err(Error::InvalidInput(format!(
                "{ENV_APPROVAL_TIMEOUT_SECS} must be greater than zero"
            )));
        }
        if self.commit_lock_ttl.is_zero() {
            return Err(Error::InvalidInput(format!(
                "{ENV_COMMIT_LOCK_TTL_SECS} must be greater than zero"
            )));
        }
        if self.worker_poll_interval.is_zero() {
            return Err(Error::InvalidInput(format!(
                "{ENV_WORKER_POLL_INTERVAL_SECS} must be greater than zero"
            )));
        }
        if self.commit_lock_ttl <= self.approval_timeout {
            return Err(Error::InvalidInput(format!(
                "{ENV_COMMIT_LOCK_TTL_SECS} ({}s) must exceed {ENV_APPROVAL_TIMEOUT_SECS} ({}s)",
                self.commit_lock_ttl.as_secs(),
                self.approval_timeout.as_secs()
            )));
        }
        for (name, secs) in [
            (ENV_GC_ONPREM_DELAY_SECS, self.safety_window.onprem_delay_secs),
            (ENV_GC_CLOUD_DELAY_SECS, self.safety_window.cloud_delay_secs),
        ] {
            if secs > SafetyWindow::MAX_DELAY_SECS {
                return Err(Error::InvalidInput(format!(
                    "{name} must be at most {}",
                    SafetyWindow::MAX_DELAY_SECS
                )));
            }
        }
        if self.safety_window.cloud_delay_secs < self.safety_window.onprem_delay_secs {
            return Err(Error::InvalidInput(format!(
                "{ENV_GC_CLOUD_DELAY_SECS} ({}) must be at least {ENV_GC_ONPREM_DELAY_SECS} ({})",
                self.safety_window.cloud_delay_secs, self.safety_window.onprem_delay_secs
            )));
        }
        Ok(())
    }

    /// Data path registered for a table replica.
    #[must_use]
    pub fn table_data_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{namespace}/{name}", self.table_data_path_prefix)
    }
}

fn env_string<F>(get_env: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get_env(name).and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u64<F>(get_env: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(v) = env_string(get_env, name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

fn env_bool<F>(get_env: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(v) = env_string(get_env, name) else {
        return Ok(None);
    };
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(Some(true)),
        "false" | "0" | "no" | "n" => Ok(Some(false)),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}
