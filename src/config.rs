//! `fleetform.toml` and input file loading
//!
//! ```toml
//! profile = "lab"
//! secrets = ["root@pam!ci=0c5f..."]
//! audit_log = "~/fleet/audit.log"
//!
//! [executor]
//! poll_interval_secs = 2
//! task_timeout_secs = 1800
//!
//! [capacity]
//! elevated = 0.8
//! high = 0.95
//! ```

use anyhow::{Context, Result, bail};
use converge::{CapacityPolicy, ExecuteOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetformConfig {
    /// Environment name used when the desired spec does not set `env`
    pub profile: Option<String>,
    /// Literal values scrubbed from every message, output and audit line
    pub secrets: Vec<String>,
    /// Audit log override (default: `audit.log` in the state dir)
    pub audit_log: Option<String>,
    pub executor: ExecutorConfig,
    pub capacity: CapacityPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub poll_interval_secs: u64,
    pub task_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let defaults = ExecuteOptions::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            task_timeout_secs: defaults.task_timeout.as_secs(),
        }
    }
}

impl FleetformConfig {
    /// Load the config
    ///
    /// An explicit path must exist. Without one, a missing `fleetform.toml`
    /// in the config dir means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.executor.poll_interval_secs == 0 {
            bail!("executor.poll_interval_secs must be at least 1");
        }
        if self.executor.task_timeout_secs < self.executor.poll_interval_secs {
            bail!("executor.task_timeout_secs must not be shorter than the poll interval");
        }
        let (elevated, high) = (self.capacity.elevated, self.capacity.high);
        if !(0.0..=1.0).contains(&elevated) || !(0.0..=1.0).contains(&high) || elevated > high {
            bail!("capacity thresholds must satisfy 0 <= elevated <= high <= 1");
        }
        Ok(())
    }

    /// Executor options for one run
    pub fn execute_options(&self, dry_run: bool, yes: bool) -> ExecuteOptions {
        ExecuteOptions {
            dry_run,
            yes,
            poll_interval: Duration::from_secs(self.executor.poll_interval_secs),
            task_timeout: Duration::from_secs(self.executor.task_timeout_secs),
            secrets: self.secrets.clone(),
        }
    }

    pub fn audit_log_path(&self) -> Result<PathBuf> {
        match &self.audit_log {
            Some(path) => Ok(paths::expand(path)),
            None => paths::audit_log(),
        }
    }
}

/// Read a spec, state or plan file, TOML or JSON by extension
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display())),
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
        _ => bail!(
            "Unsupported file type for {} (expected .toml or .json)",
            path.display()
        ),
    }
}

/// Write a JSON artifact, creating parent directories
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content + "\n").with_context(|| format!("Could not write {}", path.display()))
}
