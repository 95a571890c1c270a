//! Agent configuration, read once at startup from TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::collector::ProviderPaths;

/// Searched in order when no explicit path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/hostmeter/agent.toml", "./etc/hostmeter/agent.toml"];

/// Built-in meters and whether each runs when not configured.
pub const DEFAULT_METERS: &[(&str, bool)] = &[
    ("cpu", true),
    ("host", true),
    ("disk", true),
    ("memory", true),
    ("network", true),
    ("load", true),
    ("process", false),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub settings: Settings,
    pub orchestrator: OrchestratorConfig,
    pub provider: ProviderPaths,
    pub meters: BTreeMap<String, MeterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// `disable` or `require`.
    pub sslmode: String,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "hostmeter".to_string(),
            password: String::new(),
            database: "hostmeter".to_string(),
            sslmode: "disable".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log per-collect timings.
    pub debug: bool,
    /// Use the in-memory store instead of the database.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Period of the global collect event; 0 disables it.
    pub collect_tick_ms: u64,
    pub start_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collect_tick_ms: 0,
            start_timeout_ms: 10_000,
            stop_timeout_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn collect_tick(&self) -> Option<Duration> {
        (self.collect_tick_ms > 0).then(|| Duration::from_millis(self.collect_tick_ms))
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Per-meter settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub active: bool,
    pub collect_interval_ms: u64,
    /// Buffered samples that trigger a flush.
    pub aggregate_threshold: usize,
    /// Process meter only: `comm` names to track.
    pub process_names: Vec<String>,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            active: true,
            collect_interval_ms: 1000,
            aggregate_threshold: 60,
            process_names: Vec::new(),
        }
    }
}

impl MeterConfig {
    pub fn collect_interval(&self) -> Duration {
        Duration::from_millis(self.collect_interval_ms)
    }
}

impl AgentConfig {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Loads the first file of [`DEFAULT_CONFIG_PATHS`] that exists, or
    /// defaults. Returns the path that was read, if any.
    pub fn discover() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::discover_in(DEFAULT_CONFIG_PATHS)
    }

    fn discover_in(candidates: &[&str]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for candidate in candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Ok((Self::load(path)?, Some(path.to_path_buf())));
            }
        }
        debug!(paths = ?candidates, "no config file found");
        Ok((Self::default().with_default_meters(), None))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        let config = config.with_default_meters();
        config.validate()?;
        Ok(config)
    }

    /// Adds built-in meters missing from the `[meters]` table.
    fn with_default_meters(mut self) -> Self {
        for (name, active) in DEFAULT_METERS {
            self.meters
                .entry(name.to_string())
                .or_insert_with(|| MeterConfig {
                    active: *active,
                    ..MeterConfig::default()
                });
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, meter) in self.active_meters() {
            if meter.collect_interval_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "meters.{}.collect_interval_ms must be greater than 0",
                    name
                )));
            }
            if meter.aggregate_threshold == 0 {
                return Err(ConfigError::Invalid(format!(
                    "meters.{}.aggregate_threshold must be at least 1",
                    name
                )));
            }
        }
        if self.orchestrator.start_timeout_ms == 0 || self.orchestrator.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Active meters in name order.
    pub fn active_meters(&self) -> impl Iterator<Item = (&str, &MeterConfig)> {
        self.meters
            .iter()
            .filter(|(_, m)| m.active)
            .map(|(name, m)| (name.as_str(), m))
    }
}
