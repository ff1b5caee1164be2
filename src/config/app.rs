//! Application configuration structures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::RetentionPolicy;
use crate::agent::poller::DEFAULT_SOURCE_INTERVAL;
use crate::agent::retention::{DEFAULT_CHECK_INTERVAL, default_ages};
use crate::agent::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL};
use crate::storage::{DEFAULT_MAX_DELAY, DEFAULT_MAX_ROW};

use super::validation::{ConfigError, expand_env_vars, parse_age_override};

// =============================================================================
// Constants
// =============================================================================

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Default mailbox address of the agent.
pub const DEFAULT_AGENT_NAME: &str = "fty-metric-store";

/// Default bus endpoint.
pub const DEFAULT_ENDPOINT: &str = "ipc://@/malamute";

// =============================================================================
// Sections
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`. `${VAR:-default}` is expanded.
    pub path: String,

    /// Connection pool size (default: 4).
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "metric-store.db".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Write-back cache thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Pending rows that trigger a flush (default: 1000).
    pub max_row: usize,

    /// Age of the oldest pending row that triggers a flush (default: 1s).
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_row: DEFAULT_MAX_ROW,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// A stream subscription issued at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub stream: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_pattern() -> String {
    ".*".to_string()
}

/// Bus and dispatch loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Mailbox address (default: "fty-metric-store").
    pub name: String,

    /// Bus endpoint (default: "ipc://@/malamute").
    pub endpoint: String,

    /// Bound on each inbox wait (default: 1s).
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Inbox capacity (default: 10000).
    pub channel_capacity: usize,

    /// Streams subscribed at startup (default: METRICS and ASSETS).
    pub streams: Vec<StreamConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            streams: ["METRICS", "ASSETS"]
                .into_iter()
                .map(|stream| StreamConfig {
                    stream: stream.to_string(),
                    pattern: default_pattern(),
                })
                .collect(),
        }
    }
}

/// Retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Time between retention passes (default: 1h).
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,

    /// Maximum age in days per step; 0 keeps data forever.
    pub ages: BTreeMap<String, u32>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            ages: default_ages(),
        }
    }
}

/// Pull-based metric sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Time between polls (default: 30s).
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// JSON metric files polled on every tick.
    pub files: Vec<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_SOURCE_INTERVAL,
            files: Vec::new(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub agent: AgentConfig,
    pub retention: RetentionConfig,
    pub sources: SourcesConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// Environment references in paths are expanded and
    /// `METRIC_STORE_AGE_<step>` variables override retention ages.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_age_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML and expand environment references, without validating.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.database.path = expand_env_vars(&config.database.path);
        for file in &mut config.sources.files {
            *file = PathBuf::from(expand_env_vars(&file.to_string_lossy()));
        }
        Ok(config)
    }

    /// Apply `METRIC_STORE_AGE_<step>=<days>` overrides from `vars`.
    pub fn apply_age_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            if let Some((step, days)) = parse_age_override(&key, &value)? {
                tracing::debug!(step = %step, days, "Retention age overridden from environment");
                self.retention.ages.insert(step, days);
            }
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.database.path.trim().is_empty() {
            return invalid("database path must not be empty");
        }
        if self.database.pool_size == 0 {
            return invalid("database pool_size must be positive");
        }
        if self.cache.max_row == 0 {
            return invalid("cache max_row must be positive");
        }
        if self.cache.max_delay.is_zero() {
            return invalid("cache max_delay must be positive");
        }
        if self.agent.name.is_empty() {
            return invalid("agent name must not be empty");
        }
        if self.agent.poll_interval.is_zero() {
            return invalid("agent poll_interval must be positive");
        }
        if self.agent.channel_capacity == 0 {
            return invalid("agent channel_capacity must be positive");
        }
        if let Some(s) = self.agent.streams.iter().find(|s| s.stream.is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "agent stream with pattern '{}' has no name",
                s.pattern
            )));
        }
        if self.retention.check_interval.is_zero() {
            return invalid("retention check_interval must be positive");
        }
        if self.sources.poll_interval.is_zero() {
            return invalid("sources poll_interval must be positive");
        }
        Ok(())
    }

    /// Retention policy described by the `retention` section.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            check_interval: self.retention.check_interval,
            ages: self.retention.ages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.cache.max_row, 1000);
        assert_eq!(config.cache.max_delay, Duration::from_secs(1));
        assert_eq!(config.agent.name, "fty-metric-store");
        assert_eq!(config.agent.endpoint, "ipc://@/malamute");
        assert_eq!(config.agent.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.agent.streams.len(), 2);
        assert_eq!(config.retention.ages["1h"], 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml(
            r#"
cache:
  max_row: 50
  max_delay: 250ms
retention:
  ages:
    15m: 2
agent:
  streams:
    - stream: METRICS
      pattern: "^realpower.*"
"#,
        )
        .unwrap();

        assert_eq!(config.cache.max_row, 50);
        assert_eq!(config.cache.max_delay, Duration::from_millis(250));
        assert_eq!(config.retention.ages, BTreeMap::from([("15m".to_string(), 2)]));
        assert_eq!(config.agent.streams[0].pattern, "^realpower.*");
        assert_eq!(config.agent.name, DEFAULT_AGENT_NAME);
        assert_eq!(config.database.path, "metric-store.db");
    }

    #[test]
    fn test_database_path_expansion() {
        let config =
            AppConfig::from_yaml("database:\n  path: ${NONEXISTENT_MS_DATA_4411:-/tmp}/ms.db\n")
                .unwrap();
        assert_eq!(config.database.path, "/tmp/ms.db");
    }

    #[test]
    fn test_age_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_age_overrides([
                ("METRIC_STORE_AGE_15m".to_string(), "5".to_string()),
                ("METRIC_STORE_AGE_2h".to_string(), "3".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ])
            .unwrap();
        assert_eq!(config.retention.ages["15m"], 5);
        assert_eq!(config.retention.ages["2h"], 3);
        assert_eq!(config.retention_policy().ages.len(), 9);

        let bad = config.apply_age_overrides([("METRIC_STORE_AGE_1d".to_string(), "x".to_string())]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.cache.max_row = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_row"));

        let mut config = AppConfig::default();
        config.database.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "database:\n  path: ':memory:'\n  pool_size: 2\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.database.pool_size, 2);

        std::fs::write(&path, "cache:\n  max_row: 0\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::ValidationError(_))
        ));

        assert!(matches!(
            AppConfig::load(dir.path().join("missing.yaml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
