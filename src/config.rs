//! Configuration module for the metric store agent.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Database settings (path, pool size)
//! - Cache thresholds (max rows, max delay)
//! - Agent bus settings (name, endpoint, streams, poll interval)
//! - Retention ages per aggregation step
//! - Pull-based metric sources

mod app;
mod validation;

pub use app::{
    AgentConfig, AppConfig, CacheConfig, DEFAULT_AGENT_NAME, DEFAULT_ENDPOINT, DEFAULT_POOL_SIZE,
    DatabaseConfig, RetentionConfig, SourcesConfig, StreamConfig,
};
pub use validation::{AGE_ENV_PREFIX, ConfigError, expand_env_vars, parse_age_override, parse_duration};
