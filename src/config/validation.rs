//! Configuration value parsing and error types.

use std::time::Duration;

use thiserror::Error;

/// Prefix of environment variables overriding a retention step age.
pub const AGE_ENV_PREFIX: &str = "METRIC_STORE_AGE_";

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse a humantime duration such as `1s`, `500ms` or `1h30m`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand `${VAR}` and `${VAR:-default}` references in a string.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(&caps[1]).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

/// Step name and age in days from a `METRIC_STORE_AGE_<step>` variable.
///
/// Returns `Ok(None)` for variables without the prefix.
pub fn parse_age_override(key: &str, value: &str) -> Result<Option<(String, u32)>, ConfigError> {
    let Some(step) = key.strip_prefix(AGE_ENV_PREFIX) else {
        return Ok(None);
    };
    if step.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{key}: missing step name"
        )));
    }
    let days = value.trim().parse::<u32>().map_err(|_| {
        ConfigError::ValidationError(format!("{key}: '{value}' is not a number of days"))
    })?;
    Ok(Some((step.to_string(), days)))
}
