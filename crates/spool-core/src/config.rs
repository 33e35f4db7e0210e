//! Scheduler configuration (spool.toml)
//!
//! Settings come from an optional TOML file, then `SPOOL_*` environment
//! variables override individual keys.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment override could not be parsed
    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },

    /// Validation error
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Scheduler settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Maximum number of live tasks (None = unlimited)
    pub max_tasks: Option<usize>,

    /// Maximum outstanding delegations per task (None = unlimited)
    pub max_delegation_depth: Option<usize>,

    /// Upper bound on a single blocking poll, in milliseconds
    pub max_poll_interval_ms: Option<u64>,

    /// Log filter used by front ends (e.g. "info", "spool_core=debug")
    pub log_level: Option<String>,
}

impl SchedulerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load the file at `path` if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `SPOOL_*` overrides looked up through `lookup`
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = parse_env(&lookup, "SPOOL_MAX_TASKS")? {
            self.max_tasks = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "SPOOL_MAX_DELEGATION_DEPTH")? {
            self.max_delegation_depth = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "SPOOL_MAX_POLL_INTERVAL_MS")? {
            self.max_poll_interval_ms = Some(v);
        }
        if let Some(level) = lookup("SPOOL_LOG_LEVEL") {
            self.log_level = Some(level);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == Some(0) {
            return Err(ConfigError::Invalid("max_tasks must be at least 1".into()));
        }
        Ok(())
    }

    pub fn max_poll_interval(&self) -> Option<Duration> {
        self.max_poll_interval_ms.map(Duration::from_millis)
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env {
                var: var.to_string(),
                message: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_parse_full() {
        let config = SchedulerConfig::from_toml_str(
            r#"
max_tasks = 64
max_delegation_depth = 1000
max_poll_interval_ms = 250
log_level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.max_tasks, Some(64));
        assert_eq!(config.max_delegation_depth, Some(1000));
        assert_eq!(config.max_poll_interval(), Some(Duration::from_millis(250)));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(SchedulerConfig::from_toml_str("").unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn test_rejects_unknown_and_invalid() {
        assert!(matches!(
            SchedulerConfig::from_toml_str("workers = 4"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            SchedulerConfig::from_toml_str("max_tasks = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_tasks = 8\nmax_poll_interval_ms = 100").unwrap();

        let env: HashMap<&str, &str> = [("SPOOL_MAX_TASKS", "16"), ("SPOOL_LOG_LEVEL", "trace")]
            .into_iter()
            .collect();
        let config = SchedulerConfig::from_file(file.path())
            .unwrap()
            .with_env_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_tasks, Some(16));
        assert_eq!(config.max_poll_interval_ms, Some(100));
        assert_eq!(config.log_level.as_deref(), Some("trace"));
    }

    #[test]
    fn test_bad_env_value() {
        let err = SchedulerConfig::default()
            .with_env_overrides(|var| (var == "SPOOL_MAX_DELEGATION_DEPTH").then(|| "deep".to_string()))
            .unwrap_err();
        match err {
            ConfigError::Env { var, .. } => assert_eq!(var, "SPOOL_MAX_DELEGATION_DEPTH"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SchedulerConfig::from_file("/nonexistent/spool.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
