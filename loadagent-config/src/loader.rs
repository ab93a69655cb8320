//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::queues::QueueConfig;
use crate::domains::AgentConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with the `LOADAGENT` prefix
    pub fn new() -> Self {
        Self {
            prefix: "LOADAGENT".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML (or `.json`) file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<AgentConfig> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config: AgentConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<AgentConfig> {
        let mut config = AgentConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<AgentConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut AgentConfig) -> ConfigResult<()> {
        self.apply_queue_overrides(&mut config.queues)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_queue_overrides(&self, config: &mut QueueConfig) -> ConfigResult<()> {
        if let Some(max_threads) = self.parse_env_var::<usize>("MAX_THREADS_PER_QUEUE")? {
            config.max_threads_per_queue = max_threads;
        }

        if let Some(seconds) = self.parse_env_var::<u64>("CANCEL_TIMEOUT")? {
            config.cancel_timeout = Duration::from_secs(seconds);
        }

        if let Some(limit) = self.parse_env_var::<usize>("LATENCY_SAMPLES_LIMIT")? {
            config.latency_samples_limit = limit;
        }

        if let Ok(caller) = self.get_env_var("DEFAULT_CALLER") {
            config.default_caller = caller;
        }

        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Some(level) = self.parse_env_var::<LogLevel>("LOG_LEVEL")? {
            config.level = level;
        }

        if let Some(format) = self.parse_env_var::<LogFormat>("LOG_FORMAT")? {
            config.format = format;
        }

        Ok(())
    }

    /// Read and parse a prefixed variable; unset is `Ok(None)`
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e))),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
