//! Configuration errors

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything that can go wrong while loading or validating an
/// [`AgentConfig`](crate::AgentConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Invalid YAML configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A `LOADAGENT_*` variable is set but cannot be parsed
    #[error("Invalid environment override: {0}")]
    EnvError(String),

    /// A value parsed but is out of range for its domain
    #[error("Domain configuration error in {domain}: {message}")]
    DomainError { domain: String, message: String },
}
