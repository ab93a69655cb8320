//! Domain-driven configuration management for the load agent
//!
//! Configuration is split by functional domain (queues, logging), each with
//! its own defaults and validation. Values come from an optional YAML file and
//! are then overridden by `LOADAGENT_*` environment variables.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    logging::{LogFormat, LogLevel, LoggingConfig},
    queues::QueueConfig,
    AgentConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
