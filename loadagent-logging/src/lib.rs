//! Logging initialisation for the load agent
//!
//! Every crate in the workspace emits diagnostics through `tracing`; this
//! crate installs the global subscriber that renders them.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
pub use loadagent_config::{LogFormat, LogLevel, LoggingConfig};
