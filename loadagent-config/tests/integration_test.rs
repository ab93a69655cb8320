//! Integration tests for loadagent-config

use loadagent_config::*;
use std::io::Write;
use std::time::Duration;
use temp_env::{with_vars, with_vars_unset};

const ALL_VARS: [&str; 6] = [
    "LOADAGENT_LOG_LEVEL",
    "LOADAGENT_LOG_FORMAT",
    "LOADAGENT_MAX_THREADS_PER_QUEUE",
    "LOADAGENT_CANCEL_TIMEOUT",
    "LOADAGENT_LATENCY_SAMPLES_LIMIT",
    "LOADAGENT_DEFAULT_CALLER",
];

#[test]
fn test_default_config_validation() {
    let config = AgentConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("LOADAGENT_LOG_LEVEL", Some("debug")),
        ("LOADAGENT_LOG_FORMAT", Some("json")),
        ("LOADAGENT_MAX_THREADS_PER_QUEUE", Some("250")),
        ("LOADAGENT_CANCEL_TIMEOUT", Some("5")),
        ("LOADAGENT_LATENCY_SAMPLES_LIMIT", Some("1000")),
        ("LOADAGENT_DEFAULT_CALLER", Some("ci-runner")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.queues.max_threads_per_queue, 250);
        assert_eq!(config.queues.cancel_timeout, Duration::from_secs(5));
        assert_eq!(config.queues.latency_samples_limit, 1000);
        assert_eq!(config.queues.default_caller, "ci-runner");
    });
}

#[test]
fn test_invalid_env_values_are_rejected() {
    with_vars(vec![("LOADAGENT_MAX_THREADS_PER_QUEUE", Some("lots"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
        assert!(err.to_string().contains("MAX_THREADS_PER_QUEUE"));
    });

    with_vars(vec![("LOADAGENT_LOG_LEVEL", Some("shouty"))], || {
        assert!(ConfigLoader::new().from_env().is_err());
    });

    // Parses, but fails domain validation
    with_vars(vec![("LOADAGENT_MAX_THREADS_PER_QUEUE", Some("0"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::DomainError { ref domain, .. } if domain == "queues"));
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("AGENT_X_CANCEL_TIMEOUT", Some("9"))], || {
        let config = ConfigLoader::with_prefix("AGENT_X").from_env().unwrap();
        assert_eq!(config.queues.cancel_timeout, Duration::from_secs(9));
    });
}

#[test]
fn test_yaml_config_serialization() {
    let yaml = AgentConfig::generate_sample();
    let parsed: AgentConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, AgentConfig::default());
    assert!(parsed.validate_all().is_ok());
}

#[test]
fn test_config_file_with_env_override() {
    let yaml = r#"
queues:
  max_threads_per_queue: 64
  cancel_timeout: 10

logging:
  level: warn
  format: pretty
  include_location: true
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars_unset(ALL_VARS.to_vec(), || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();
        assert_eq!(config.queues.max_threads_per_queue, 64);
        assert_eq!(config.queues.cancel_timeout, Duration::from_secs(10));
        assert_eq!(config.queues.latency_samples_limit, 100_000);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.include_location);
    });

    with_vars(vec![("LOADAGENT_CANCEL_TIMEOUT", Some("3"))], || {
        let config = ConfigLoader::new().from_file(file.path()).unwrap();
        assert_eq!(config.queues.cancel_timeout, Duration::from_secs(3));
    });
}

#[test]
fn test_missing_and_malformed_files() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("absent.yaml");
    assert!(matches!(
        ConfigLoader::new().from_file(&missing),
        Err(ConfigError::FileReadError(_))
    ));

    let malformed = dir.path().join("broken.yaml");
    std::fs::write(&malformed, "queues: [not, a, map").unwrap();
    assert!(matches!(
        ConfigLoader::new().from_file(&malformed),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_load_without_path_reads_env() {
    with_vars_unset(ALL_VARS.to_vec(), || {
        let config = ConfigLoader::new().load(None::<&str>).unwrap();
        assert_eq!(config, AgentConfig::default());
    });
}

#[test]
fn test_json_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.json");
    std::fs::write(
        &path,
        r#"{"queues": {"default_caller": "json-runner"}, "logging": {"format": "compact"}}"#,
    )
    .unwrap();

    with_vars_unset(ALL_VARS.to_vec(), || {
        let config = ConfigLoader::new().from_file(&path).unwrap();
        assert_eq!(config.queues.default_caller, "json-runner");
        assert_eq!(config.logging.format, LogFormat::Compact);
    });

    std::fs::write(&path, "{\"queues\": ").unwrap();
    assert!(matches!(
        ConfigLoader::new().from_file(&path),
        Err(ConfigError::JsonError(_))
    ));
}
