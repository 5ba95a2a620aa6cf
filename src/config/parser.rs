use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded in the worker registry so operators can spot processes running
/// with diverging configuration.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ProviderKind, Role};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_CONFIG: &str = r#"
[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[[provider]]
kind = "viacep"
base-url = "https://viacep.com.br/ws"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let file = create_temp_config(MINIMAL_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.runtime.role, Role::Both);
        assert_eq!(config.worker.concurrency, 3);
        assert_eq!(config.worker.rate_limit_ms, 1_000);
        assert_eq!(config.queue.receive_batch_size, 10);
        assert_eq!(config.queue.wait_seconds, 20);
        assert_eq!(config.recovery.cooldown_minutes, 10);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, ProviderKind::Viacep);
        assert_eq!(config.providers[0].max_attempts, 3);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
[runtime]
role = "worker"

[database]
path = "./crawls.db"
busy-timeout-ms = 1000

[queue]
database-path = "./queue.db"
name = "ceps"
visibility-timeout-secs = 30
receive-batch-size = 5
wait-seconds = 2
poll-interval-ms = 50

[worker]
concurrency = 4
rate-limit-ms = 250
throttle-backoff-ms = 2000
base-backoff-ms = 100
max-backoff-ms = 1000
heartbeat-interval-secs = 5

[recovery]
cooldown-minutes = 1
interval-secs = 30

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[[provider]]
kind = "opencep"
base-url = "https://opencep.com/v1"
timeout-ms = 2000
max-attempts = 2

[[provider]]
kind = "viacep"
base-url = "https://viacep.com.br/ws"
"#;
        let config = parse_config(content).unwrap();

        assert_eq!(config.runtime.role, Role::Worker);
        assert_eq!(config.queue.name, "ceps");
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.recovery.cooldown().as_secs(), 60);
        assert_eq!(config.providers[0].kind, ProviderKind::Opencep);
        assert_eq!(config.providers[0].max_attempts, 2);
        assert_eq!(config.providers[1].kind, ProviderKind::Viacep);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let content = format!("[runtime]\nrole = \"scheduler\"\n{}", MINIMAL_CONFIG);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = format!("[worker]\nconcurrency = 0\n{}", MINIMAL_CONFIG);
        let result = parse_config(&content);
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
