use crate::config::types::{
    Config, DatabaseConfig, ProviderConfig, QueueConfig, RecoveryConfig, UserAgentConfig,
    WorkerConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest batch a single receive may request
const MAX_RECEIVE_BATCH: usize = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_database_config(&config.database)?;
    validate_queue_config(&config.queue)?;
    validate_worker_config(&config.worker)?;
    validate_recovery_config(&config.recovery)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_providers(&config.providers)?;
    Ok(())
}

fn validate_database_config(config: &DatabaseConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "queue database_path cannot be empty".to_string(),
        ));
    }

    if config.name.is_empty()
        || !config
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "queue name must be non-empty and contain only alphanumerics, '-' or '_', got '{}'",
            config.name
        )));
    }

    if config.visibility_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "visibility_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.receive_batch_size < 1 || config.receive_batch_size > MAX_RECEIVE_BATCH {
        return Err(ConfigError::Validation(format!(
            "receive_batch_size must be between 1 and {}, got {}",
            MAX_RECEIVE_BATCH, config.receive_batch_size
        )));
    }

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.base_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "base_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
            config.base_backoff_ms, config.max_backoff_ms
        )));
    }

    if config.heartbeat_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "heartbeat_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_recovery_config(config: &RecoveryConfig) -> Result<(), ConfigError> {
    if config.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "recovery interval_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the provider chain
fn validate_providers(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
    if providers.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[provider]] must be configured".to_string(),
        ));
    }

    for provider in providers {
        let url = Url::parse(&provider.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid base-url '{}' for {:?}: {}",
                provider.base_url, provider.kind, e
            ))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Provider base-url '{}' must use HTTP or HTTPS",
                provider.base_url
            )));
        }

        if provider.max_attempts < 1 || provider.max_attempts > 10 {
            return Err(ConfigError::Validation(format!(
                "max_attempts must be between 1 and 10, got {}",
                provider.max_attempts
            )));
        }

        if provider.timeout_ms < 100 {
            return Err(ConfigError::Validation(format!(
                "provider timeout_ms must be >= 100ms, got {}ms",
                provider.timeout_ms
            )));
        }

        if provider.failure_threshold < 1 {
            return Err(ConfigError::Validation(
                "failure_threshold must be >= 1".to_string(),
            ));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProviderKind;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_providers_requires_one() {
        assert!(validate_providers(&[]).is_err());
    }

    #[test]
    fn test_validate_providers_rejects_bad_url() {
        let provider = ProviderConfig::new(ProviderKind::Viacep, "not a url");
        assert!(matches!(
            validate_providers(&[provider]),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_providers_rejects_zero_attempts() {
        let mut provider = ProviderConfig::new(ProviderKind::Opencep, "https://opencep.com/v1");
        provider.max_attempts = 0;
        assert!(validate_providers(&[provider]).is_err());
    }

    #[test]
    fn test_validate_worker_backoff_order() {
        let config = WorkerConfig {
            base_backoff_ms: 90_000,
            ..WorkerConfig::default()
        };
        assert!(validate_worker_config(&config).is_err());
        assert!(validate_worker_config(&WorkerConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_queue_batch_size() {
        let config = QueueConfig {
            receive_batch_size: 11,
            ..QueueConfig::default()
        };
        assert!(validate_queue_config(&config).is_err());
    }
}
