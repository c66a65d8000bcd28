//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if !(config.source.uri.starts_with("mongodb://")
        || config.source.uri.starts_with("mongodb+srv://"))
    {
        return Err(MigrateError::Config(
            "source.uri must start with 'mongodb://' or 'mongodb+srv://'".into(),
        ));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.collection.is_empty() {
        return Err(MigrateError::Config("source.collection is required".into()));
    }

    // Target validation
    if config.target.endpoint.is_empty() {
        return Err(MigrateError::Config(
            "target.endpoint is required (set HCD_API_ENDPOINT)".into(),
        ));
    }
    if !(config.target.endpoint.starts_with("http://")
        || config.target.endpoint.starts_with("https://"))
    {
        return Err(MigrateError::Config(format!(
            "target.endpoint must be an http(s) URL, got '{}'",
            config.target.endpoint
        )));
    }
    if config.target.username.is_empty() {
        return Err(MigrateError::Config(
            "target.username is required (set HCD_USERNAME)".into(),
        ));
    }
    if config.target.password.is_empty() {
        return Err(MigrateError::Config(
            "target.password is required (set HCD_PASSWORD)".into(),
        ));
    }
    if config.target.keyspace.is_empty() {
        return Err(MigrateError::Config("target.keyspace is required".into()));
    }
    if config.target.collection.is_empty() {
        return Err(MigrateError::Config("target.collection is required".into()));
    }
    if config.target.request_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "target.request_timeout_secs must be at least 1".into(),
        ));
    }

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.workers == 0 {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if config.migration.identity_field.is_empty() {
        return Err(MigrateError::Config(
            "migration.identity_field is required".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig::default(),
            target: TargetConfig {
                endpoint: "http://localhost:8181".to_string(),
                username: "cassandra".to_string(),
                password: "cassandra".to_string(),
                keyspace: "default_keyspace".to_string(),
                collection: "subscribers".to_string(),
                request_timeout_secs: 30,
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_endpoint() {
        let mut config = valid_config();
        config.target.endpoint = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("HCD_API_ENDPOINT"));
    }

    #[test]
    fn test_zero_request_timeout() {
        let mut config = valid_config();
        config.target.request_timeout_secs = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_bad_source_uri() {
        let mut config = valid_config();
        config.source.uri = "postgres://localhost/db".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid_config();
        config.migration.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_single_worker_is_sequential() {
        let mut config = valid_config();
        config.migration.workers = 1;
        assert!(validate(&config).is_ok());
        assert!(config.migration.is_sequential());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
