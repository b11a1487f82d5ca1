use super::{types::Config, ConfigError};

/// Validate configuration beyond what serde enforces. A failure here is fatal
/// at startup: the process must not begin scheduling with a bad config.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let dl = &config.download;

    if !dl.base_url.starts_with("http://") && !dl.base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "download.base_url must be an http(s) URL, got '{}'",
            dl.base_url
        )));
    }

    if dl.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "download.timeout_secs cannot be 0".to_string(),
        ));
    }

    if dl.retry_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "download.retry_attempts must be at least 1".to_string(),
        ));
    }

    if dl.rate_limit_rpm == 0 {
        return Err(ConfigError::ValidationError(
            "download.rate_limit_rpm cannot be 0".to_string(),
        ));
    }

    if dl.min_file_size_bytes > dl.max_file_size_bytes {
        return Err(ConfigError::ValidationError(format!(
            "download.min_file_size_bytes ({}) exceeds max_file_size_bytes ({})",
            dl.min_file_size_bytes, dl.max_file_size_bytes
        )));
    }

    if config.scheduler.period().is_zero() {
        return Err(ConfigError::ValidationError(
            "scheduler periodicity cannot be 0".to_string(),
        ));
    }

    if config.cycle.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "cycle.batch_size cannot be 0".to_string(),
        ));
    }

    if config.cycle.failure_alert_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "cycle.failure_alert_threshold must be at least 1".to_string(),
        ));
    }

    if config.cleanup.enabled && config.cleanup.retention_days == 0 {
        return Err(ConfigError::ValidationError(
            "cleanup.retention_days cannot be 0 while cleanup is enabled".to_string(),
        ));
    }

    Ok(())
}
