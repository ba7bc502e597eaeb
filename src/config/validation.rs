use crate::config::types::{
    Config, ListingConfig, OutputConfig, RenderConfig, ScannerConfig, SessionConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scanner_config(&config.scanner)?;
    validate_listing_config(&config.listing)?;
    validate_session_config(&config.session)?;
    validate_render_config(&config.render)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates scanner configuration
fn validate_scanner_config(config: &ScannerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }

    validate_workers("page-workers", config.page_workers)?;
    validate_workers("issue-workers", config.issue_workers)?;

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation("max-pages must be >= 1".to_string()));
    }

    if config.task_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "task-timeout-ms must be >= 100ms, got {}ms",
            config.task_timeout_ms
        )));
    }

    if config.backoff_max_ms < config.backoff_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must not be below backoff-ms ({})",
            config.backoff_max_ms, config.backoff_ms
        )));
    }

    if config.max_consecutive_page_failures < 1 {
        return Err(ConfigError::Validation(
            "max-consecutive-page-failures must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Pool sizes hold one rendering context per worker, so they stay bounded
fn validate_workers(name: &str, value: u32) -> Result<(), ConfigError> {
    if !(1..=100).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and 100, got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "listing path cannot be empty".to_string(),
        ));
    }

    if config.min_columns <= config.id_column {
        return Err(ConfigError::Validation(format!(
            "min-columns ({}) must exceed id-column ({})",
            config.min_columns, config.id_column
        )));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.cookie_file.is_empty() {
        return Err(ConfigError::Validation(
            "cookie-file cannot be empty".to_string(),
        ));
    }

    if config.scope_cookie.is_empty() {
        return Err(ConfigError::Validation(
            "scope-cookie cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    Ok(())
}
