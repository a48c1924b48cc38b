use crate::config::types::{
    Config, CrawlConfig, ExtractStageConfig, FetchStageConfig, OutputConfig, PersistStageConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Upper bound for any single stage's worker pool
const MAX_POOL_SIZE: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_fetch_config(&config.fetch)?;
    validate_extract_config(&config.extract)?;
    validate_persist_config(&config.persist)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawl-wide settings and seed URLs
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    if config.target < 1 {
        return Err(ConfigError::Validation(format!(
            "target must be >= 1, got {}",
            config.target
        )));
    }

    if config.max_urls < config.seeds.len() as u64 {
        return Err(ConfigError::Validation(format!(
            "max_urls ({}) must allow every seed URL ({})",
            config.max_urls,
            config.seeds.len()
        )));
    }

    if config.allowed_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "allowed_schemes cannot be empty".to_string(),
        ));
    }

    if config.idle_poll_ms < 1 || config.idle_poll_ms > 1_000 {
        return Err(ConfigError::Validation(format!(
            "idle_poll_ms must be between 1 and 1000, got {}",
            config.idle_poll_ms
        )));
    }

    for seed in &config.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if !config
            .allowed_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(url.scheme()))
        {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' uses scheme '{}', allowed: {:?}",
                seed,
                url.scheme(),
                config.allowed_schemes
            )));
        }
    }

    Ok(())
}

fn validate_pool_size(stage: &str, pool_size: usize) -> Result<(), ConfigError> {
    if pool_size < 1 || pool_size > MAX_POOL_SIZE {
        return Err(ConfigError::Validation(format!(
            "{}.pool_size must be between 1 and {}, got {}",
            stage, MAX_POOL_SIZE, pool_size
        )));
    }
    Ok(())
}

fn validate_queue_ceiling(stage: &str, ceiling: usize) -> Result<(), ConfigError> {
    if ceiling < 1 {
        return Err(ConfigError::Validation(format!(
            "{}.queue_ceiling must be >= 1, got {}",
            stage, ceiling
        )));
    }
    Ok(())
}

fn validate_fetch_config(config: &FetchStageConfig) -> Result<(), ConfigError> {
    validate_pool_size("fetch", config.pool_size)?;
    validate_queue_ceiling("fetch", config.queue_ceiling)?;

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch.timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    Ok(())
}

/// Validates extraction stage settings, including every selector
fn validate_extract_config(config: &ExtractStageConfig) -> Result<(), ConfigError> {
    validate_pool_size("extract", config.pool_size)?;
    validate_queue_ceiling("extract", config.queue_ceiling)?;

    if config.id_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "extract.id_selectors cannot be empty".to_string(),
        ));
    }

    validate_selector(&config.item_selector)?;
    for selector in config
        .id_selectors
        .iter()
        .chain(config.description_selectors.iter())
    {
        validate_selector(selector)?;
    }

    Ok(())
}

fn validate_persist_config(config: &PersistStageConfig) -> Result<(), ConfigError> {
    validate_pool_size("persist", config.pool_size)
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
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

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
