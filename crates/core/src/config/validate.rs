use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Scheduler admits at least one pipeline
/// - Engine allows at least one iteration and a non-zero stage timeout
/// - Stage service URL is set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.scheduler.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_concurrent must be at least 1".to_string(),
        ));
    }

    if config.engine.max_iterations == 0 {
        return Err(ConfigError::ValidationError(
            "engine.max_iterations must be at least 1".to_string(),
        ));
    }

    if config.engine.stage_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.stage_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.stages.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "stages.base_url cannot be empty".to_string(),
        ));
    }

    Ok(())
}
