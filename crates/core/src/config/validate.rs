use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Bot token is not blank
/// - Both stages allow at least one worker
/// - Encoder frame rate and width are usable
/// - Archive size limit is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.telegram.bot_token.trim().is_empty() {
        return Err(invalid("telegram.bot_token cannot be empty"));
    }

    if config.download.concurrency == 0 {
        return Err(invalid("download.concurrency must be at least 1"));
    }

    if config.converter.concurrency == 0 {
        return Err(invalid("converter.concurrency must be at least 1"));
    }

    if config.converter.fps == 0 {
        return Err(invalid("converter.fps must be at least 1"));
    }

    if config.converter.width != -1 && config.converter.width < 1 {
        return Err(invalid("converter.width must be -1 or a positive width"));
    }

    if config.archive.size_limit_bytes == 0 {
        return Err(invalid("archive.size_limit_bytes cannot be 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
