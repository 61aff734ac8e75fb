use super::{types::Config, ConfigError, UsageMethod};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }
    if config.server.max_upload_bytes == 0 {
        return Err(invalid("server.max_upload_bytes cannot be 0"));
    }

    if config.usage.method == UsageMethod::DailyQuota && config.usage.daily_limit == 0 {
        return Err(invalid(
            "usage.daily_limit must be at least 1 when method is daily_quota",
        ));
    }

    let conversion = &config.conversion;
    let timeouts = [
        ("conversion.default_timeout_secs", Some(conversion.default_timeout_secs)),
        ("conversion.image_timeout_secs", conversion.image_timeout_secs),
        ("conversion.document_timeout_secs", conversion.document_timeout_secs),
        ("conversion.video_timeout_secs", conversion.video_timeout_secs),
        ("conversion.audio_timeout_secs", conversion.audio_timeout_secs),
        ("conversion.enrich_timeout_secs", Some(conversion.enrich_timeout_secs)),
    ];
    for (name, value) in timeouts {
        if value == Some(0) {
            return Err(invalid(format!("{} cannot be 0", name)));
        }
    }

    if !(1..=100).contains(&conversion.default_image_quality) {
        return Err(invalid("conversion.default_image_quality must be within 1-100"));
    }
    if conversion.max_input_bytes == 0 {
        return Err(invalid("conversion.max_input_bytes cannot be 0"));
    }

    if let Some(remote) = &config.remote {
        let url = remote.url.trim();
        if url.is_empty() {
            return Err(invalid("remote.url cannot be empty"));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(invalid("remote.url must start with http:// or https://"));
        }
        if remote.timeout_secs == 0 {
            return Err(invalid("remote.timeout_secs cannot be 0"));
        }
    }

    if config.summary.max_sentences == 0 {
        return Err(invalid("summary.max_sentences cannot be 0"));
    }

    if config.events.enabled && config.events.buffer_size == 0 {
        return Err(invalid("events.buffer_size cannot be 0"));
    }

    Ok(())
}
