use super::{types::Config, ConfigError};

/// Highest part number a multipart upload accepts.
pub const MAX_PARTS: u64 = 10_000;

/// Validate configuration
/// Currently validates:
/// - Control plane URL is an http(s) URL and neither timeout is 0
/// - Chunk size and object ceiling are non-zero and fit in `MAX_PARTS` parts
/// - Retry policy allows at least one attempt
/// - Poll interval is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let url = config.control_plane.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "control_plane.url must be an http(s) URL, got {:?}",
            config.control_plane.url
        )));
    }
    if config.control_plane.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "control_plane.timeout_secs cannot be 0".to_string(),
        ));
    }
    if config.control_plane.part_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "control_plane.part_timeout_secs cannot be 0".to_string(),
        ));
    }

    let upload = &config.upload;
    if upload.chunk_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "upload.chunk_size_bytes cannot be 0".to_string(),
        ));
    }
    if upload.max_object_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "upload.max_object_size_bytes cannot be 0".to_string(),
        ));
    }
    let max_parts = upload.max_object_size_bytes.div_ceil(upload.chunk_size_bytes);
    if max_parts > MAX_PARTS {
        return Err(ConfigError::ValidationError(format!(
            "upload.max_object_size_bytes / upload.chunk_size_bytes needs {} parts, limit is {}",
            max_parts, MAX_PARTS
        )));
    }
    if upload.accepted_media_category.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "upload.accepted_media_category cannot be empty".to_string(),
        ));
    }
    if upload.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "upload.retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.poller.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "poller.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}
