use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

const ENV_PREFIX: &str = "CHRONOS_";

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are separated by a double underscore, e.g.
/// `CHRONOS_UPLOAD__CHUNK_SIZE_BYTES=1048576`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load built-in defaults with environment variable overrides (no file).
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[control_plane]
url = "http://127.0.0.1:9000"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.control_plane.url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[upload]
chunk_size_bytes = "five megabytes"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/chronos.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[control_plane]
url = "http://uploads.internal:5000"

[poller]
poll_interval_ms = 1500
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.control_plane.url, "http://uploads.internal:5000");
        assert_eq!(config.poller.poll_interval_ms, 1500);
        // Untouched sections keep their defaults
        assert_eq!(config.upload.chunk_size_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../chronos.example.toml");
        let config = load_config(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.control_plane.url, defaults.control_plane.url);
        assert_eq!(
            config.control_plane.part_timeout_secs,
            defaults.control_plane.part_timeout_secs
        );
        assert_eq!(config.upload.chunk_size_bytes, defaults.upload.chunk_size_bytes);
        assert_eq!(
            config.upload.max_concurrent_parts,
            defaults.upload.max_concurrent_parts
        );
        assert_eq!(config.upload.retry, defaults.upload.retry);
        assert_eq!(config.poller, defaults.poller);
        assert!(crate::config::validate_config(&config).is_ok());
    }
}
