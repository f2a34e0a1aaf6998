//! Loading [`SessionConfig`] from a JSON file.
//!
//! Every field is optional; whatever the file leaves out keeps its
//! default. The loaded config is passed through
//! [`SessionConfig::validated`] before it is returned.

use std::path::{Path, PathBuf};

use vigil_session::SessionConfig;

/// Why a config file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a session config from the JSON file at `path`.
///
/// # Errors
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
/// if it is not a valid config object.
pub fn load_config(path: impl AsRef<Path>) -> Result<SessionConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    let config = parse_config(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;
    tracing::debug!(path = %path.display(), ?config, "session config loaded");
    Ok(config)
}

/// Parses and validates a session config from JSON text.
pub fn parse_config(raw: &str) -> Result<SessionConfig, serde_json::Error> {
    serde_json::from_str::<SessionConfig>(raw).map(SessionConfig::validated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "vigil-config-{}-{name}.json",
            std::process::id()
        ));
        std::fs::write(&path, contents).expect("write scratch config");
        path
    }

    #[test]
    fn test_parse_config_empty_object_is_default() {
        let config = parse_config("{}").expect("valid");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_parse_config_validates() {
        let config = parse_config(r#"{ "refresh_interval_secs": 0 }"#).expect("valid");
        assert_eq!(config.refresh_interval_secs, 1);
    }

    #[test]
    fn test_parse_config_rejects_wrong_types() {
        assert!(parse_config(r#"{ "inactivity_timeout_secs": "soon" }"#).is_err());
    }

    #[test]
    fn test_load_config_reads_file() {
        let path = scratch_file("reads", r#"{ "inactivity_timeout_secs": 600 }"#);

        let config = load_config(&path).expect("loaded");

        assert_eq!(config.inactivity_timeout_secs, 600);
        assert_eq!(config.refresh_interval_secs, 240);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_config_missing_file_is_io_error() {
        let err = load_config("/nonexistent/vigil/session.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_config_bad_json_is_parse_error() {
        let path = scratch_file("bad", "{ not json");

        let err = load_config(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("invalid config"));
        let _ = std::fs::remove_file(path);
    }
}
