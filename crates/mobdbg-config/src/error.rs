use std::path::PathBuf;
use thiserror::Error;

/// Errors from finding, reading, merging or checking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// The commented default config could not be written.
    #[error("failed to create default config at {path}: {source}")]
    CreateDefault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing or deserialization failed.
    #[error("{}TOML parse error: {message}", origin(.path))]
    Parse {
        /// File the text came from, when there was one.
        path: Option<PathBuf>,
        message: String,
    },

    /// A config value is out of range.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The dotted field path (e.g. `timeouts.stack_ms`).
        field: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn parse(path: Option<PathBuf>, err: impl std::fmt::Display) -> Self {
        ConfigError::Parse {
            path,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!("{}: ", path.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_contains_path() {
        let err = ConfigError::NotFound(PathBuf::from("/tmp/mobdbg/config.toml"));
        let msg = format!("{err}");
        assert!(msg.contains("/tmp/mobdbg/config.toml"));
        assert!(msg.contains("config file not found"));
    }

    #[test]
    fn create_default_names_path_and_cause() {
        let err = ConfigError::CreateDefault {
            path: PathBuf::from("/ro/config.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only file system"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("/ro/config.toml"));
        assert!(msg.contains("read-only file system"));
    }

    #[test]
    fn parse_display_with_and_without_origin() {
        let err = ConfigError::parse(Some(PathBuf::from("proj/.mobdbg/config.toml")), "expected u16");
        let msg = format!("{err}");
        assert!(msg.starts_with("proj/.mobdbg/config.toml: "));
        assert!(msg.contains("expected u16"));

        let err = ConfigError::parse(None, "expected u16");
        assert_eq!(format!("{err}"), "TOML parse error: expected u16");
    }

    #[test]
    fn validation_display_contains_field_and_message() {
        let err = ConfigError::invalid("timeouts.stack_ms", "must be at least 100");
        let msg = format!("{err}");
        assert!(msg.contains("timeouts.stack_ms"));
        assert!(msg.contains("must be at least 100"));
        assert!(msg.contains("validation error"));
    }

    #[test]
    fn io_error_converts() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml vanished");
        let err = ConfigError::from(inner);
        assert!(format!("{err}").contains("config.toml vanished"));
    }
}
