use crate::config::Config;
use crate::error::ConfigError;

/// Smallest reply budget accepted, in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 100;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::invalid("server.host", "must not be empty"));
    }

    for (field, value) in [
        ("timeouts.default_ms", config.timeouts.default_ms),
        ("timeouts.stack_ms", config.timeouts.stack_ms),
    ] {
        if value < MIN_TIMEOUT_MS {
            errors.push(ConfigError::invalid(
                field,
                format!("must be at least {MIN_TIMEOUT_MS}, got {value}"),
            ));
        }
    }

    for (i, mapping) in config.paths.mappings.iter().enumerate() {
        if mapping.local.as_os_str().is_empty() {
            errors.push(ConfigError::invalid(
                &format!("paths.mappings[{i}].local"),
                "must not be empty",
            ));
        }
        if mapping.remote.trim().is_empty() {
            errors.push(ConfigError::invalid(
                &format!("paths.mappings[{i}].remote"),
                "must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingEntry;
    use std::path::PathBuf;

    fn fields(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .map(|e| match e {
                ConfigError::Validation { field, .. } => field.clone(),
                other => panic!("unexpected error: {other}"),
            })
            .collect()
    }

    #[test]
    fn valid_default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn empty_host_rejected() {
        let mut cfg = Config::default();
        cfg.server.host = "  ".into();
        assert_eq!(fields(&validate(&cfg).unwrap_err()), ["server.host"]);
    }

    #[test]
    fn port_zero_allowed() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn short_timeouts_rejected() {
        let mut cfg = Config::default();
        cfg.timeouts.default_ms = 99;
        cfg.timeouts.stack_ms = 0;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(fields(&errs), ["timeouts.default_ms", "timeouts.stack_ms"]);
        assert!(format!("{}", errs[0]).contains("got 99"));
    }

    #[test]
    fn timeout_at_minimum_allowed() {
        let mut cfg = Config::default();
        cfg.timeouts.default_ms = MIN_TIMEOUT_MS;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn empty_mapping_sides_rejected() {
        let mut cfg = Config::default();
        cfg.paths.mappings = vec![
            MappingEntry {
                local: PathBuf::from("/ok"),
                remote: "ok".into(),
            },
            MappingEntry {
                local: PathBuf::new(),
                remote: String::new(),
            },
        ];
        assert_eq!(
            fields(&validate(&cfg).unwrap_err()),
            ["paths.mappings[1].local", "paths.mappings[1].remote"]
        );
    }
}
