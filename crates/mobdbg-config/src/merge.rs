use std::path::Path;

use crate::config::Config;
use crate::error::ConfigError;

/// Lay a TOML document over `base`.
///
/// Tables merge key by key, everything else (including arrays such as
/// `paths.mappings`) is replaced by the overlay. `origin` only labels parse
/// errors.
pub fn merge_configs(base: &Config, overlay_toml: &str, origin: Option<&Path>) -> Result<Config, ConfigError> {
    let origin = origin.map(Path::to_path_buf);
    let mut merged = toml::Value::try_from(base).map_err(|e| ConfigError::parse(None, e))?;
    let overlay: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::parse(origin.clone(), e))?;

    overlay_value(&mut merged, overlay);

    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::parse(origin, e))
}

fn overlay_value(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => overlay_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputModeSetting;

    #[test]
    fn empty_overlay_returns_base() {
        let base = Config::default();
        assert_eq!(merge_configs(&base, "", None).unwrap(), base);
    }

    #[test]
    fn overlay_keeps_sibling_keys() {
        let base = Config::default();
        let merged = merge_configs(&base, "[server]\nport = 9000\n", None).unwrap();
        assert_eq!(merged.server.port, 9000);
        assert_eq!(merged.server.host, "127.0.0.1");
        assert_eq!(merged.timeouts, base.timeouts);
    }

    #[test]
    fn second_overlay_wins() {
        let global = merge_configs(&Config::default(), "[session]\noutput_mode = \"redirect\"\nbasedir = \"/g/\"\n", None).unwrap();
        let project = merge_configs(&global, "[session]\nbasedir = \"/p/\"\n", None).unwrap();
        assert_eq!(project.session.basedir.as_deref(), Some("/p/"));
        assert_eq!(project.session.output_mode, OutputModeSetting::Redirect);
    }

    #[test]
    fn mappings_array_is_replaced() {
        let first = "[[paths.mappings]]\nlocal = \"/a\"\nremote = \"a\"\n";
        let second = "[[paths.mappings]]\nlocal = \"/b\"\nremote = \"b\"\n";
        let base = merge_configs(&Config::default(), first, None).unwrap();
        let merged = merge_configs(&base, second, None).unwrap();
        assert_eq!(merged.paths.mappings.len(), 1);
        assert_eq!(merged.paths.mappings[0].remote, "b");
    }

    #[test]
    fn invalid_overlay_names_origin() {
        let err = merge_configs(&Config::default(), "{{invalid}}", Some(Path::new("x.toml"))).unwrap_err();
        assert!(format!("{err}").starts_with("x.toml: "));
    }

    #[test]
    fn wrong_type_is_a_parse_error() {
        let err = merge_configs(&Config::default(), "[server]\nport = \"high\"\n", None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
