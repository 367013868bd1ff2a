use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# mobdbg configuration
# Uncomment and edit settings below to override defaults.
# A project can override any of these in .mobdbg/config.toml.

# [server]
# host = "127.0.0.1"
# port = 8172

# [timeouts]
# default_ms = 7000
# stack_ms = 10000

# [paths]
# project_root = "/path/to/game"
#
# [[paths.mappings]]
# local = "/path/to/game/libs"
# remote = "libs"

# [session]
# run_on_connect = true
# output_mode = "copy"
# basedir = "/path/to/game/"

# [log]
# level = "info"
# protocol_trace = false
"#;

/// Directory holding the global `config.toml`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mobdbg")
}

/// Load and merge configuration.
///
/// 1. Reads `config_dir/config.toml`, creating it with commented-out
///    defaults when missing.
/// 2. Looks for `.mobdbg/config.toml` from `project_dir` upward.
/// 3. Merges `Config::default() <- global <- project`.
/// 4. Validates the result.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !global_path.exists() {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::CreateDefault {
            path: global_path.clone(),
            source,
        })?;
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT).map_err(|source| {
            ConfigError::CreateDefault {
                path: global_path.clone(),
                source,
            }
        })?;
        tracing::info!(path = %global_path.display(), "created default config");
    }

    let mut config = Config::default();

    let global = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global) {
        config = merge_configs(&config, &global, Some(&global_path))?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!(path = %project_path.display(), "merging project config");
        let project = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project, Some(&project_path))?;
    }

    check(config)
}

/// Load a single explicit file over the defaults, skipping the global and
/// project lookup.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    check(merge_configs(&Config::default(), &text, Some(path))?)
}

/// Parse a TOML string directly into a validated [`Config`].
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::parse(None, e))?;
    check(config)
}

fn check(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => {
            for extra in errors.iter().skip(1) {
                tracing::warn!(error = %extra, "config");
            }
            Err(errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ConfigError::invalid("config", "validation failed")))
        }
    }
}

/// Walk from `start` upward looking for `.mobdbg/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".mobdbg").join("config.toml"))
        .find(|candidate| candidate.is_file())
}

/// Whether `content` has at least one line that is neither blank nor a
/// comment.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
