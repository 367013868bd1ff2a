use std::path::{Path, PathBuf};

use mobdbg_config::{Config, OutputModeSetting};
use mobdbg_core::{PathMapping, PathResolver};
use mobdbg_protocol::{AdapterOptions, OutputMode, Timeouts};

/// Project root from the config, relative to `cwd` when not absolute.
pub(crate) fn project_root(config: &Config, cwd: &Path) -> PathBuf {
    match &config.paths.project_root {
        Some(root) if root.is_absolute() => root.clone(),
        Some(root) => cwd.join(root),
        None => cwd.to_path_buf(),
    }
}

pub(crate) fn path_resolver(config: &Config, cwd: &Path) -> PathResolver {
    let mut resolver = PathResolver::new(project_root(config, cwd));
    resolver.set_mappings(
        config
            .paths
            .mappings
            .iter()
            .map(|m| PathMapping::new(cwd.join(&m.local), &m.remote))
            .collect(),
    );
    resolver
}

pub(crate) fn adapter_options(config: &Config) -> AdapterOptions {
    AdapterOptions {
        host: config.server.host.clone(),
        port: config.server.port,
        timeouts: Timeouts {
            default: config.timeouts.default_timeout(),
            stack: config.timeouts.stack_timeout(),
        },
        basedir: config.session.basedir.clone(),
        output_mode: match config.session.output_mode {
            OutputModeSetting::Copy => OutputMode::Copy,
            OutputModeSetting::Redirect => OutputMode::Redirect,
            OutputModeSetting::Default => OutputMode::Default,
        },
        run_on_connect: config.session.run_on_connect,
    }
}
