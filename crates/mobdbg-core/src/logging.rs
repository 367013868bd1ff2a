//! Log file placement, rotation and filter construction.
//!
//! The subscriber itself is installed by the `mobdbg` binary; this module
//! only owns the file-system side so it can be tested without a global
//! subscriber.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size at which the active log file is rotated (5 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Number of rotated files kept next to the active one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 3;

/// Crates whose events are raised to the session level when the user asks
/// for protocol tracing.
const ENGINE_TARGETS: [&str; 3] = ["mobdbg_protocol", "mobdbg_stack", "mobdbg_core"];

/// Platform-specific default log file.
///
/// * Linux: `$HOME/.local/share/mobdbg/mobdbg.log`
/// * macOS: `$HOME/Library/Logs/mobdbg/mobdbg.log`
/// * Windows: `%APPDATA%/mobdbg/logs/mobdbg.log`
/// * otherwise: the system temp dir
pub fn default_log_file_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Logs/mobdbg/mobdbg.log");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".local/share/mobdbg/mobdbg.log");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("mobdbg\\logs\\mobdbg.log");
        }
    }
    std::env::temp_dir().join("mobdbg").join("mobdbg.log")
}

/// Create the parent directory of `log_path` when missing.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Shift `mobdbg.log` → `mobdbg.log.1` → … once it reaches `max_size` bytes.
///
/// The file at index `max_files` is dropped. Missing or small files are
/// left alone.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..max_files).rev() {
        let from = rotated_path(log_path, index);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, index + 1))?;
        }
    }
    if max_files == 0 {
        return fs::remove_file(log_path);
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

/// Normalize a level name (case-insensitive); unknown names become `info`.
pub fn log_level_to_filter(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// Build an `EnvFilter`-compatible directive string.
///
/// Everything logs at `warn`; the engine crates log at `level`. With
/// `protocol_trace` the engine is forced to `trace` so every wire line shows.
pub fn filter_directives(level: &str, protocol_trace: bool) -> String {
    let engine_level = if protocol_trace {
        "trace"
    } else {
        log_level_to_filter(level)
    };
    let mut directives = vec![format!("warn,mobdbg={engine_level}")];
    directives.extend(
        ENGINE_TARGETS
            .iter()
            .map(|target| format!("{target}={engine_level}")),
    );
    directives.join(",")
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_names_the_tool() {
        let path = default_log_file_path();
        assert!(path.to_string_lossy().contains("mobdbg"), "got {path:?}");
        assert!(path.extension().is_some_and(|e| e == "log"));
    }

    #[test]
    fn rotated_path_appends_index() {
        let base = Path::new("/var/log/mobdbg.log");
        assert_eq!(rotated_path(base, 2), PathBuf::from("/var/log/mobdbg.log.2"));
    }

    #[test]
    fn rotate_ignores_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("mobdbg.log");
        assert!(rotate_log_files(&log, 10, 3).is_ok());
    }

    #[test]
    fn rotate_keeps_small_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("mobdbg.log");
        fs::write(&log, "short").unwrap();
        rotate_log_files(&log, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES).unwrap();
        assert!(log.exists());
    }

    #[test]
    fn rotate_cascades_and_drops_oldest() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("mobdbg.log");
        fs::write(dir.path().join("mobdbg.log.1"), "gen1").unwrap();
        fs::write(dir.path().join("mobdbg.log.2"), "gen2").unwrap();
        fs::write(&log, "y".repeat(64)).unwrap();

        rotate_log_files(&log, 32, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("mobdbg.log.1")).unwrap(),
            "y".repeat(64)
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("mobdbg.log.2")).unwrap(),
            "gen1"
        );
        assert!(!dir.path().join("mobdbg.log.3").exists());
    }

    #[test]
    fn ensure_log_dir_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("a").join("b").join("mobdbg.log");
        ensure_log_dir(&log).unwrap();
        ensure_log_dir(&log).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }

    #[test]
    fn level_names_are_normalized() {
        assert_eq!(log_level_to_filter("DEBUG"), "debug");
        assert_eq!(log_level_to_filter("Warning"), "warn");
        assert_eq!(log_level_to_filter("chatty"), "info");
    }

    #[test]
    fn directives_scope_level_to_engine_crates() {
        let directives = filter_directives("debug", false);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("mobdbg_protocol=debug"));
        assert!(directives.contains("mobdbg_stack=debug"));
    }

    #[test]
    fn protocol_trace_overrides_level() {
        let directives = filter_directives("error", true);
        assert!(directives.contains("mobdbg_protocol=trace"));
        assert!(!directives.contains("=error"));
    }
}
