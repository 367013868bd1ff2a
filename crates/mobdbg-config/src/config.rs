use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What the debuggee does with its stdout after the handshake.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputModeSetting {
    /// Print locally and forward a copy.
    #[default]
    Copy,
    /// Forward only.
    Redirect,
    /// Leave stdout alone.
    Default,
}

/// Where the debuggee dials in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port; `0` picks a free one.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8172
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Reply budgets, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget for most commands.
    #[serde(default = "default_timeout_ms")]
    pub default_ms: u64,
    /// Budget for `STACK` and `EXEC`.
    #[serde(default = "default_stack_timeout_ms")]
    pub stack_ms: u64,
}

fn default_timeout_ms() -> u64 {
    7_000
}

fn default_stack_timeout_ms() -> u64 {
    10_000
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    pub fn stack_timeout(&self) -> Duration {
        Duration::from_millis(self.stack_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: default_timeout_ms(),
            stack_ms: default_stack_timeout_ms(),
        }
    }
}

/// One local directory and the remote prefix it is known by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub local: PathBuf,
    pub remote: String,
}

/// Local ↔ remote path settings.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Project root; defaults to the working directory.
    pub project_root: Option<PathBuf>,
    /// Explicit prefix mappings, tried in order before the project root.
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
}

/// Per-connection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Send `RUN` after the handshake.
    #[serde(default = "default_true")]
    pub run_on_connect: bool,
    #[serde(default)]
    pub output_mode: OutputModeSetting,
    /// Sent as `BASEDIR` on connect.
    pub basedir: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            run_on_connect: true,
            output_mode: OutputModeSetting::Copy,
            basedir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
    /// Log every wire line regardless of `level`.
    #[serde(default)]
    pub protocol_trace: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            protocol_trace: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}
