pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{
    Config, LogConfig, LogLevel, MappingEntry, OutputModeSetting, PathsConfig, ServerConfig,
    SessionConfig, TimeoutConfig,
};
pub use error::ConfigError;
pub use load::{default_config_dir, load_config, load_config_file, load_from_str};
