//! StigCheck Common - Shared utilities: logging and configuration

pub mod config;
pub mod logging;

pub use config::{Config, ConfigBuilder, EngineSettings, LoggingConfig};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogFormat};
