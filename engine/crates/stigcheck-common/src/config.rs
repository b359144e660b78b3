//! Configuration management for StigCheck

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use stigcheck_core::{Error, Result};

/// Environment variable prefix for settings
pub const ENV_PREFIX: &str = "STIGCHECK_";

/// Environment variable prefix for attribute overrides
pub const ENV_ATTR_PREFIX: &str = "STIGCHECK_ATTR_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Evaluation settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// Attribute overrides, name -> raw value
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Merge with environment variables (STIGCHECK_ prefix)
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(std::env::vars())
    }

    /// Merge `STIGCHECK_*` variables from an arbitrary source.
    ///
    /// `STIGCHECK_ATTR_<NAME>` sets the attribute `<name>` (lowercased).
    pub fn merge_vars<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, val) in vars {
            let key = key.as_ref();
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let val = val.into();

            if let Some(attr) = key.strip_prefix(ENV_ATTR_PREFIX) {
                if !attr.is_empty() {
                    self.attributes.insert(attr.to_ascii_lowercase(), val);
                }
                continue;
            }

            match name {
                "MAX_CONCURRENT_CONTROLS" => {
                    self.engine.max_concurrent_controls = parse_setting(key, &val)?
                }
                "PROBE_TIMEOUT" => self.engine.probe_timeout_seconds = parse_setting(key, &val)?,
                "RUN_DEADLINE" => {
                    self.engine.run_deadline_seconds = Some(parse_setting(key, &val)?)
                }
                "CONTROLS_DIR" => self.engine.controls_dir = Some(val),
                "LOG_LEVEL" => self.logging.level = val,
                "LOG_FORMAT" => self.logging.format = val,
                _ => {}
            }
        }

        Ok(self)
    }

    /// Check settings that TOML types alone cannot enforce
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_concurrent_controls == 0 {
            return Err(Error::Configuration(
                "max_concurrent_controls must be at least 1".into(),
            ));
        }
        if self.engine.probe_timeout_seconds == 0 {
            return Err(Error::Configuration(
                "probe_timeout_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, val: &str) -> Result<T> {
    val.trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} has invalid value {:?}", key, val)))
}

/// Control evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum controls evaluated at once
    #[serde(default = "default_max_controls")]
    pub max_concurrent_controls: usize,

    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// Whole-run deadline in seconds (none = unbounded)
    pub run_deadline_seconds: Option<u64>,

    /// Directory of control definitions
    pub controls_dir: Option<String>,
}

fn default_max_controls() -> usize {
    8
}

fn default_probe_timeout() -> u64 {
    30
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_controls: default_max_controls(),
            probe_timeout_seconds: default_probe_timeout(),
            run_deadline_seconds: None,
            controls_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("warn")
}

fn default_log_format() -> String {
    String::from("compact")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Builder for constructing Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn max_concurrent_controls(mut self, n: usize) -> Self {
        self.config.engine.max_concurrent_controls = n;
        self
    }

    pub fn probe_timeout_seconds(mut self, secs: u64) -> Self {
        self.config.engine.probe_timeout_seconds = secs;
        self
    }

    pub fn run_deadline_seconds(mut self, secs: u64) -> Self {
        self.config.engine.run_deadline_seconds = Some(secs);
        self
    }

    pub fn controls_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.engine.controls_dir = Some(dir.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.attributes.insert(name.into(), value.into());
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [engine]
            max_concurrent_controls = 2
            run_deadline_seconds = 600
            controls_dir = "/etc/stigcheck/controls"

            [attributes]
            unsuccessful_attempts = "5"
            fail_interval = "15m"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.engine.max_concurrent_controls, 2);
        assert_eq!(config.engine.probe_timeout_seconds, 30);
        assert_eq!(config.engine.run_deadline_seconds, Some(600));
        assert_eq!(config.attributes["unsuccessful_attempts"], "5");
        assert_eq!(config.attributes["fail_interval"], "15m");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.engine.max_concurrent_controls, 8);
        assert!(config.attributes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nprobe_timeout_seconds = 5").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.engine.probe_timeout_seconds, 5);

        let err = Config::from_file("/nonexistent/stigcheck.toml").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_merge_vars() {
        let config = Config::builder()
            .attribute("unsuccessful_attempts", "3")
            .build()
            .merge_vars([
                ("STIGCHECK_ATTR_UNSUCCESSFUL_ATTEMPTS", "5"),
                ("STIGCHECK_PROBE_TIMEOUT", "10"),
                ("STIGCHECK_LOG_LEVEL", "trace"),
                ("HOME", "/root"),
            ])
            .unwrap();

        assert_eq!(config.attributes["unsuccessful_attempts"], "5");
        assert_eq!(config.engine.probe_timeout_seconds, 10);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_merge_vars_rejects_bad_number() {
        let err = Config::default()
            .merge_vars([("STIGCHECK_MAX_CONCURRENT_CONTROLS", "many")])
            .unwrap_err();
        assert!(err.to_string().contains("STIGCHECK_MAX_CONCURRENT_CONTROLS"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let config = Config::builder().max_concurrent_controls(0).build();
        assert!(config.validate().is_err());
    }
}
