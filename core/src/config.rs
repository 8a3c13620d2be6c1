//! Configuration for blocktick
//!
//! Layered, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, `BLOCKTICK_CONFIG_PATH`, or `./blocktick.toml`)
//! 3. Environment variables prefixed `BLOCKTICK_`, `__` between sections
//!    (e.g. `BLOCKTICK_SCHEDULER__COMPATIBILITY_MODE=true`)
//!
//! A `.env` file in the working directory is loaded before the environment
//! is read.

use anyhow::{bail, Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::driver::{COMPATIBILITY_STEP_TIME, DEFAULT_STEP_TIME};

const ENV_PREFIX: &str = "BLOCKTICK";
const CONFIG_PATH_VAR: &str = "BLOCKTICK_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "blocktick.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick at 30 per second instead of 60
    pub compatibility_mode: bool,

    /// Explicit tick interval; overrides `compatibility_mode`
    pub tick_interval_ms: Option<u64>,

    /// Stop after this many ticks
    pub max_ticks: Option<u64>,

    /// Stop once no threads remain
    pub exit_when_idle: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            compatibility_mode: false,
            tick_interval_ms: None,
            max_ticks: None,
            exit_when_idle: true,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        match self.tick_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.compatibility_mode => COMPATIBILITY_STEP_TIME,
            None => DEFAULT_STEP_TIME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with the default search path
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_ms == Some(0) {
            bail!("scheduler.tick_interval_ms must be greater than 0");
        }
        if self.scheduler.max_ticks == Some(0) {
            bail!("scheduler.max_ticks must be greater than 0");
        }
        if self.logging.filter.trim().is_empty() {
            bail!("logging.filter must not be empty");
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

/// Builder for loading [`Config`] with explicit overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    compatibility_mode: Option<bool>,
    max_ticks: Option<u64>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Config file to read instead of the default search
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn compatibility_mode(mut self, enabled: Option<bool>) -> Self {
        self.compatibility_mode = enabled;
        self
    }

    pub fn max_ticks(mut self, ticks: Option<u64>) -> Self {
        self.max_ticks = ticks;
        self
    }

    /// Ignore `.env` and `BLOCKTICK_*` variables (used by tests)
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            // A missing .env is fine
            let _ = dotenvy::dotenv();
        }

        let defaults = toml::to_string(&Config::default())
            .context("Failed to serialize default configuration")?;
        let mut builder =
            config::Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        let (path, required) = self.resolve_path();
        builder = builder.add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(required),
        );

        if !self.skip_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(enabled) = self.compatibility_mode {
            config.scheduler.compatibility_mode = enabled;
        }
        if let Some(ticks) = self.max_ticks {
            config.scheduler.max_ticks = Some(ticks);
        }

        config.validate()?;
        Ok(config)
    }

    /// Explicit paths must exist; the default file is optional
    fn resolve_path(&self) -> (PathBuf, bool) {
        if let Some(path) = &self.config_path {
            return (path.clone(), true);
        }
        if !self.skip_env {
            if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
                return (PathBuf::from(path), true);
            }
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::builder()
            .config_path(Some(PathBuf::from("does-not-matter.toml")))
            .skip_env(true);
        // Explicit path is required
        assert!(config.build().is_err());

        let config = Config::default();
        assert_eq!(config.scheduler.tick_interval(), DEFAULT_STEP_TIME);
        assert!(config.scheduler.exit_when_idle);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("blocktick-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[scheduler]\ncompatibility_mode = true\nmax_ticks = 90").unwrap();

        let config = Config::builder()
            .config_path(Some(path.clone()))
            .skip_env(true)
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert!(config.scheduler.compatibility_mode);
        assert_eq!(config.scheduler.max_ticks, Some(90));
        assert_eq!(config.scheduler.tick_interval(), COMPATIBILITY_STEP_TIME);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_builder_overrides_win() {
        let config = Config::builder()
            .skip_env(true)
            .compatibility_mode(Some(true))
            .max_ticks(Some(3))
            .build()
            .unwrap();
        assert!(config.scheduler.compatibility_mode);
        assert_eq!(config.scheduler.max_ticks, Some(3));
    }

    #[test]
    fn test_explicit_interval_wins() {
        let scheduler = SchedulerConfig {
            compatibility_mode: true,
            tick_interval_ms: Some(5),
            ..SchedulerConfig::default()
        };
        assert_eq!(scheduler.tick_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.scheduler.tick_interval_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trips_sections() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[scheduler]"));
        assert!(rendered.contains("[logging]"));
    }
}
