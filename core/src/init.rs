//! Initialization system for blocktick
//!
//! Loads configuration and installs the tracing subscriber. Hosts embedding
//! the engine call this once before building a scheduler; the CLI calls it
//! on startup.
//!
//! # Example
//!
//! ```rust,no_run
//! use blocktick_core::init::InitBuilder;
//!
//! let config = InitBuilder::new()
//!     .config_path("blocktick.toml")
//!     .compatibility_mode(true)
//!     .init()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Global initialization state
static INIT_STATE: OnceLock<InitState> = OnceLock::new();

#[derive(Debug)]
struct InitState {
    config: Config,
}

/// Options for initializing blocktick
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<String>,

    /// Force compatibility mode on or off
    pub compatibility_mode: Option<bool>,

    /// Tick limit (overrides config file and env vars)
    pub max_ticks: Option<u64>,

    /// Skip installing the tracing subscriber (the host has its own)
    pub skip_logging: bool,
}

/// Builder for constructing InitOptions
#[derive(Debug, Default)]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn compatibility_mode(mut self, enabled: bool) -> Self {
        self.options.compatibility_mode = Some(enabled);
        self
    }

    pub fn max_ticks(mut self, ticks: u64) -> Self {
        self.options.max_ticks = Some(ticks);
        self
    }

    pub fn skip_logging(mut self, skip: bool) -> Self {
        self.options.skip_logging = skip;
        self
    }

    pub fn init(self) -> Result<Config> {
        initialize(self.options)
    }
}

/// Initialize blocktick with the given options
///
/// It:
/// - Loads and validates configuration
/// - Installs a `tracing` subscriber filtered by `RUST_LOG` or `logging.filter`
/// - Stores the configuration globally
///
/// Calling this more than once is safe; later calls return the stored
/// configuration.
pub fn initialize(options: InitOptions) -> Result<Config> {
    if let Some(state) = INIT_STATE.get() {
        return Ok(state.config.clone());
    }

    let config = Config::builder()
        .config_path(options.config_path.map(PathBuf::from))
        .compatibility_mode(options.compatibility_mode)
        .max_ticks(options.max_ticks)
        .build()
        .context("Failed to load configuration")?;

    if !options.skip_logging {
        init_tracing(&config.logging.filter)?;
    }

    let state = INIT_STATE.get_or_init(|| InitState { config });
    Ok(state.config.clone())
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("Invalid log filter '{}'", default_filter))?,
    };

    // Another subscriber may already be installed by the host
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
    Ok(())
}

pub fn is_initialized() -> bool {
    INIT_STATE.get().is_some()
}

/// The stored configuration, if initialized
pub fn config() -> Option<&'static Config> {
    INIT_STATE.get().map(|state| &state.config)
}
