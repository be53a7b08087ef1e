#![forbid(unsafe_code)]

//! Global log subscriber setup.
//!
//! [`init_logging`] installs a `tracing-subscriber` fmt subscriber filtered
//! by [`LogConfig`]. Filter precedence: an explicit
//! [`LogConfig::directive`], then `RUST_LOG`, then [`LogConfig::level`].

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Why [`init_logging`] refused to install a subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Logging setup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Maximum level when neither a directive nor `RUST_LOG` is set.
    /// Default: `INFO`
    pub level: Level,
    /// Full `EnvFilter` directive (`"fdom_render=debug,warn"`); overrides
    /// `RUST_LOG` and `level`.
    pub directive: Option<String>,
    /// Write log lines at all. When `false`, [`init_logging`] installs
    /// nothing.
    pub enable_console: bool,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            directive: None,
            enable_console: true,
            json: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    #[must_use]
    pub fn enable_console(mut self, enable: bool) -> Self {
        self.enable_console = enable;
        self
    }

    #[must_use]
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Resolve the filter this config installs.
    pub fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Some(directive) = &self.directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(env) if !env.trim().is_empty() => Ok(EnvFilter::try_new(env)?),
            _ => Ok(EnvFilter::try_new(self.level.as_str())?),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Returns `Ok(false)` when `enable_console` is off and nothing was
/// installed.
pub fn init_logging(config: &LogConfig) -> Result<bool, LoggingError> {
    if !config.enable_console {
        return Ok(false);
    }
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    tracing::debug!(json = config.json, "logging initialized");
    Ok(true)
}
