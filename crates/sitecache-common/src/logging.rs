//! Subscriber setup shared by the sitecache binaries and tests.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable selecting the output format (`pretty`, `compact`, `json`).
pub const LOG_FORMAT_ENV: &str = "SITECACHE_LOG_FORMAT";

/// Errors raised while installing the global subscriber.
#[derive(Error, Debug)]
pub enum LogInitError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    Json,
}

impl LogFormat {
    /// Parse a format name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Subscriber settings for a sitecache process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `directives` nor `RUST_LOG` is set.
    pub level: Level,
    pub format: LogFormat,
    /// Print file and line of each event.
    pub source_location: bool,
    /// Log span enter and close.
    pub span_events: bool,
    /// `EnvFilter` directives, e.g. `"sitecache_sw=debug,reqwest=warn"`.
    pub directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            source_location: false,
            span_events: false,
            directives: None,
        }
    }
}

impl LogConfig {
    /// Debug level with source locations and span events.
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            source_location: true,
            span_events: true,
            ..Self::default()
        }
    }

    /// Default settings, with the format taken from `SITECACHE_LOG_FORMAT`.
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LogInitError> {
        match self.directives {
            Some(ref directives) => EnvFilter::try_new(directives)
                .map_err(|e| LogInitError::InvalidFilter(e.to_string())),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))),
        }
    }
}

/// Install the global subscriber. Fails instead of panicking when one is
/// already set.
pub fn init_logging(config: LogConfig) -> Result<(), LogInitError> {
    let filter = config.env_filter()?;
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location)
                    .with_span_events(spans),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_span_events(spans))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(spans),
            )
            .try_init(),
    };

    installed.map_err(|e| LogInitError::AlreadyInitialized(e.to_string()))
}
