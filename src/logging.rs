//! Logging configuration
//!
//! Easy setup for structured logging with JSON (production) or pretty
//! (development) output.
//!
//! # Features
//!
//! - `logging` - Enable debug logging (default)
//! - `logging-json` - JSON structured output (recommended for production)
//! - `logging-pretty` - Colorful pretty output (recommended for development)
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::logging;
//!
//! // Initialize with default settings
//! logging::init();
//!
//! // Or use the builder for custom configuration
//! logging::builder()
//!     .with_level(tracing::Level::DEBUG)
//!     .with_target_filter("trellis")
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Logging format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Builder for logging configuration
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Filter to only show logs from a specific target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Use JSON output format
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty output format
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact output format
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Initialize the global subscriber.
    ///
    /// Respects `RUST_LOG` when set; falls back to the configured level
    /// (and target filter, when given) otherwise. Does nothing when no
    /// subscriber feature is enabled.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{fmt, EnvFilter};

        let default_directive = match self.target {
            Some(target) => format!("{target}={}", self.level),
            None => self.level.to_string(),
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let builder = fmt().with_env_filter(filter);

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
            LogFormat::Compact => builder.compact().init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => builder.init(),
        }
    }

    /// No-op when no subscriber feature is enabled.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Create a logging builder
#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with default settings
#[cfg(feature = "logging")]
pub fn init() {
    builder().init();
}

/// Initialize with JSON output
#[cfg(feature = "logging")]
pub fn init_json() {
    builder().json().init();
}

/// Initialize with pretty output
#[cfg(feature = "logging")]
pub fn init_pretty() {
    builder().pretty().init();
}
