//! Logging setup for dependency-resolver
//!
//! Every event the crate emits uses the `dependency_resolver` target:
//! registrations, index rebuilds, scope creation and disposal at `DEBUG`,
//! resolution and constructor scoring at `TRACE`.
//!
//! # Features
//!
//! - `logging` - Emit events through `tracing` (default)
//! - `logging-json` - Install a JSON subscriber (production)
//! - `logging-pretty` - Install a human readable subscriber (development)
//!
//! Without a subscriber feature the initializers do nothing, and the host
//! application is expected to install its own subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use dependency_resolver::logging;
//!
//! logging::builder()
//!     .trace()
//!     .resolver_only()
//!     .pretty()
//!     .init();
//! ```
//!
//! `RUST_LOG` takes precedence over the builder's level and target.

use tracing::Level;

/// Target of every event emitted by this crate
pub const TARGET: &str = "dependency_resolver";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Multi-line human readable output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
}

/// Builder for the subscriber installed by [`LoggingBuilder::init`].
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    /// Record the file and line of each event
    source_location: bool,
    thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: if cfg!(feature = "logging-json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            target: None,
            source_location: false,
            thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Include constructor scoring and per-resolution events
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only show events from `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show this crate's events
    pub fn resolver_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Include file and line number
    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    /// Include thread ids, useful when following concurrent resolutions
    pub fn with_thread_ids(mut self) -> Self {
        self.thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Directive used when `RUST_LOG` is not set
    fn directive(&self) -> String {
        match self.target {
            Some(target) => format!("{}={}", target, self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber globally.
    ///
    /// Fails if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()));

        let base = fmt::layer()
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_thread_ids(self.thread_ids)
            .with_target(true);

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => base.json().boxed(),
            // JSON output needs the logging-json feature
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => base.boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        };

        tracing_subscriber::registry().with(layer).with(filter).try_init()
    }

    /// Install the subscriber, leaving an existing global subscriber in place
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// No-op without a subscriber feature
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install the default subscriber: JSON with `logging-json`, pretty otherwise
pub fn init() {
    builder().init();
}

/// Install a subscriber showing only this crate's events
pub fn init_resolver_only() {
    builder().resolver_only().debug().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_without_target_is_bare_level() {
        assert_eq!(builder().directive(), "DEBUG");
        assert_eq!(builder().info().directive(), "INFO");
    }

    #[test]
    fn test_resolver_only_directive() {
        let b = builder()
            .trace()
            .compact()
            .with_source_location()
            .with_thread_ids()
            .resolver_only();

        assert_eq!(b.format, LogFormat::Compact);
        assert!(b.source_location && b.thread_ids);
        assert_eq!(b.directive(), "dependency_resolver=TRACE");
    }
}
