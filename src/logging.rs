//! Log subscriber setup for applications embedding the container
//!
//! The container emits `tracing` events under the `component_container`
//! target. This module installs a `tracing-subscriber` for them:
//!
//! - `logging` - emit events (default)
//! - `logging-json` - JSON lines, for log aggregation
//! - `logging-pretty` - multi-line coloured output, for development
//!
//! Without either subscriber feature `init` and `try_init` do nothing.
//!
//! ```rust,ignore
//! use component_container::logging;
//!
//! logging::builder()
//!     .trace()
//!     .container_only()
//!     .directive("my_app=info")
//!     .pretty()
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Target of every event emitted by this crate.
pub const TARGET: &str = "component_container";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    /// One line per event
    Compact,
}

impl Default for LogFormat {
    /// JSON when `logging-json` is enabled, else pretty when
    /// `logging-pretty` is, else compact.
    fn default() -> Self {
        if cfg!(feature = "logging-json") {
            LogFormat::Json
        } else if cfg!(feature = "logging-pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Compact
        }
    }
}

/// Subscriber configuration.
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    container_only: bool,
    directives: Vec<String>,
    from_env: bool,
    source_location: bool,
    thread_info: bool,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            container_only: false,
            directives: Vec::new(),
            from_env: false,
            source_location: false,
            thread_info: false,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Every resolution step and lifecycle call.
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Container creation, registration and singleton lifecycle.
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Only warnings, i.e. members that could not be auto-bound.
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Drop events from every target except the container's.
    pub fn container_only(mut self) -> Self {
        self.container_only = true;
        self
    }

    /// Extra `EnvFilter` directive, e.g. `"my_app=debug"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Start from `RUST_LOG` when it is set.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    /// Include file and line of each event.
    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    /// Include thread ids and names; handy when tracing concurrent singleton creation.
    pub fn with_thread_info(mut self) -> Self {
        self.thread_info = true;
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

    /// Filter directives in `EnvFilter` syntax, comma separated.
    pub fn filter_directives(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        let mut directives = Vec::with_capacity(self.directives.len() + 2);
        if self.container_only {
            directives.push("off".to_owned());
            directives.push(format!("{}={}", TARGET, level));
        } else {
            directives.push(level);
        }
        directives.extend(self.directives.iter().cloned());
        directives.join(",")
    }

    /// Install the subscriber globally.
    ///
    /// Fails if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), crate::BoxError> {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(env) if self.from_env && !env.is_empty() => EnvFilter::try_new(env)?,
            _ => EnvFilter::try_new(self.filter_directives())?,
        };

        let layer = fmt::layer()
            .with_target(true)
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_thread_ids(self.thread_info)
            .with_thread_names(self.thread_info);

        let registry = tracing_subscriber::registry().with(filter);
        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init()?,
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer).try_init()?,
            LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
            LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        }
        Ok(())
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn try_init(self) -> Result<(), crate::BoxError> {
        Ok(())
    }

    /// Like [`try_init`](Self::try_init), ignoring an already installed subscriber.
    pub fn init(self) {
        let _ = self.try_init();
    }
}

#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Debug-level output for the container only, in the default format.
#[cfg(feature = "logging")]
pub fn init() {
    builder().debug().container_only().init();
}

#[cfg(feature = "logging")]
pub fn init_json() {
    builder().debug().json().init();
}

#[cfg(feature = "logging")]
pub fn init_pretty() {
    builder().debug().pretty().init();
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::INFO);
        assert_eq!(builder.format, LogFormat::default());
        assert_eq!(builder.filter_directives(), "info");
    }

    #[test]
    fn test_container_only_directives() {
        let builder = LoggingBuilder::new()
            .trace()
            .container_only()
            .directive("my_app=warn")
            .with_thread_info();

        assert_eq!(
            builder.filter_directives(),
            "off,component_container=trace,my_app=warn"
        );
        assert!(builder.thread_info);
        assert!(!builder.source_location);
    }

    #[test]
    fn test_format_switches() {
        assert_eq!(builder().json().format, LogFormat::Json);
        assert_eq!(builder().json().compact().format, LogFormat::Compact);
        assert_eq!(builder().pretty().format, LogFormat::Pretty);
    }
}
