//! Logger builder implementation

use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, DisplayConfig, Format};
use crate::error::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Shared fmt-layer options, boxed so every format yields the same type.
macro_rules! boxed_fmt_layer {
    ($layer:expr, $display:expr) => {{
        let layer = $layer
            .with_writer(std::io::stderr)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source);
        if $display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }};
}

/// Logger builder
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by initialization
///
/// Reports whether this call installed the global subscriber. Dropping it is
/// a no-op; the subscriber lives for the rest of the process.
#[derive(Debug)]
#[must_use = "hold the guard for the lifetime of the application"]
pub struct LoggerGuard {
    installed: bool,
}

impl LoggerGuard {
    /// Guard for a call that found a subscriber already in place
    pub const fn noop() -> Self {
        Self { installed: false }
    }

    /// Whether this initialization installed the global subscriber
    pub const fn installed(&self) -> bool {
        self.installed
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Override the filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Override the output format
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    /// Build and initialize the logger
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidFilter`] if the directive cannot be parsed
    /// and [`LogError::Init`] if installing the subscriber fails for another
    /// reason. An already installed subscriber is not an error; the returned
    /// guard reports `installed() == false`.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::invalid_filter(&self.config.level, e.to_string()))?;

        if tracing::dispatcher::has_been_set() {
            return Ok(LoggerGuard::noop());
        }

        let fmt_layer = fmt_layer(self.config.format, &self.config.display);

        Registry::default()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        tracing::debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "logger initialized"
        );

        Ok(LoggerGuard { installed: true })
    }
}

fn fmt_layer(format: Format, display: &DisplayConfig) -> BoxedLayer {
    match format {
        Format::Pretty => boxed_fmt_layer!(tracing_subscriber::fmt::layer().pretty(), display),
        Format::Compact => boxed_fmt_layer!(tracing_subscriber::fmt::layer().compact(), display),
        Format::Json => boxed_fmt_layer!(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .flatten_event(display.flatten),
            display
        ),
    }
}
