//! Tracing subscriber setup.
//!
//! [`TracingConfig`] installs a global `tracing` subscriber. Everything weft
//! logs (pool object lifecycle, executor sessions, node commands) goes
//! through it.
//!
//! # Example
//!
//! ```no_run
//! use weft_core_plugins::{TracingConfig, TracingFormat};
//! use tracing::Level;
//!
//! // Development: pretty output with span enter/exit events
//! TracingConfig::default()
//!     .with_level(Level::DEBUG)
//!     .with_span_events(true)
//!     .init();
//!
//! // Production: JSON output, engine internals quieter than the application
//! TracingConfig::default()
//!     .with_format(TracingFormat::Json)
//!     .with_env_filter("info,weft_graph=warn,weft_pool=warn")
//!     .init();
//! ```

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Errors raised while installing a subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// The filter directive string could not be parsed.
    #[error("invalid filter directive '{directive}': {reason}")]
    InvalidFilter {
        /// The rejected directive string.
        directive: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// How the installed subscriber renders events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line output with span context, for local runs.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, carrying node and request fields.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration of the global `tracing` subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level applied to every target when `env_filter` is unset.
    pub level: Level,
    /// Event rendering.
    pub format: TracingFormat,
    /// Per-crate directives, e.g. `"weft_graph=debug,weft_pool=warn"`.
    pub env_filter: Option<String>,
    /// Report entering and leaving spans such as `main_logic`.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// `INFO`, pretty output, no directives.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Level used when no directives are given.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Event rendering.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Directives in `EnvFilter` syntax. They replace the plain level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Whether span enter and exit are reported as events.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Builds the filter this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns [`TracingError::InvalidFilter`] if the directives do not parse.
    pub fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.env_filter {
            Some(directive) => {
                EnvFilter::try_new(directive).map_err(|error| TracingError::InvalidFilter {
                    directive: directive.clone(),
                    reason: error.to_string(),
                })
            }
            None => Ok(EnvFilter::new(self.level.as_str())),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }

    /// Installs the subscriber globally.
    ///
    /// # Errors
    ///
    /// Returns [`TracingError::InvalidFilter`] for bad directives, or
    /// [`TracingError::AlreadyInitialized`] if a subscriber is already
    /// installed.
    pub fn try_init(&self) -> Result<(), TracingError> {
        let filter = self.filter()?;
        let span_events = self.span_events();
        let output = match self.format {
            TracingFormat::Pretty => fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .boxed(),
            TracingFormat::Compact => fmt::layer()
                .compact()
                .with_span_events(span_events)
                .boxed(),
            TracingFormat::Json => fmt::layer().json().with_span_events(span_events).boxed(),
        };
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(output)
            .try_init();
        installed.map_err(|_| TracingError::AlreadyInitialized)?;

        tracing::info!(level = %self.level, format = ?self.format, "tracing initialized");
        Ok(())
    }

    /// Installs the subscriber globally, falling back to the configured level
    /// if the filter directives are invalid. Does nothing if a subscriber is
    /// already installed.
    pub fn init(&self) {
        let result = match self.try_init() {
            Err(TracingError::InvalidFilter { .. }) => Self {
                env_filter: None,
                ..self.clone()
            }
            .try_init(),
            other => other,
        };
        result.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_format_default_is_pretty() {
        assert_eq!(TracingFormat::default(), TracingFormat::Pretty);
    }

    #[test]
    fn builders_set_fields() {
        let config = TracingConfig::new()
            .with_level(Level::DEBUG)
            .with_format(TracingFormat::Json)
            .with_env_filter("weft_graph=trace")
            .with_span_events(true);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, TracingFormat::Json);
        assert_eq!(config.env_filter.as_deref(), Some("weft_graph=trace"));
        assert!(config.span_events);
    }

    #[test]
    fn invalid_filter_is_reported() {
        let config = TracingConfig::new().with_env_filter("weft_graph=notalevel");
        assert!(matches!(
            config.filter(),
            Err(TracingError::InvalidFilter { directive, .. }) if directive == "weft_graph=notalevel"
        ));
    }

    #[test]
    fn second_install_is_rejected() {
        let config = TracingConfig::new().with_format(TracingFormat::Compact);
        config.init();
        assert!(matches!(
            config.try_init(),
            Err(TracingError::AlreadyInitialized)
        ));
    }
}
