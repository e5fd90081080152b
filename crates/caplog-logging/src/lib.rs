//! Structured logging setup for caplog hosts
//!
//! Installs a `tracing` subscriber with an `EnvFilter`, console output in
//! JSON lines (default) or pretty form, and optional rotated file output.
//!
//! # Quick Start
//!
//! ```ignore
//! use caplog_logging::{CaplogSubscriberBuilder, LogConfig};
//!
//! // JSON lines to stdout at info
//! let _guard = CaplogSubscriberBuilder::new().try_init()?;
//!
//! // Development mode with pretty output
//! let _guard = CaplogSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .try_init()?;
//! ```
//!
//! Keep the returned guard alive while logging to a file; dropping it
//! flushes the background writer.

pub mod config;
pub mod error;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use error::{LoggingError, LoggingResult};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// The subscriber produced by [`CaplogSubscriberBuilder::build`]
pub type CaplogSubscriber = Layered<EnvFilter, Layered<Vec<BoxedLayer>, Registry>>;

/// Builder for the caplog logging subscriber
pub struct CaplogSubscriberBuilder {
    config: LogConfig,
}

impl CaplogSubscriberBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Set the level for one target
    pub fn with_target_level(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config.targets.insert(target.into(), level.into());
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Switch the console between pretty and JSON lines
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration this builder will apply
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the filter; RUST_LOG takes precedence over the configured levels
    pub fn build_filter(&self) -> LoggingResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = self.config.filter_directives();
        EnvFilter::try_new(&directives).map_err(|e| LoggingError::Filter {
            directives,
            reason: e.to_string(),
        })
    }

    /// Build the subscriber without installing it
    pub fn build(self) -> LoggingResult<(CaplogSubscriber, Option<WorkerGuard>)> {
        let filter = self.build_filter()?;
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            guard = Some(file_guard);
            layers.push(json_layer(&self.config.jsonl, writer));
        }

        let subscriber = Registry::default().with(layers).with(filter);
        Ok((subscriber, guard))
    }

    /// Install the subscriber globally
    ///
    /// Fails if a global subscriber has already been set.
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let (subscriber, guard) = self.build()?;
        subscriber
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            return tracing_subscriber::fmt::layer()
                .with_ansi(self.config.console.ansi)
                .with_target(true)
                .boxed();
        }
        json_layer(&self.config.jsonl, std::io::stdout)
    }
}

impl Default for CaplogSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON lines layer writing to `writer`
fn json_layer<W>(jsonl: &JsonlConfig, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(jsonl.include_spans)
        .flatten_event(jsonl.flatten_events)
        .with_thread_ids(jsonl.include_thread_info)
        .with_file(jsonl.include_location)
        .with_line_number(jsonl.include_location)
        .with_writer(writer)
        .boxed()
}

/// Non-blocking writer for the configured file; `Never` truncates a single file
fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Pretty development logging; ignored if a subscriber is already set
pub fn init_development() {
    let _ = CaplogSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .try_init();
}

/// Minimal logging for tests; safe to call from every test
pub fn init_testing() {
    let _ = CaplogSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
