//! Logging setup for feedsync binaries
//!
//! Library code only emits structured `tracing` events; the binary installs
//! the subscriber once through [`init_logging`]:
//!
//! ```no_run
//! use feedsync_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> feedsync_common::Result<()> {
//!     let config = LogConfig::builder().log_file_prefix("feedsync").build().merge_env()?;
//!     let _guard = init_logging(&config)?;
//!
//!     info!(feed = "users", estimated_remaining = 0, "export batch complete");
//!     Ok(())
//! }
//! ```
//!
//! Recognised environment variables:
//!
//! | Variable | Values |
//! |---|---|
//! | `LOG_LEVEL` | `off`, `error`, `warn`, `info`, `debug`, `trace` |
//! | `LOG_OUTPUT` | `console`, `file`, `both` |
//! | `LOG_FORMAT` | `text`, `json` |
//! | `LOG_DIR` | directory for daily files |
//! | `LOG_FILE_PREFIX` | file name prefix |
//! | `LOG_FILTER` | extra directives, e.g. `sqlx=info,hyper=warn` |
//! | `LOG_INCLUDE_LOCATION` | `true` / `false` |

use std::path::PathBuf;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::{CommonError, Result};

/// Directives applied on top of the level unless overridden.
///
/// sqlx reports every statement at info, which drowns batch upserts.
pub const DEFAULT_DIRECTIVES: &[&str] = &["sqlx=warn", "hyper=warn", "reqwest=warn"];

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != LogOutput::File
    }

    fn file(self) -> bool {
        self != LogOutput::Console
    }
}

impl FromStr for LogOutput {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            other => Err(CommonError::logging(format!("unknown LOG_OUTPUT '{}'", other))),
        }
    }
}

/// Line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(CommonError::logging(format!("unknown LOG_FORMAT '{}'", other))),
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Used only when output includes a file
    pub log_dir: PathBuf,
    /// `feedsync` gives `feedsync.2024-01-18`
    pub log_file_prefix: String,
    pub directives: Vec<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "feedsync".to_string(),
            directives: DEFAULT_DIRECTIVES.iter().map(|d| d.to_string()).collect(),
            include_location: false,
        }
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay the process environment; variables win over configured values
    pub fn merge_env(self) -> Result<Self> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values read through `lookup`
    pub fn merge_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.level = level
                .trim()
                .parse()
                .map_err(|_| CommonError::logging(format!("unknown LOG_LEVEL '{}'", level)))?;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = lookup("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            self.directives
                .extend(filter.split(',').map(str::trim).filter(|d| !d.is_empty()).map(String::from));
        }
        if let Some(value) = lookup("LOG_INCLUDE_LOCATION") {
            self.include_location = value.trim().eq_ignore_ascii_case("true");
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse_lossy("");

        // Later directives for the same target override earlier ones
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e| CommonError::logging(format!("bad filter directive '{}': {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    /// Add one directive such as `feedsync=trace`
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.config.directives.push(directive.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes buffered lines, so binaries hold it until exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.output.console() {
        layers.push(fmt_layer(config, std::io::stderr, true));
    }

    if config.output.file() {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config, writer, false));
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter()?)
        .try_init()
        .map_err(|e| CommonError::logging(e.to_string()))?;

    Ok(LoggingGuard { _file: file_guard })
}

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
