//! Tracing setup shared by the CLI and tests.
//!
//! Diagnostics go through `tracing` to stderr (or stdout when requested);
//! an optional daily-rolling file receives the same events without ANSI.

use crate::config::EnvParser;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging configuration assembled from `HOLO_LOG_*` and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub stderr: bool,
}

impl LogConfig {
    /// Read `HOLO_LOG_LEVEL`, `HOLO_LOG_FORMAT` and `HOLO_LOG_FILE`.
    pub fn from_env(default_level: &str) -> Self {
        Self::from_parser(&mut EnvParser::new(), default_level)
    }

    pub fn from_parser(parser: &mut EnvParser, default_level: &str) -> Self {
        let level = parser.get_log_level("LOG_LEVEL", default_level);
        let format = parser
            .get_optional_string("LOG_FORMAT")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let file = parser.get_optional_path("LOG_FILE");
        Self {
            level,
            format,
            file,
            stderr: false,
        }
    }

    /// Send console output to stderr so stdout stays clean for command output.
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    fn console_layer(&self) -> BoxedLayer {
        match (self.format, self.stderr) {
            (LogFormat::Pretty, true) => fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
            (LogFormat::Pretty, false) => fmt::layer().with_target(false).boxed(),
            (LogFormat::Json, true) => fmt::layer().json().with_writer(std::io::stderr).boxed(),
            (LogFormat::Json, false) => fmt::layer().json().boxed(),
        }
    }
}

/// Keeps background log writers alive; drop it last.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

fn file_layer(path: &Path) -> Result<(BoxedLayer, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let name = path
        .file_name()
        .map_or_else(|| "holo.log".into(), |n| n.to_os_string());

    let appender = tracing_appender::rolling::daily(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
    Ok((layer, guard))
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let mut layers = vec![config.console_layer()];
    let mut file_guard = None;
    if let Some(path) = &config.file {
        let (layer, guard) = file_layer(path)?;
        layers.push(layer);
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter())
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuards { _file: file_guard })
}
