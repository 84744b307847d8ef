//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `HOLO_*` environment variables with
//! validation and error collection, plus [`HoloEnv`], the resolved set of
//! runtime knobs the projector reads.

use super::TransportKind;
use crate::errors::ErrorCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

impl EnvError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ConfigEnvError
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String>>;

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a parser over the process environment with the `HOLO_` prefix.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Create a parser over an arbitrary variable source.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            prefix: "HOLO_",
            lookup: Box::new(lookup),
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> (String, Option<String>) {
        let var_name = self.var_name(name);
        let value = (self.lookup)(&var_name);
        (var_name, value)
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Option<String> {
        self.raw(name).1.filter(|value| !value.is_empty())
    }

    /// Get an optional path (None if not set or empty).
    pub fn get_optional_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_optional_string(name).map(PathBuf::from)
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> bool {
        let (var_name, value) = self.raw(name);
        let Some(value) = value else {
            return default;
        };
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                default
            }
        }
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> u64 {
        let (var_name, value) = self.raw(name);
        let Some(value) = value else {
            return default;
        };
        match value.trim().parse::<u64>() {
            Ok(n) if n >= min && n <= max => n,
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                default
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                default
            }
        }
    }

    /// Get a duration given in milliseconds, with range validation.
    pub fn get_millis(&mut self, name: &str, default_ms: u64, max_ms: u64) -> Duration {
        Duration::from_millis(self.get_u64_range(name, default_ms, 0, max_ms))
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> String {
        let (var_name, value) = self.raw(name);
        let Some(value) = value else {
            return default.to_string();
        };
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => lower,
            _ => {
                self.errors.push(EnvError::InvalidLogLevel {
                    var: var_name,
                    value,
                });
                default.to_string()
            }
        }
    }

    /// Get a transport selector (`ssh` or `local`).
    pub fn get_transport(&mut self, name: &str) -> Option<TransportKind> {
        let (var_name, value) = self.raw(name);
        let value = value.filter(|v| !v.is_empty())?;
        match value.parse::<TransportKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "ssh or local".to_string(),
                    value,
                });
                None
            }
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime knobs read from `HOLO_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoloEnv {
    /// Overrides the project's configured transport.
    pub transport: Option<TransportKind>,
    /// Pause before a log monitor reconnects.
    pub reconnect_backoff: Duration,
    /// Pause after relaunching the remote daemon.
    pub daemon_startup: Duration,
    /// Hologram scan interval in live mode.
    pub poll_interval: Duration,
    /// Quiet period before a batch of live-mode changes is pushed.
    pub debounce: Duration,
}

impl Default for HoloEnv {
    fn default() -> Self {
        Self {
            transport: None,
            reconnect_backoff: Duration::from_secs(3),
            daemon_startup: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            debounce: Duration::from_millis(500),
        }
    }
}

impl HoloEnv {
    /// Read from the process environment.
    pub fn from_env() -> (Self, Vec<EnvError>) {
        Self::parse(EnvParser::new())
    }

    /// Read through an explicit parser.
    pub fn parse(mut parser: EnvParser) -> (Self, Vec<EnvError>) {
        let defaults = Self::default();
        let env = Self {
            transport: parser.get_transport("TRANSPORT"),
            reconnect_backoff: parser.get_millis(
                "RECONNECT_BACKOFF_MS",
                duration_ms(defaults.reconnect_backoff),
                600_000,
            ),
            daemon_startup: parser.get_millis(
                "DAEMON_STARTUP_MS",
                duration_ms(defaults.daemon_startup),
                60_000,
            ),
            poll_interval: parser.get_millis(
                "POLL_INTERVAL_MS",
                duration_ms(defaults.poll_interval),
                60_000,
            ),
            debounce: parser.get_millis("DEBOUNCE_MS", duration_ms(defaults.debounce), 60_000),
        };
        (env, parser.take_errors())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
