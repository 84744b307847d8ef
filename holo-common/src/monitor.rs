//! Build log monitor.
//!
//! The daemon appends to `<root>/.ddd/run/build.log` in two dialects:
//!
//! - structured: `[RADIO] {"event": "BUILD_SUCCESS", "message": ..., "timestamp": ...}`
//! - legacy: `[*] Pipeline Complete.`, `[-] BUILD Failed (Exit: 1)`, and the
//!   stats banner printed after a successful run
//!
//! [`LogMonitor`] cycles `Connecting -> Streaming -> Disconnected -> Connecting`
//! until a terminal signal (wait mode) or cancellation.

use crate::errors::{ErrorCode, Result};
use crate::transport::Transport;
use crate::util::{indent_lines, quote};
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

const RADIO_PREFIX: &str = "[RADIO]";

/// Lines read non-interactively before streaming in wait mode.
pub const SNAPSHOT_LINES: usize = 50;

/// Backlog replayed when following.
pub const FOLLOW_BACKLOG: usize = 1000;

/// Signal carried by one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSignal {
    BuildStart,
    BuildSuccess,
    BuildFailure,
    /// Any other structured event, by name.
    Other(String),
}

impl LogSignal {
    fn from_event(event: &str) -> Self {
        match event {
            "BUILD_START" => Self::BuildStart,
            "BUILD_SUCCESS" => Self::BuildSuccess,
            "BUILD_FAILURE" => Self::BuildFailure,
            other => Self::Other(other.to_string()),
        }
    }

    /// Outcome this signal ends a wait with, if it is terminal.
    pub fn terminal(&self) -> Option<MonitorOutcome> {
        match self {
            Self::BuildSuccess => Some(MonitorOutcome::Success),
            Self::BuildFailure => Some(MonitorOutcome::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RadioPayload {
    event: Option<String>,
    message: Option<serde_json::Value>,
    timestamp: Option<serde_json::Value>,
}

/// Result of parsing one line: the signal, what to echo, and whether the
/// line claimed to be structured but was not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub signal: Option<LogSignal>,
    pub echo: Option<String>,
    pub corrupt: bool,
}

/// Classify one raw log line. Signals are matched on the line with trailing
/// whitespace removed; plain lines echo as read, minus the newline.
pub fn parse_log_line(raw: &str) -> ParsedLine {
    let raw = raw.strip_suffix('\n').unwrap_or(raw);
    let line = raw.trim_end();
    if line.is_empty() {
        return ParsedLine {
            signal: None,
            echo: Some(raw.to_string()),
            corrupt: false,
        };
    }
    match line.strip_prefix(RADIO_PREFIX) {
        Some(payload) => parse_radio(line, payload.trim()),
        None => parse_legacy(raw, line),
    }
}

fn parse_radio(line: &str, payload: &str) -> ParsedLine {
    let payload: RadioPayload = match serde_json::from_str(payload) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "corrupt radio line");
            return ParsedLine {
                signal: None,
                echo: Some(format!("[RADIO CORRUPT] {line}")),
                corrupt: true,
            };
        }
    };
    let event = payload.event.unwrap_or_default();
    let message = payload.message.as_ref().map(value_text).unwrap_or_default();
    let ts = payload
        .timestamp
        .as_ref()
        .map(display_timestamp)
        .unwrap_or_default();
    let signal = LogSignal::from_event(&event);
    let body = indent_lines(&message, "   >> ");

    let echo = match &signal {
        LogSignal::BuildStart => format!("\n[MISSION START] {ts}\n{body}"),
        LogSignal::BuildSuccess => format!("[MISSION COMPLETE] {ts}\n{body}\n"),
        LogSignal::BuildFailure => format!("[MISSION FAILED] {ts}\n{body}\n"),
        LogSignal::Other(name) => format!("[RADIO] {name}: {message}"),
    };
    ParsedLine {
        signal: Some(signal),
        echo: Some(echo),
        corrupt: false,
    }
}

fn parse_legacy(raw: &str, line: &str) -> ParsedLine {
    let mut echo = format!("   [log] {raw}");
    let signal = if line.contains("[*] Pipeline Complete.") {
        echo.push_str("\n[MISSION COMPLETE] (legacy signal)");
        Some(LogSignal::BuildSuccess)
    } else if line.starts_with("[-] ") && line.contains("Failed") {
        echo.push_str("\n[MISSION FAILED] (legacy signal)");
        Some(LogSignal::BuildFailure)
    } else if line.contains("Est. Tokens:") || line.contains("--- 📊 Build Stats ---") {
        // The daemon prints stats only after a run that got that far.
        echo.push_str("\n[MISSION COMPLETE] (stats detected)");
        Some(LogSignal::BuildSuccess)
    } else {
        None
    };
    ParsedLine {
        signal,
        echo: Some(echo),
        corrupt: false,
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Radio timestamps are usually preformatted; epoch seconds are rendered as
/// local wall-clock time.
fn display_timestamp(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n
            .as_f64()
            .and_then(|secs| {
                let whole = secs.trunc() as i64;
                let nanos = ((secs.fract()) * 1e9) as u32;
                chrono::DateTime::from_timestamp(whole, nanos)
            })
            .map(|dt| {
                dt.with_timezone(&chrono::Local)
                    .format("%H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

/// Last terminal signal in a log excerpt.
///
/// Besides parsed signals, the daemon's own banner markers count, since the
/// excerpt may contain lines the daemon echoed back. A build start after a
/// terminal line clears it: that build has not finished yet.
pub fn last_terminal(lines: &str) -> Option<MonitorOutcome> {
    lines.lines().fold(None, |found, line| {
        let signal = parse_log_line(line).signal;
        if signal == Some(LogSignal::BuildStart) {
            return None;
        }
        if let Some(outcome) = signal.as_ref().and_then(LogSignal::terminal) {
            return Some(outcome);
        }
        if line.contains("[MISSION START]") {
            None
        } else if line.contains("[MISSION COMPLETE]") || line.contains("BUILD_SUCCESS") {
            Some(MonitorOutcome::Success)
        } else if line.contains("[MISSION FAILED]") || line.contains("BUILD_FAILURE") {
            Some(MonitorOutcome::Failure)
        } else {
            found
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Return on the first terminal signal.
    WaitForTerminal,
    /// Stream until cancelled.
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Success,
    Failure,
    Cancelled,
}

impl MonitorOutcome {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Cancelled => 130,
        }
    }
}

/// Streams the remote build log with reconnect-on-drop.
pub struct LogMonitor<T> {
    transport: T,
    log_path: String,
    mirror: Option<PathBuf>,
    backoff: Duration,
    snapshot_lines: usize,
}

impl<T: Transport> LogMonitor<T> {
    pub fn new(transport: T, log_path: impl Into<String>) -> Self {
        Self {
            transport,
            log_path: log_path.into(),
            mirror: None,
            backoff: Duration::from_secs(3),
            snapshot_lines: SNAPSHOT_LINES,
        }
    }

    /// Append every raw line to this local file.
    #[must_use]
    pub fn with_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn log_path(&self) -> &str {
        &self.log_path
    }

    /// Run until a terminal signal (wait mode) or Ctrl-C.
    pub async fn run(&self, mode: MonitorMode) -> MonitorOutcome {
        self.run_until(mode, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for interrupt");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until a terminal signal (wait mode) or until `shutdown` resolves.
    pub async fn run_until<F>(&self, mode: MonitorMode, shutdown: F) -> MonitorOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            // The stream starts at the end of the file, so anything written
            // while disconnected is only visible through the history.
            if mode == MonitorMode::WaitForTerminal {
                let snapshot = tokio::select! {
                    () = &mut shutdown => return self.cancelled(),
                    found = self.snapshot() => found,
                };
                if let Some(outcome) = snapshot {
                    println!("{} (found in log history)", outcome_banner(outcome));
                    return outcome;
                }
            }

            info!(log = %self.log_path, "tuning into build log");
            let streamed = tokio::select! {
                () = &mut shutdown => return self.cancelled(),
                streamed = self.stream(mode) => streamed,
            };
            if let Some(outcome) = streamed {
                return outcome;
            }

            warn!(
                backoff_ms = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX),
                "build log connection lost; reconnecting"
            );
            tokio::select! {
                () = &mut shutdown => return self.cancelled(),
                () = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    fn cancelled(&self) -> MonitorOutcome {
        info!(log = %self.log_path, "stopped listening");
        MonitorOutcome::Cancelled
    }

    async fn snapshot(&self) -> Option<MonitorOutcome> {
        let cmd = format!(
            "tail -n {} {} 2>/dev/null",
            self.snapshot_lines,
            quote(&self.log_path)
        );
        match self.transport.run(&cmd).await {
            Ok(text) => last_terminal(&text),
            Err(e) => {
                debug!(
                    code = %ErrorCode::BuildLogUnavailable.code_string(),
                    error = %e,
                    "no log history to check"
                );
                None
            }
        }
    }

    /// One connection. `Some` when wait mode saw a terminal signal; `None`
    /// when the stream ended or could not start.
    async fn stream(&self, mode: MonitorMode) -> Option<MonitorOutcome> {
        let backlog = match mode {
            MonitorMode::WaitForTerminal => 0,
            MonitorMode::Follow => FOLLOW_BACKLOG,
        };
        let cmd = format!("tail -n {backlog} -F {} 2>/dev/null", quote(&self.log_path));
        let mut child = match self.transport.follow(&cmd) {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "could not start log stream");
                return None;
            }
        };
        let stdout = child.stdout.take()?;
        let mut reader = BufReader::new(stdout);
        let mut mirror = self.open_mirror().await;
        let mut raw = String::new();

        loop {
            raw.clear();
            match reader.read_line(&mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(file) = mirror.as_mut()
                        && let Err(e) = file.write_all(raw.as_bytes()).await
                    {
                        debug!(error = %e, "mirror write failed");
                    }
                    let parsed = parse_log_line(&raw);
                    if parsed.corrupt {
                        debug!(
                            code = %ErrorCode::BuildLogCorrupt.code_string(),
                            "unparseable radio payload"
                        );
                    }
                    if let Some(echo) = &parsed.echo {
                        println!("{echo}");
                    }
                    if mode == MonitorMode::WaitForTerminal
                        && let Some(outcome) = parsed.signal.as_ref().and_then(LogSignal::terminal)
                    {
                        return Some(outcome);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "log stream read failed");
                    break;
                }
            }
        }
        if let Some(file) = mirror.as_mut() {
            let _ = file.flush().await;
        }
        None
    }

    async fn open_mirror(&self) -> Option<tokio::fs::File> {
        let path = self.mirror.as_deref()?;
        match open_append(path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open log mirror");
                None
            }
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

fn outcome_banner(outcome: MonitorOutcome) -> &'static str {
    match outcome {
        MonitorOutcome::Success => "[MISSION COMPLETE]",
        MonitorOutcome::Failure => "[MISSION FAILED]",
        MonitorOutcome::Cancelled => "[CANCELLED]",
    }
}

/// One-shot read of the remote log: the last `lines` lines, or all of it.
pub async fn fetch_log<T: Transport>(
    transport: &T,
    log_path: &str,
    lines: Option<usize>,
) -> Result<String> {
    let cmd = match lines {
        Some(n) => format!("tail -n {n} {} 2>/dev/null", quote(log_path)),
        None => format!("cat {} 2>/dev/null", quote(log_path)),
    };
    transport.run(&cmd).await.map_err(|e| {
        warn!(
            code = %ErrorCode::BuildLogUnavailable.code_string(),
            log = log_path,
            error = %e,
            "could not retrieve build log"
        );
        e.into()
    })
}
