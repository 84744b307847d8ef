//! Structured test logging for CI debugging.
//!
//! Tests call [`init_global_test_logging`] (safe to call repeatedly) to get
//! compact tracing output on the test writer plus an aggregated JSONL file
//! under `target/test-logs/`.
//!
//! ```ignore
//! use holo_common::testing::TestGuard;
//!
//! #[test]
//! fn pulls_a_file() {
//!     let _guard = TestGuard::new("pulls_a_file");
//!     // TEST PASS / TEST FAIL logged when the guard drops
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
    Teardown,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Execute => write!(f, "execute"),
            Self::Verify => write!(f, "verify"),
            Self::Teardown => write!(f, "teardown"),
        }
    }
}

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Initialize global logging for all tests.
///
/// - `HOLO_TEST_LOG_FILE`: override the JSONL path (default `target/test-logs/all_tests.jsonl`)
/// - `HOLO_TEST_LOG_LEVEL`: filter level (default `info`)
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let file_layer = create_global_log_file().map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_span_events(FmtSpan::CLOSE)
                .with_file(true)
                .with_line_number(true)
        });

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let level = std::env::var("HOLO_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter =
            tracing_subscriber::EnvFilter::try_new(format!("holo={level},holo_common={level}"))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn create_global_log_file() -> Option<std::fs::File> {
    if let Ok(custom) = std::env::var("HOLO_TEST_LOG_FILE") {
        if let Some(parent) = PathBuf::from(&custom).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        return std::fs::File::create(&custom).ok();
    }
    let dir = test_log_dir();
    let _ = std::fs::create_dir_all(&dir);
    std::fs::File::create(dir.join("all_tests.jsonl")).ok()
}

fn test_log_dir() -> PathBuf {
    if let Ok(target) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(target).join("test-logs");
    }
    let mut cwd = std::env::current_dir().unwrap_or_default();
    loop {
        let target = cwd.join("target");
        if target.is_dir() {
            return target.join("test-logs");
        }
        if !cwd.pop() {
            return PathBuf::from("target/test-logs");
        }
    }
}

/// One JSONL record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub test_name: String,
    pub phase: TestPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TestLogEntry {
    pub fn new(test_name: &str, phase: TestPhase, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: test_name.to_string(),
            phase,
            message: message.into(),
            data: None,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Per-test JSONL logger writing `target/test-logs/<test>.jsonl`.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    entries: Mutex<Vec<TestLogEntry>>,
    log_file: Option<Mutex<std::fs::File>>,
}

impl TestLogger {
    pub fn for_test(test_name: &str) -> Self {
        let dir = test_log_dir();
        let safe_name = test_name.replace("::", "_").replace(['/', '\\'], "_");
        let log_file = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::File::create(dir.join(format!("{safe_name}.jsonl"))))
            .ok();

        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            entries: Mutex::new(Vec::new()),
            log_file: log_file.map(Mutex::new),
        };
        logger.log(TestPhase::Setup, "TEST START");
        logger
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        let entry =
            TestLogEntry::new(&self.test_name, phase, message).with_duration(self.elapsed_ms());
        self.write_entry(&entry);
    }

    pub fn log_with_data(
        &self,
        phase: TestPhase,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        let entry = TestLogEntry::new(&self.test_name, phase, message)
            .with_duration(self.elapsed_ms())
            .with_data(data);
        self.write_entry(&entry);
    }

    fn write_entry(&self, entry: &TestLogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
        if let Some(file) = &self.log_file
            && let Ok(mut f) = file.lock()
            && let Ok(json) = serde_json::to_string(entry)
        {
            let _ = writeln!(f, "{json}");
        }
        tracing::info!(
            test = %self.test_name,
            phase = %entry.phase,
            duration_ms = entry.duration_ms,
            "{}",
            entry.message
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Entries logged so far.
    pub fn entries(&self) -> Vec<TestLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn pass(self) {
        self.log(TestPhase::Verify, "TEST PASS");
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.log_with_data(
            TestPhase::Verify,
            "TEST FAIL",
            serde_json::json!({ "reason": reason.into() }),
        );
    }
}

/// Logs TEST PASS on drop, or TEST FAIL when dropped while panicking.
///
/// Active when `HOLO_TEST_LOGGING=1`, or in CI unless `HOLO_TEST_LOGGING=0`.
pub struct TestGuard {
    inner: Option<TestLogger>,
}

impl TestGuard {
    pub fn new(test_name: &str) -> Self {
        let enabled = match std::env::var("HOLO_TEST_LOGGING").as_deref() {
            Ok("1" | "true") => true,
            Ok("0" | "false") => false,
            _ => std::env::var("CI").is_ok(),
        };
        Self {
            inner: enabled.then(|| {
                init_global_test_logging();
                TestLogger::for_test(test_name)
            }),
        }
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        if let Some(logger) = &self.inner {
            logger.log(phase, message);
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        if let Some(logger) = self.inner.take() {
            if std::thread::panicking() {
                logger.fail("test panicked");
            } else {
                logger.pass();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_phase_and_data() {
        let entry = TestLogEntry::new("pull_flow", TestPhase::Execute, "pulling")
            .with_duration(7)
            .with_data(serde_json::json!({"path": "src/a.c"}));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["phase"], "execute");
        assert_eq!(json["duration_ms"], 7);
        assert_eq!(json["data"]["path"], "src/a.c");
    }

    #[test]
    fn logger_records_start_and_messages() {
        let logger = TestLogger::for_test("logger_records_start_and_messages");
        logger.log(TestPhase::Execute, "running");
        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "TEST START");
        logger.pass();
    }

    #[test]
    fn phase_display() {
        assert_eq!(TestPhase::Setup.to_string(), "setup");
        assert_eq!(TestPhase::Teardown.to_string(), "teardown");
    }
}
