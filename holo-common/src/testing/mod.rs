//! Test support shared by unit and integration tests.

pub mod log;
pub mod mock;

pub use log::{TestGuard, TestLogEntry, TestLogger, TestPhase, init_global_test_logging};
pub use mock::{MockResponse, MockTransport};
