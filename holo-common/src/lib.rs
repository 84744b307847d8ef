//! Shared core for Hologram Projector.
//!
//! A project keeps two local trees next to each other:
//!
//! - `hologram/`: writable copies of remote files pulled for editing
//! - `outside_wall/`: read-only copies of everything those files depend on
//!
//! This crate owns the invariant between the two trees, resolves how a file
//! is compiled on the remote host, rewrites that context so local tooling
//! (clangd, IDEs, agents) can use it, and drives the remote build daemon.

pub mod build;
pub mod compile_db;
pub mod config;
pub mod errors;
pub mod logging;
pub mod monitor;
pub mod overlay;
pub mod resolver;
pub mod rewriter;
pub mod sync;
pub mod testing;
pub mod transport;
pub mod util;

pub use build::{BuildContext, TriggerOptions, TriggerReport, find_build_context, trigger_build};
pub use compile_db::{CompileCommandEntry, CompileDatabase};
pub use config::{ConfigStore, HoloEnv, ProjectConfig, TransportKind};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry, HoloError, Result};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use monitor::{LogMonitor, LogSignal, MonitorMode, MonitorOutcome, fetch_log, parse_log_line};
pub use overlay::{OverlayLayout, OverlayStore, PathZone};
pub use resolver::{
    CandidateKind, CompileCandidate, DependencyMount, ResolveReport, Selection,
    SelectionWarning,
};
pub use rewriter::{RewriteOutcome, RewriteWarning, Rewriter};
pub use sync::inspect::{FocusReport, context_for, write_focus};
pub use sync::{
    BuildReport, Projector, PullReport, PushReport, RepairReport, RetractReport, RetractTarget,
    init_project,
};
pub use transport::{HostTransport, LocalTransport, SshTransport, Transport, TransportError};

/// Name of the writable mirror directory.
pub const HOLOGRAM_DIR: &str = "hologram";

/// Name of the read-only dependency mirror directory.
pub const OUTSIDE_WALL_DIR: &str = "outside_wall";

/// Project config file; its presence marks the project root.
pub const CONFIG_FILE: &str = ".hologram_config";

/// Compilation database file name.
pub const COMPILE_DB_FILE: &str = "compile_commands.json";
