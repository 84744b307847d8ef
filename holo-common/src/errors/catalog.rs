//! Error Catalog for Hologram Projector
//!
//! Every failure the projector reports maps to a unique code with a message
//! template and remediation steps, so the CLI can tell the user what to run
//! next instead of only what went wrong.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                              |
//! |------------|-------------|------------------------------------------|
//! | E001-E099  | Config      | Project config and environment errors    |
//! | E100-E199  | Transport   | ssh / rsync / local shell failures       |
//! | E200-E299  | Overlay     | Hologram / OutsideWall invariant errors  |
//! | E300-E399  | Resolve     | Compile-context resolution and rewriting |
//! | E400-E499  | Build       | Daemon trigger and build log errors      |
//! | E500-E599  | Internal    | Internal/unexpected errors               |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all projector failure scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// No `.hologram_config` found above the working directory
    ConfigMissing,
    /// Project config exists but cannot be used
    ConfigInvalid,
    /// Project config could not be written
    ConfigWriteFailed,
    /// Environment variable has invalid value
    ConfigEnvError,

    // =========================================================================
    // Transport Errors (E100-E199)
    // =========================================================================
    /// Remote command or rsync exited non-zero
    TransportFailure,
    /// ssh / rsync / sh could not be started
    TransportSpawnFailed,
    /// Local-backend file copy failed
    TransportCopyFailed,
    /// The requested file does not exist on the repository host
    TransportRemoteMissing,

    // =========================================================================
    // Overlay Errors (E200-E299)
    // =========================================================================
    /// Attempt to push or edit a read-only OutsideWall path
    OverlayWallBreach,
    /// Path is not inside the Hologram
    OverlayNotInHologram,
    /// Remote path lies outside the configured remote root
    OverlayOutsideRemoteRoot,

    // =========================================================================
    // Resolve Errors (E300-E399)
    // =========================================================================
    /// No compilation database entry for the file
    ResolveNotFound,
    /// Several candidates scored equally (warning)
    ResolveAmbiguous,
    /// A dependency path is missing on disk (silently skipped)
    ResolveExternalPathUnresolvable,
    /// The compilation database is unreadable
    ResolveDatabaseCorrupt,
    /// No system includes configured or mapped locally (warning)
    ResolveSystemIncludesMissing,

    // =========================================================================
    // Build Errors (E400-E499)
    // =========================================================================
    /// Sentinel touch failed
    BuildTriggerFailed,
    /// Daemon restart failed (best-effort, logged)
    BuildDaemonRestartFailed,
    /// Remote build log could not be read
    BuildLogUnavailable,
    /// Structured log line could not be decoded
    BuildLogCorrupt,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Local filesystem operation failed
    InternalIo,
    /// JSON encode/decode failed
    InternalSerde,
}

impl ErrorCode {
    /// Returns the numeric portion of the error code.
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            // Config (1-99)
            Self::ConfigMissing => 1,
            Self::ConfigInvalid => 2,
            Self::ConfigWriteFailed => 3,
            Self::ConfigEnvError => 4,

            // Transport (100-199)
            Self::TransportFailure => 100,
            Self::TransportSpawnFailed => 101,
            Self::TransportCopyFailed => 102,
            Self::TransportRemoteMissing => 103,

            // Overlay (200-299)
            Self::OverlayWallBreach => 200,
            Self::OverlayNotInHologram => 201,
            Self::OverlayOutsideRemoteRoot => 202,

            // Resolve (300-399)
            Self::ResolveNotFound => 300,
            Self::ResolveAmbiguous => 301,
            Self::ResolveExternalPathUnresolvable => 302,
            Self::ResolveDatabaseCorrupt => 303,
            Self::ResolveSystemIncludesMissing => 304,

            // Build (400-499)
            Self::BuildTriggerFailed => 400,
            Self::BuildDaemonRestartFailed => 401,
            Self::BuildLogUnavailable => 402,
            Self::BuildLogCorrupt => 403,

            // Internal (500-599)
            Self::InternalIo => 500,
            Self::InternalSerde => 501,
        }
    }

    /// Returns the formatted error code string (e.g., "HOLO-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("HOLO-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Transport,
            200..=299 => ErrorCategory::Overlay,
            300..=399 => ErrorCategory::Resolve,
            400..=499 => ErrorCategory::Build,
            _ => ErrorCategory::Internal,
        }
    }

    /// Whether the condition degrades gracefully instead of failing the command.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::ResolveAmbiguous
                | Self::ResolveExternalPathUnresolvable
                | Self::ResolveSystemIncludesMissing
                | Self::BuildDaemonRestartFailed
                | Self::BuildLogCorrupt
        )
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message template.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "Project root not found (no .hologram_config in any parent directory)",
            Self::ConfigInvalid => "Project configuration is invalid",
            Self::ConfigWriteFailed => "Failed to write project configuration",
            Self::ConfigEnvError => "Environment variable has invalid value",

            Self::TransportFailure => "Remote command failed",
            Self::TransportSpawnFailed => "Failed to start transport process",
            Self::TransportCopyFailed => "Local transport copy failed",
            Self::TransportRemoteMissing => "File not found on remote host",

            Self::OverlayWallBreach => "Path is inside the read-only Outside Wall",
            Self::OverlayNotInHologram => "Path is not inside the hologram directory",
            Self::OverlayOutsideRemoteRoot => "Remote path is outside the configured remote root",

            Self::ResolveNotFound => "No compilation context found for file",
            Self::ResolveAmbiguous => "Multiple equally plausible compilation contexts",
            Self::ResolveExternalPathUnresolvable => "Dependency path does not exist on disk",
            Self::ResolveDatabaseCorrupt => "Compilation database could not be parsed",
            Self::ResolveSystemIncludesMissing => "System headers are not synced",

            Self::BuildTriggerFailed => "Failed to trigger remote build",
            Self::BuildDaemonRestartFailed => "Failed to restart remote build daemon",
            Self::BuildLogUnavailable => "Could not retrieve remote build log",
            Self::BuildLogCorrupt => "Corrupt structured log line",

            Self::InternalIo => "Filesystem operation failed",
            Self::InternalSerde => "Failed to encode or decode JSON",
        }
    }

    /// Returns remediation steps for this error.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigMissing => &[
                "Run 'holo init <user@host:/remote/root>' in the project directory",
                "Or cd into a directory below an initialized project",
            ],
            Self::ConfigInvalid => &[
                "Check .hologram_config is valid JSON with host_target and remote_root",
                "remote_root must be an absolute path",
            ],
            Self::ConfigWriteFailed => &["Check write permissions on the project root"],
            Self::ConfigEnvError => &["Unset or correct the HOLO_* environment variable"],

            Self::TransportFailure => &[
                "Check SSH connectivity: ssh <host_target> true",
                "Verify the remote path exists",
            ],
            Self::TransportSpawnFailed => &["Ensure ssh and rsync are installed and on PATH"],
            Self::TransportCopyFailed => &["Check the source exists and the destination is writable"],
            Self::TransportRemoteMissing => &[
                "Paths are resolved against remote_root unless absolute",
                "Check the spelling with: ssh <host_target> ls <path>",
            ],

            Self::OverlayWallBreach => &[
                "Dependencies in outside_wall/ are read-only mirrors",
                "Run 'holo pull <path>' to project the file into the hologram, then edit it there",
            ],
            Self::OverlayNotInHologram => &["Pass a path inside hologram/"],
            Self::OverlayOutsideRemoteRoot => &[
                "Only files under remote_root can be projected",
                "Re-run 'holo init' with a wider --remote-root",
            ],

            Self::ResolveNotFound => &[
                "Run 'holo pull <file>' to sync its compilation context",
                "Ensure the remote compile_commands.json contains the file",
            ],
            Self::ResolveAmbiguous => &[
                "Use --flags to select a build configuration (e.g. --flags \"-DTEST\")",
            ],
            Self::ResolveExternalPathUnresolvable => &[
                "The include directory is missing on the remote host; it was skipped",
            ],
            Self::ResolveDatabaseCorrupt => &[
                "Delete hologram/compile_commands.json and pull the files again",
            ],
            Self::ResolveSystemIncludesMissing => &[
                "Run 'holo repair-headers' to sync system headers",
            ],

            Self::BuildTriggerFailed => &[
                "Check the remote root is writable",
                "Verify SSH connectivity to the host",
            ],
            Self::BuildDaemonRestartFailed => &[
                "Check the daemon launcher exists on the remote host",
                "Launch it manually with PROJECT_ROOT set",
            ],
            Self::BuildLogUnavailable => &[
                "Trigger a build first: 'holo build'",
                "Verify the daemon is running on the remote host",
            ],
            Self::BuildLogCorrupt => &["The daemon wrote a malformed [RADIO] line; it was ignored"],

            Self::InternalIo => &["Check disk space and permissions under the project root"],
            Self::InternalSerde => &["The file may be corrupt; inspect or delete it"],
        }
    }

    /// Returns all error codes.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigMissing,
            Self::ConfigInvalid,
            Self::ConfigWriteFailed,
            Self::ConfigEnvError,
            Self::TransportFailure,
            Self::TransportSpawnFailed,
            Self::TransportCopyFailed,
            Self::TransportRemoteMissing,
            Self::OverlayWallBreach,
            Self::OverlayNotInHologram,
            Self::OverlayOutsideRemoteRoot,
            Self::ResolveNotFound,
            Self::ResolveAmbiguous,
            Self::ResolveExternalPathUnresolvable,
            Self::ResolveDatabaseCorrupt,
            Self::ResolveSystemIncludesMissing,
            Self::BuildTriggerFailed,
            Self::BuildDaemonRestartFailed,
            Self::BuildLogUnavailable,
            Self::BuildLogCorrupt,
            Self::InternalIo,
            Self::InternalSerde,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Project config and environment errors (E001-E099)
    Config,
    /// ssh / rsync / local shell failures (E100-E199)
    Transport,
    /// Hologram / OutsideWall invariant errors (E200-E299)
    Overlay,
    /// Compile-context resolution errors (E300-E399)
    Resolve,
    /// Daemon trigger and log errors (E400-E499)
    Build,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Transport => "Transport",
            Self::Overlay => "Overlay",
            Self::Resolve => "Resolve",
            Self::Build => "Build",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "HOLO-E001")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("\nRemediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
