//! Error catalog and definitions for Hologram Projector
//!
//! [`HoloError`] is the failure type of every core operation; each variant
//! maps to a catalogued [`ErrorCode`] carrying remediation steps.
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

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

use crate::CONFIG_FILE;
use crate::transport::TransportError;
use std::fmt;
use std::path::PathBuf;

/// Result alias used across the core.
pub type Result<T, E = HoloError> = std::result::Result<T, E>;

/// Why a path was refused by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The path lives in the read-only OutsideWall.
    WallBreach,
    /// The path is not under the Hologram.
    NotInHologram,
    /// The remote path is not under `remote_root`.
    OutsideRemoteRoot,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WallBreach => write!(f, "path is in the read-only outside wall"),
            Self::NotInHologram => write!(f, "path is not in the hologram directory"),
            Self::OutsideRemoteRoot => write!(f, "path is outside the remote root"),
        }
    }
}

/// Errors surfaced by core operations.
#[derive(Debug, thiserror::Error)]
pub enum HoloError {
    #[error("project root not found (no {CONFIG_FILE} at or above {})", start.display())]
    ConfigMissing { start: PathBuf },

    #[error("invalid project config {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("cannot write project config {}: {reason}", path.display())]
    ConfigWrite { path: PathBuf, reason: String },

    #[error("no compilation context found for {file}")]
    NotFound { file: String },

    #[error("file not found on remote host: {path}")]
    RemoteMissing { path: String },

    #[error("overlay violation for {}: {kind}", path.display())]
    OverlayViolation { path: PathBuf, kind: ViolationKind },

    #[error("build request {request} not written: {source}")]
    TriggerFailed {
        request: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl HoloError {
    /// Wrap an I/O error with a short description of the failed operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for an overlay violation.
    pub fn violation(path: impl Into<PathBuf>, kind: ViolationKind) -> Self {
        Self::OverlayViolation {
            path: path.into(),
            kind,
        }
    }

    /// Catalogued code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigMissing { .. } => ErrorCode::ConfigMissing,
            Self::ConfigInvalid { .. } => ErrorCode::ConfigInvalid,
            Self::ConfigWrite { .. } => ErrorCode::ConfigWriteFailed,
            Self::NotFound { .. } => ErrorCode::ResolveNotFound,
            Self::RemoteMissing { .. } => ErrorCode::TransportRemoteMissing,
            Self::OverlayViolation { kind, .. } => match kind {
                ViolationKind::WallBreach => ErrorCode::OverlayWallBreach,
                ViolationKind::NotInHologram => ErrorCode::OverlayNotInHologram,
                ViolationKind::OutsideRemoteRoot => ErrorCode::OverlayOutsideRemoteRoot,
            },
            Self::TriggerFailed { .. } => ErrorCode::BuildTriggerFailed,
            Self::Transport(err) => err.code(),
            Self::Io { .. } => ErrorCode::InternalIo,
            Self::Json { .. } => ErrorCode::InternalSerde,
        }
    }
}
