//! Shared helper functions for holo commands.

use anyhow::{Context, Result};
use holo_common::{HoloEnv, HostTransport, Projector};
use std::path::PathBuf;
use tracing::warn;

pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to read the working directory")
}

/// Projector for the project containing the working directory.
pub fn open_projector() -> Result<Projector<HostTransport>> {
    let (env, errors) = HoloEnv::from_env();
    for error in errors {
        warn!(code = %error.code().code_string(), "{error}; using default");
    }
    Ok(Projector::discover(&current_dir()?, env)?)
}

/// Split a `--flags` value the way a shell would.
pub fn split_flags(flags: Option<&str>) -> Result<Vec<String>> {
    match flags {
        Some(raw) => shell_words::split(raw).with_context(|| format!("invalid --flags value: {raw}")),
        None => Ok(Vec::new()),
    }
}

/// Exit code for a monitor or build outcome.
pub fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
