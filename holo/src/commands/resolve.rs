//! `holo resolve`: the host side of `pull` and `mount`.
//!
//! Runs where the compilation databases live and prints a `ResolveReport`
//! as JSON on stdout. Diagnostics stay on stderr.

use super::helpers::{current_dir, split_flags};
use anyhow::{Context, Result};
use holo_common::resolver::{find_databases, resolve_mounts, resolve_target};
use holo_common::util::absolutize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn resolve(
    full: Option<PathBuf>,
    flags: Option<&str>,
    extra_dbs: &[PathBuf],
    root: Option<PathBuf>,
    mounts: bool,
) -> Result<u8> {
    let cwd = current_dir()?;
    let root = match root {
        Some(root) => absolutize(&root).with_context(|| format!("cannot resolve {}", root.display()))?,
        None => cwd.clone(),
    };
    let flags = split_flags(flags)?;

    let report = match full {
        Some(target) if !mounts => {
            let target = absolutize(&target)
                .with_context(|| format!("cannot resolve {}", target.display()))?;
            let start = target.parent().unwrap_or(&root).to_path_buf();
            let databases = databases(&start, &root, extra_dbs);
            debug!(target = %target.display(), databases = databases.len(), "resolving");
            resolve_target(&target, &databases, &flags)
        }
        _ => resolve_mounts(&databases(&root, &root, extra_dbs), &root),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

/// Databases near `start`; extra paths are taken relative to the repo root.
fn databases(start: &Path, root: &Path, extra: &[PathBuf]) -> Vec<PathBuf> {
    let extra: Vec<PathBuf> = extra
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
        .collect();
    find_databases(start, &extra)
}
