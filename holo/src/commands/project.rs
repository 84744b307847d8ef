//! Projection commands: init, pull, push, retract, mount, repair-headers.

use super::helpers::{current_dir, open_projector, split_flags};
use anyhow::Result;
use holo_common::overlay::Restore;
use holo_common::{RetractTarget, TransportKind, init_project};
use std::path::{Path, PathBuf};

pub fn init(
    host_target: &str,
    remote_root: Option<&str>,
    transport: TransportKind,
    remote_mission_root: Option<String>,
) -> Result<u8> {
    let (store, config) = init_project(
        &current_dir()?,
        host_target,
        remote_root,
        transport,
        remote_mission_root,
    )?;
    println!(
        "Hologram initialized for {} (root: {})",
        config.host_target, config.remote_root
    );
    println!("Config written to {}", store.path().display());
    Ok(0)
}

pub async fn pull(file: &str, flags: Option<&str>) -> Result<u8> {
    let flags = split_flags(flags)?;
    let projector = open_projector()?;
    let report = projector.pull(file, &flags).await?;

    println!("Synced {} to {}", report.remote_path, report.local_path.display());
    if !report.selection_warnings().is_empty() {
        for warning in report.selection_warnings() {
            println!("Warning: {warning}");
        }
        let diffs = report.candidate_diffs();
        if !diffs.is_empty() {
            println!("Defaulting to candidate #1. Options:");
            for (i, diff) in diffs.iter().enumerate() {
                println!("  {}. {diff}", i + 1);
            }
            println!("Use --flags to refine the selection.");
        }
    }
    println!("{} dependencies synced into outside_wall", report.synced_dependencies);

    match &report.rewrite {
        Some(outcome) => {
            println!("Updated compile_commands.json for {}", outcome.entry.file);
            for warning in &outcome.warnings {
                println!("Warning: {warning}");
            }
        }
        None if report.header => {
            println!("Header pulled; compile_commands.json left unchanged.");
            println!("Use 'holo focus <source_file>' to configure clangd for this header.");
        }
        None => println!("No compile context found; compile_commands.json left unchanged."),
    }
    Ok(0)
}

pub async fn push(file: &Path, trigger: bool) -> Result<u8> {
    let mut projector = open_projector()?;
    let report = projector.push(file, trigger).await?;
    println!("Pushed {} to {}", report.local_path.display(), report.remote_path);
    match report.trigger {
        Some(t) => println!("Build requested at {}", t.request_path),
        None => println!("Sync complete (no trigger)."),
    }
    Ok(0)
}

pub async fn retract(file: Option<PathBuf>, all: bool) -> Result<u8> {
    let projector = open_projector()?;
    let target = match file {
        Some(path) if !all => RetractTarget::Path(path),
        _ => RetractTarget::All,
    };
    let report = projector.retract(target).await?;
    if report.outcomes.is_empty() {
        println!("Nothing to retract.");
        return Ok(0);
    }
    for outcome in &report.outcomes {
        let note = match &outcome.restore {
            Restore::Restored(wall) => format!("restored {}", wall.display()),
            Restore::NotOnRemote => "not on remote host".to_string(),
            Restore::Failed => "wall copy not restored".to_string(),
        };
        println!("Retracted {} ({note})", outcome.remote_path);
    }
    if report.database_entries_removed > 0 {
        println!(
            "Removed {} compile_commands.json entries",
            report.database_entries_removed
        );
    }
    Ok(0)
}

pub async fn mount() -> Result<u8> {
    let projector = open_projector()?;
    let mounted = projector.mount_externals().await?;
    if mounted.is_empty() {
        println!("No external dependencies to mount.");
    }
    for path in &mounted {
        println!("Mounted {}", path.display());
    }
    Ok(0)
}

pub async fn repair_headers() -> Result<u8> {
    let mut projector = open_projector()?;
    let report = projector.repair_headers().await?;
    if report.system_includes.is_empty() {
        println!("Host reported no system include directories.");
        return Ok(1);
    }
    println!("Synced {} system include directories:", report.system_includes.len());
    for inc in &report.system_includes {
        println!("  {inc}");
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    Ok(0)
}
