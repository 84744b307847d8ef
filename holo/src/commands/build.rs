//! Build commands: build, log, listen, live.

use super::helpers::{current_dir, exit_code, open_projector};
use anyhow::Result;
use holo_common::{MonitorMode, fetch_log};
use std::path::{Path, PathBuf};

pub async fn build(context_from: Option<&Path>, sync: Option<&Path>, wait: bool) -> Result<u8> {
    let mut projector = open_projector()?;
    let report = projector.build(context_from, sync, &current_dir()?).await?;
    if let Some(pushed) = &report.synced {
        println!("Synced {}", pushed.remote_path);
    }
    if report.trigger.switched {
        println!(
            "Context switch: {} -> {}",
            report.trigger.previous_context.as_deref().unwrap_or("<none>"),
            report.trigger.target_root
        );
    }
    println!("Build triggered ({})", report.trigger.request_path);

    if !wait {
        return Ok(0);
    }
    println!("Waiting for build to complete...");
    let outcome = projector.monitor().run(MonitorMode::WaitForTerminal).await;
    Ok(exit_code(outcome.exit_code()))
}

pub async fn log(lines: Option<usize>) -> Result<u8> {
    let projector = open_projector()?;
    let log_path = projector.config().remote_log_path();
    let body = fetch_log(projector.transport(), &log_path, lines).await?;
    println!("{body}");
    Ok(0)
}

pub async fn listen(mirror_log: Option<PathBuf>) -> Result<u8> {
    let projector = open_projector()?;
    let mut monitor = projector.monitor();
    if let Some(path) = mirror_log {
        monitor = monitor.with_mirror(path);
    }
    println!("Listening on {}", monitor.log_path());
    let outcome = monitor.run(MonitorMode::Follow).await;
    Ok(exit_code(outcome.exit_code()))
}

pub async fn live(auto_build: bool) -> Result<u8> {
    let mut projector = open_projector()?;
    println!(
        "Live mode: watching {} (auto-build {})",
        projector.layout().hologram_root().display(),
        if auto_build { "on" } else { "off" }
    );
    projector.live(auto_build).await?;
    Ok(130)
}
