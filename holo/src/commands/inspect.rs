use super::helpers::open_projector;
use anyhow::{Context, Result};
use holo_common::util::absolutize;
use holo_common::{context_for, write_focus};
use std::path::Path;

pub fn focus(file: &Path) -> Result<u8> {
    let projector = open_projector()?;
    let file = absolutize(file).with_context(|| format!("cannot resolve {}", file.display()))?;
    let report = write_focus(projector.layout(), &file)?;
    println!(
        "Wrote {} ({} flags from {})",
        report.clangd_path.display(),
        report.flag_count,
        file.display()
    );
    Ok(0)
}

pub fn context(file: &Path, task: Option<&str>) -> Result<u8> {
    let projector = open_projector()?;
    let file = absolutize(file).with_context(|| format!("cannot resolve {}", file.display()))?;
    print!("{}", context_for(projector.layout(), &file, task)?);
    Ok(0)
}
