//! Read-only views of the local compile database: clangd focus and agent
//! context summaries.

use crate::compile_db::{CompileCommandEntry, CompileDatabase};
use crate::config::write_atomic;
use crate::errors::{HoloError, Result};
use crate::overlay::OverlayLayout;
use crate::resolver::flags::{include_values, language_standard, macros};
use crate::util::{is_source, path_string};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// clangd project config written into the Hologram.
pub const CLANGD_FILE: &str = ".clangd";

/// Compiler flags of an entry without the compiler, `-c`, `-o <out>` or
/// source operands.
pub fn focus_flags(arguments: &[String]) -> Vec<String> {
    let mut flags = Vec::new();
    let mut iter = arguments.iter().enumerate();
    while let Some((i, arg)) = iter.next() {
        if i == 0 && !arg.starts_with('-') {
            continue;
        }
        match arg.as_str() {
            "-o" => {
                iter.next();
            }
            "-c" => {}
            _ if !arg.starts_with('-') && is_source(Path::new(arg)) => {}
            _ => flags.push(arg.clone()),
        }
    }
    flags
}

pub fn render_clangd(flags: &[String]) -> String {
    let mut out = String::from("CompileFlags:\n  Add:\n");
    for flag in flags {
        let escaped = flag.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(out, "    - \"{escaped}\"");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusReport {
    pub clangd_path: PathBuf,
    pub flag_count: usize,
}

fn load_entry(layout: &OverlayLayout, file: &Path) -> Result<CompileCommandEntry> {
    let db = CompileDatabase::load(layout.compile_db_path())?;
    db.find(file).cloned().ok_or_else(|| HoloError::NotFound {
        file: path_string(file),
    })
}

/// Write `hologram/.clangd` from the flags `file` is compiled with.
pub fn write_focus(layout: &OverlayLayout, file: &Path) -> Result<FocusReport> {
    let entry = load_entry(layout, file)?;
    let flags = focus_flags(&entry.arguments);
    let clangd_path = layout.hologram_root().join(CLANGD_FILE);
    write_atomic(&clangd_path, render_clangd(&flags).as_bytes())?;
    info!(path = %clangd_path.display(), flags = flags.len(), "wrote clangd focus");
    Ok(FocusReport {
        clangd_path,
        flag_count: flags.len(),
    })
}

fn fence_language(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("c" | "h") => "c",
        Some("cpp" | "hpp" | "cc" | "hh" | "cxx") => "cpp",
        _ => "",
    }
}

/// Markdown summary of how `entry` compiles, for handing to an agent.
pub fn render_context(entry: &CompileCommandEntry, project_root: &Path, task: Option<&str>) -> String {
    let target = entry.file_path();
    let shown = |p: &Path| -> String {
        p.strip_prefix(project_root)
            .map(path_string)
            .unwrap_or_else(|_| path_string(p))
    };

    let mut out = String::from("# Mission Request\n");
    let _ = writeln!(
        out,
        "{}\n",
        task.unwrap_or("No specific task description provided.")
    );

    out.push_str("# Compilation Context\n");
    let _ = writeln!(out, "**Target File**: `{}`", shown(&target));
    if let Some(std) = language_standard(&entry.arguments) {
        let _ = writeln!(out, "**Standard**: `{std}`");
    }

    out.push_str("\n## Macros\n");
    let mut defined = macros(&entry.arguments);
    defined.sort();
    if defined.is_empty() {
        out.push_str("(None)\n");
    }
    for m in &defined {
        let _ = writeln!(out, "- `{m}`");
    }

    out.push_str("\n## Includes\n");
    let includes = include_values(&entry.arguments);
    if includes.is_empty() {
        out.push_str("(None)\n");
    }
    for inc in &includes {
        let _ = writeln!(out, "- `{}`", shown(Path::new(inc)));
    }

    out.push_str("\n# Source Code\n");
    match std::fs::read_to_string(&target) {
        Ok(source) => {
            let _ = writeln!(out, "```{}\n{}\n```", fence_language(&target), source.trim_end());
        }
        Err(e) => {
            let _ = writeln!(out, "Error reading source file: {e}");
        }
    }
    out
}

/// [`render_context`] for a file in the local compile database.
pub fn context_for(layout: &OverlayLayout, file: &Path, task: Option<&str>) -> Result<String> {
    let entry = load_entry(layout, file)?;
    Ok(render_context(&entry, layout.project_root(), task))
}
