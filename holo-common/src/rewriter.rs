//! Local compile database rewriting.
//!
//! A compile entry resolved on the host names host paths. Local tooling
//! needs the same entry with the file in the Hologram and include paths in
//! the OutsideWall.

use crate::compile_db::{CompileCommandEntry, CompileDatabase};
use crate::errors::{ErrorCode, Result};
use crate::overlay::OverlayLayout;
use crate::util::path_string;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Remote prefixes whose headers are injected with `-isystem`.
const SYSTEM_PREFIXES: &[&str] = &["/usr", "/opt", "/lib"];

const PATH_FLAGS: &[&str] = &["-isystem", "-I", "-L"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteWarning {
    /// No system include directories are configured.
    SystemIncludesNotConfigured,
    /// A configured system include has no local copy.
    SystemIncludeMissing(PathBuf),
}

impl fmt::Display for RewriteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemIncludesNotConfigured => write!(
                f,
                "system headers are not configured; run 'holo repair-headers'"
            ),
            Self::SystemIncludeMissing(path) => write!(
                f,
                "system include {} is not synced; run 'holo repair-headers'",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub entry: CompileCommandEntry,
    pub warnings: Vec<RewriteWarning>,
}

/// Rewrites remote compile entries into overlay-local ones.
pub struct Rewriter<'a> {
    layout: &'a OverlayLayout,
    system_includes: &'a [String],
}

impl<'a> Rewriter<'a> {
    pub fn new(layout: &'a OverlayLayout, system_includes: &'a [String]) -> Self {
        Self {
            layout,
            system_includes,
        }
    }

    /// Translate a remote entry and inject dependency and system include dirs.
    pub fn rewrite(
        &self,
        context: &CompileCommandEntry,
        dependencies: &[String],
    ) -> RewriteOutcome {
        let mut arguments = self.translate_flags(&context.arguments);
        arguments.extend(self.dependency_flags(dependencies));
        let warnings = self.inject_system_includes(&mut arguments);

        RewriteOutcome {
            entry: CompileCommandEntry::new(
                self.translate_path(&context.directory),
                self.translate_path(&context.file),
                arguments,
            ),
            warnings,
        }
    }

    /// Rewrite and upsert into `hologram/compile_commands.json`.
    pub fn upsert(
        &self,
        context: &CompileCommandEntry,
        dependencies: &[String],
    ) -> Result<RewriteOutcome> {
        let outcome = self.rewrite(context, dependencies);
        let mut db = CompileDatabase::load_or_reset(self.layout.compile_db_path());
        db.upsert(outcome.entry.clone());
        db.save()?;
        info!(file = %outcome.entry.file, "updated local compilation database");
        Ok(outcome)
    }

    /// Drop entries for the given local files. Returns how many were removed.
    pub fn remove_entries(&self, files: &HashSet<PathBuf>) -> Result<usize> {
        let path = self.layout.compile_db_path();
        if !path.exists() {
            return Ok(0);
        }
        let mut db = CompileDatabase::load_or_reset(path);
        let removed = db.remove_files(files);
        if removed > 0 {
            db.save()?;
        }
        Ok(removed)
    }

    /// Re-apply configured system includes to every local entry.
    pub fn refresh_system_includes(&self) -> Result<Vec<RewriteWarning>> {
        let path = self.layout.compile_db_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut db = CompileDatabase::load_or_reset(path);
        let mut warnings = Vec::new();
        for entry in db.entries_mut() {
            for warning in self.inject_system_includes(&mut entry.arguments) {
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }
        }
        db.save()?;
        Ok(warnings)
    }

    /// Swap a `remote_root` prefix for the Hologram root.
    pub fn translate_path(&self, remote: &str) -> String {
        match self.layout.relative_of_remote(remote) {
            Some(rel) if rel.as_os_str().is_empty() => path_string(self.layout.hologram_root()),
            Some(rel) => path_string(&self.layout.hologram_root().join(rel)),
            None => remote.to_string(),
        }
    }

    /// OutsideWall spelling of an absolute path, if that copy exists locally.
    fn wall_if_present(&self, value: &str) -> Option<String> {
        if !value.starts_with('/') {
            return None;
        }
        let mapped = self.layout.wall_path(value);
        mapped.exists().then(|| path_string(&mapped))
    }

    fn translate_flags(&self, args: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(args.len());
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let Some(flag) = PATH_FLAGS.iter().find(|f| arg.starts_with(**f)) else {
                out.push(arg.clone());
                continue;
            };
            let attached = &arg[flag.len()..];
            if attached.is_empty() {
                out.push(arg.clone());
                if let Some(value) = iter.next() {
                    out.push(self.wall_if_present(value).unwrap_or_else(|| value.clone()));
                }
            } else {
                match self.wall_if_present(attached) {
                    Some(mapped) => out.push(format!("{flag}{mapped}")),
                    None => out.push(arg.clone()),
                }
            }
        }
        out
    }

    fn dependency_flags(&self, dependencies: &[String]) -> Vec<String> {
        let mut project = BTreeSet::new();
        let mut system = BTreeSet::new();
        for dep in dependencies.iter().filter(|d| d.starts_with('/')) {
            let Some(parent) = self.layout.wall_path(dep).parent().map(Path::to_path_buf) else {
                continue;
            };
            if SYSTEM_PREFIXES
                .iter()
                .any(|prefix| Path::new(dep).starts_with(prefix))
            {
                system.insert(parent);
            } else {
                project.insert(parent);
            }
        }

        let mut flags: Vec<String> = project
            .into_iter()
            .map(|dir| format!("-I{}", dir.display()))
            .collect();
        for dir in system {
            flags.push("-isystem".to_string());
            flags.push(path_string(&dir));
        }
        flags
    }

    fn inject_system_includes(&self, args: &mut Vec<String>) -> Vec<RewriteWarning> {
        let mut warnings = Vec::new();
        if self.system_includes.is_empty() {
            warn!(
                code = %ErrorCode::ResolveSystemIncludesMissing.code_string(),
                "system headers not configured; run 'holo repair-headers'"
            );
            warnings.push(RewriteWarning::SystemIncludesNotConfigured);
            return warnings;
        }

        let mut present: HashSet<String> = existing_isystem(args);
        for include in self.system_includes {
            let mapped = self.layout.wall_path(include);
            let mapped_str = path_string(&mapped);
            if !mapped.exists() {
                warn!(
                    code = %ErrorCode::ResolveSystemIncludesMissing.code_string(),
                    path = %mapped.display(),
                    "system include not synced locally"
                );
                warnings.push(RewriteWarning::SystemIncludeMissing(mapped));
            }
            if present.insert(mapped_str.clone()) {
                args.push("-isystem".to_string());
                args.push(mapped_str);
            }
        }
        warnings
    }
}

fn existing_isystem(args: &[String]) -> HashSet<String> {
    let mut present = HashSet::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-isystem" {
            if let Some(value) = iter.next() {
                present.insert(value.clone());
            }
        } else if let Some(value) = arg.strip_prefix("-isystem") {
            present.insert(value.to_string());
        }
    }
    present
}
