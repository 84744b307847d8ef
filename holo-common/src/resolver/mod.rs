//! Compile-context resolution.
//!
//! Runs on the repository host (`holo resolve`) where the compilation
//! databases and sources live, and prints a [`ResolveReport`] as JSON for
//! the local side to consume.

pub mod candidates;
pub mod flags;
pub mod includes;
pub mod mounts;

pub use candidates::{
    CandidateDiff, CandidateKind, CompileCandidate, Selection, SelectionWarning, collect_candidates,
    select,
};
pub use mounts::{DependencyMount, consolidate_mounts, discover_mounts};

use crate::COMPILE_DB_FILE;
use crate::compile_db::{CompileCommandEntry, CompileDatabase};
use crate::errors::ErrorCode;
use crate::util::{normalize_lexically, path_string};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The winning compile entry, plus every candidate considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileContext {
    pub directory: String,
    pub file: String,
    pub arguments: Vec<String>,
    #[serde(default)]
    pub candidates: Vec<CompileCandidate>,
}

impl CompileContext {
    pub fn entry(&self) -> CompileCommandEntry {
        CompileCommandEntry::new(
            self.directory.clone(),
            self.file.clone(),
            self.arguments.clone(),
        )
    }
}

/// Resolver output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReport {
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<DependencyMount>,
    #[serde(default)]
    pub compile_context: Option<CompileContext>,
    #[serde(default)]
    pub warnings: Vec<SelectionWarning>,
}

/// Databases to consult for files under `start`: the nearest
/// `compile_commands.json` walking upward, its `build/` neighbour, and any
/// extra paths (relative ones resolved against `start`).
pub fn find_databases(start: &Path, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in start.ancestors() {
        let candidate = dir.join(COMPILE_DB_FILE);
        if candidate.is_file() {
            found.push(candidate);
            let build = dir.join("build").join(COMPILE_DB_FILE);
            if build.is_file() {
                found.push(build);
            }
            break;
        }
    }
    for path in extra {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            start.join(path)
        };
        if path.is_file() && !found.contains(&path) {
            found.push(path);
        }
    }
    found
}

/// Entries from every readable database, identical duplicates removed.
pub fn load_entries(databases: &[PathBuf]) -> Vec<CompileCommandEntry> {
    let mut entries: Vec<CompileCommandEntry> = Vec::new();
    for path in databases {
        match CompileDatabase::load(path) {
            Ok(db) => {
                debug!(path = %path.display(), entries = db.len(), "loaded compilation database");
                for entry in db.entries() {
                    if !entries.contains(entry) {
                        entries.push(entry.clone());
                    }
                }
            }
            Err(e) => warn!(
                code = %ErrorCode::ResolveDatabaseCorrupt.code_string(),
                path = %path.display(),
                error = %e,
                "skipping unreadable compilation database"
            ),
        }
    }
    entries
}

/// Resolve the compile context and direct header dependencies of `target`.
///
/// No matching entry is not an error: the report simply carries no context.
pub fn resolve_target(
    target: &Path,
    databases: &[PathBuf],
    required_flags: &[String],
) -> ResolveReport {
    let target = std::fs::canonicalize(target).unwrap_or_else(|_| normalize_lexically(target));
    let entries = load_entries(databases);
    let candidates = collect_candidates(&target, &entries, required_flags);
    debug!(target = %target.display(), candidates = candidates.len(), "scored candidates");

    let Some(selection) = select(candidates, !required_flags.is_empty()) else {
        return ResolveReport::default();
    };
    let (dependencies, missing) = includes::resolve_dependencies(&target, &selection.winner.entry);
    let winner = selection.winner.entry;

    ResolveReport {
        dependencies,
        missing,
        mounts: Vec::new(),
        compile_context: Some(CompileContext {
            directory: winner.directory,
            file: path_string(&target),
            arguments: winner.arguments,
            candidates: selection.candidates,
        }),
        warnings: selection.warnings,
    }
}

/// Consolidated external mounts for every entry in `databases`.
pub fn resolve_mounts(databases: &[PathBuf], repo_root: &Path) -> ResolveReport {
    let entries = load_entries(databases);
    ResolveReport {
        mounts: consolidate_mounts(discover_mounts(&entries, repo_root)),
        ..ResolveReport::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_db(path: &Path, entries: &[CompileCommandEntry]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string(entries).unwrap()).unwrap();
    }

    #[test]
    fn find_databases_walks_up_and_adds_build_neighbour() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_db(&root.join(COMPILE_DB_FILE), &[]);
        write_db(&root.join("build").join(COMPILE_DB_FILE), &[]);
        write_db(&root.join("extra.json"), &[]);
        let nested = root.join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let dbs = find_databases(&nested, &[root.join("extra.json"), PathBuf::from("nope.json")]);
        assert_eq!(
            dbs,
            vec![
                root.join(COMPILE_DB_FILE),
                root.join("build").join(COMPILE_DB_FILE),
                root.join("extra.json"),
            ]
        );
    }

    #[test]
    fn resolve_target_reports_context_and_dependencies() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("include")).unwrap();
        std::fs::write(root.join("include/api.h"), "").unwrap();
        std::fs::write(root.join("main.c"), "#include <api.h>\n").unwrap();
        let entry = CompileCommandEntry::new(
            path_string(&root),
            "main.c",
            vec!["gcc".into(), "-Iinclude".into(), "-c".into(), "main.c".into()],
        );
        let db = root.join(COMPILE_DB_FILE);
        write_db(&db, &[entry.clone(), entry]);

        let report = resolve_target(&root.join("main.c"), &[db], &[]);
        let ctx = report.compile_context.expect("context");
        assert_eq!(ctx.file, path_string(&root.join("main.c")));
        assert_eq!(ctx.candidates.len(), 1, "identical duplicates collapse");
        assert_eq!(report.dependencies, vec![path_string(&root.join("include/api.h"))]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn resolve_target_without_entry_has_no_context() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join(COMPILE_DB_FILE);
        write_db(&db, &[]);
        let report = resolve_target(&dir.path().join("x.c"), &[db], &[]);
        assert!(report.compile_context.is_none());
        assert!(report.dependencies.is_empty());
    }

    #[test]
    fn report_json_shape() {
        let report = ResolveReport {
            dependencies: vec!["/srv/repo/a.h".into()],
            warnings: vec![SelectionWarning::TooTight],
            ..ResolveReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["warnings"][0]["kind"], "too_tight");
        assert!(json["compile_context"].is_null());

        let parsed: ResolveReport =
            serde_json::from_str(r#"{"dependencies": [], "compile_context": null}"#).unwrap();
        assert_eq!(parsed, ResolveReport::default());
    }
}
