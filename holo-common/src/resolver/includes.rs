//! `#include` scanning of a target file.

use super::flags::include_values;
use crate::compile_db::CompileCommandEntry;
use crate::util::{normalize_lexically, path_string};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static INCLUDE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s*include\s+(?:"([^"]+)"|<([^>]+)>)"#).ok());

/// One `#include` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub name: String,
    /// `<...>` rather than `"..."`.
    pub bracket: bool,
}

/// Directives in source text, in order.
pub fn scan_includes(source: &str) -> Vec<IncludeDirective> {
    let Some(re) = INCLUDE_RE.as_ref() else {
        return Vec::new();
    };
    source
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| {
            if let Some(quoted) = caps.get(1) {
                Some(IncludeDirective {
                    name: quoted.as_str().to_string(),
                    bracket: false,
                })
            } else {
                caps.get(2).map(|bracketed| IncludeDirective {
                    name: bracketed.as_str().to_string(),
                    bracket: true,
                })
            }
        })
        .collect()
}

/// Existing include directories of an entry, resolved against its directory.
pub fn search_paths(entry: &CompileCommandEntry) -> Vec<PathBuf> {
    let base = Path::new(&entry.directory);
    include_values(&entry.arguments)
        .into_iter()
        .map(|value| {
            let path = Path::new(&value);
            if path.is_absolute() {
                normalize_lexically(path)
            } else {
                normalize_lexically(&base.join(path))
            }
        })
        .filter(|path| path.is_dir())
        .collect()
}

fn find_header(name: &str, source_dir: &Path, search: &[PathBuf]) -> Option<PathBuf> {
    std::iter::once(source_dir)
        .chain(search.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .map(|found| std::fs::canonicalize(&found).unwrap_or_else(|_| normalize_lexically(&found)))
}

/// Headers the target includes directly, resolved through the entry's search
/// paths. Returns `(resolved, missing)`, both sorted and de-duplicated.
pub fn resolve_dependencies(
    target: &Path,
    entry: &CompileCommandEntry,
) -> (Vec<String>, Vec<String>) {
    let source = match std::fs::read(target) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(path = %target.display(), error = %e, "cannot read target for include scan");
            return (Vec::new(), Vec::new());
        }
    };
    let source_dir = target.parent().unwrap_or(Path::new("/"));
    let search = search_paths(entry);

    let mut resolved = BTreeSet::new();
    let mut missing = BTreeSet::new();
    for directive in scan_includes(&source) {
        match find_header(&directive.name, source_dir, &search) {
            Some(path) => {
                resolved.insert(path_string(&path));
            }
            None => {
                debug!(header = %directive.name, "include not resolved");
                missing.insert(directive.name);
            }
        }
    }
    (resolved.into_iter().collect(), missing.into_iter().collect())
}
