//! External dependency discovery and mount consolidation.
//!
//! Include directories outside the repository (vendored SDKs, sibling
//! checkouts) become mounts: a `host_path` to copy and the
//! `container_path` the compile commands spell it as. When a symlink makes
//! the two differ, both spellings are mounted.

use super::flags::include_values;
use crate::compile_db::CompileCommandEntry;
use crate::errors::ErrorCode;
use crate::util::{normalize_lexically, path_string};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// A host directory materialized at a container path in the wall.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyMount {
    pub host_path: String,
    pub container_path: String,
}

impl DependencyMount {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// Whether `self` is `other` or lives inside it at the same relative spot
    /// on both sides.
    fn nested_in(&self, other: &Self) -> bool {
        let host = Path::new(&self.host_path).strip_prefix(&other.host_path);
        let container = Path::new(&self.container_path).strip_prefix(&other.container_path);
        matches!((host, container), (Ok(h), Ok(c)) if h == c)
    }
}

/// Mounts for every external include directory referenced by `entries`.
pub fn discover_mounts(entries: &[CompileCommandEntry], repo_root: &Path) -> Vec<DependencyMount> {
    let repo_root = std::fs::canonicalize(repo_root).unwrap_or_else(|_| normalize_lexically(repo_root));
    let mut seen = HashSet::new();
    let mut mounts = Vec::new();

    for entry in entries {
        let base = Path::new(&entry.directory);
        for value in include_values(&entry.arguments) {
            let logical = normalize_lexically(&base.join(&value));
            let physical = match std::fs::canonicalize(&logical) {
                Ok(path) => path,
                Err(_) => {
                    debug!(
                        code = %ErrorCode::ResolveExternalPathUnresolvable.code_string(),
                        path = %logical.display(),
                        "include directory missing; skipped"
                    );
                    continue;
                }
            };
            if physical.starts_with(&repo_root) {
                continue;
            }
            let host = path_string(&physical);
            let mut push = |mount: DependencyMount| {
                if seen.insert(mount.clone()) {
                    mounts.push(mount);
                }
            };
            push(DependencyMount::new(host.clone(), host.clone()));
            if physical != logical {
                push(DependencyMount::new(host, path_string(&logical)));
            }
        }
    }
    mounts
}

/// Drop pairs already covered by a shorter pair.
pub fn consolidate_mounts(mut mounts: Vec<DependencyMount>) -> Vec<DependencyMount> {
    mounts.sort_by_key(|m| m.host_path.len());
    let mut kept: Vec<DependencyMount> = Vec::new();
    for mount in mounts {
        if !kept.iter().any(|k| mount.nested_in(k)) {
            kept.push(mount);
        }
    }
    kept
}
