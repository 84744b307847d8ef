//! `compile_commands.json` model.
//!
//! Entries are stored with an `arguments` token list. A legacy single-string
//! `command` is accepted on read and tokenized with `shell-words`; output
//! always uses `arguments`.

use crate::config::write_atomic;
use crate::errors::{ErrorCode, HoloError, Result};
use crate::util::{join_command, normalize_lexically, tokenize_command};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One compile entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct CompileCommandEntry {
    pub directory: String,
    pub file: String,
    pub arguments: Vec<String>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    directory: String,
    file: String,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

impl TryFrom<RawEntry> for CompileCommandEntry {
    type Error = String;

    fn try_from(raw: RawEntry) -> std::result::Result<Self, Self::Error> {
        let arguments = match (raw.arguments, raw.command) {
            (Some(arguments), _) => arguments,
            (None, Some(command)) => tokenize_command(&command),
            (None, None) => {
                return Err(format!(
                    "entry for {} has neither arguments nor command",
                    raw.file
                ));
            }
        };
        Ok(Self {
            directory: raw.directory,
            file: raw.file,
            arguments,
        })
    }
}

impl CompileCommandEntry {
    pub fn new(
        directory: impl Into<String>,
        file: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            file: file.into(),
            arguments,
        }
    }

    /// Shell-quoted command line, used for flag substring matching.
    pub fn command_line(&self) -> String {
        join_command(&self.arguments)
    }

    /// `file` resolved against `directory`.
    pub fn file_path(&self) -> PathBuf {
        let file = Path::new(&self.file);
        if file.is_absolute() {
            normalize_lexically(file)
        } else {
            normalize_lexically(&Path::new(&self.directory).join(file))
        }
    }
}

/// An on-disk compilation database.
#[derive(Debug, Clone)]
pub struct CompileDatabase {
    path: PathBuf,
    entries: Vec<CompileCommandEntry>,
}

impl CompileDatabase {
    /// Empty database that will be written to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Read a database; a missing file is an empty database.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(e) => return Err(HoloError::io(format!("read {}", path.display()), e)),
        };
        if content.trim().is_empty() {
            return Ok(Self::empty(path));
        }
        let entries = serde_json::from_str(&content).map_err(|source| HoloError::Json {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, entries })
    }

    /// Read a database, starting over when it is unreadable.
    pub fn load_or_reset(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(db) => db,
            Err(e) => {
                warn!(
                    code = %ErrorCode::ResolveDatabaseCorrupt.code_string(),
                    path = %path.display(),
                    error = %e,
                    "compilation database unreadable; starting a new one"
                );
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[CompileCommandEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [CompileCommandEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry whose `file` resolves to `file`.
    pub fn find(&self, file: &Path) -> Option<&CompileCommandEntry> {
        let wanted = normalize_lexically(file);
        self.entries.iter().find(|e| e.file_path() == wanted)
    }

    /// Replace any entry for the same file, then append. Returns whether one
    /// was replaced.
    pub fn upsert(&mut self, entry: CompileCommandEntry) -> bool {
        let target = entry.file_path();
        let before = self.entries.len();
        self.entries.retain(|e| e.file_path() != target);
        let replaced = self.entries.len() != before;
        self.entries.push(entry);
        replaced
    }

    /// Drop entries for the given files. Returns how many were removed.
    pub fn remove_files(&mut self, files: &HashSet<PathBuf>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !files.contains(&e.file_path()));
        before - self.entries.len()
    }

    /// Write the database back (temp file, then rename).
    pub fn save(&self) -> Result<()> {
        let body = serde_json::to_string_pretty(&self.entries).map_err(|source| HoloError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, body.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(file: &str, args: &[&str]) -> CompileCommandEntry {
        CompileCommandEntry::new(
            "/srv/repo",
            file,
            args.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    #[test]
    fn legacy_command_is_tokenized() {
        let json = r#"[{"directory": "/srv/repo", "file": "a.c", "command": "gcc -DNAME=\"a b\" -c a.c"}]"#;
        let entries: Vec<CompileCommandEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].arguments, vec!["gcc", "-DNAME=a b", "-c", "a.c"]);
    }

    #[test]
    fn entry_without_arguments_or_command_is_rejected() {
        let json = r#"[{"directory": "/srv/repo", "file": "a.c"}]"#;
        assert!(serde_json::from_str::<Vec<CompileCommandEntry>>(json).is_err());
    }

    #[test]
    fn output_always_uses_arguments() {
        let text = serde_json::to_string(&entry("a.c", &["gcc", "a.c"])).unwrap();
        assert!(text.contains("\"arguments\""));
        assert!(!text.contains("\"command\""));
    }

    #[test]
    fn file_path_resolves_relative_to_directory() {
        assert_eq!(
            entry("src/../a.c", &["gcc"]).file_path(),
            PathBuf::from("/srv/repo/a.c")
        );
        assert_eq!(
            entry("/abs/b.c", &["gcc"]).file_path(),
            PathBuf::from("/abs/b.c")
        );
    }

    #[test]
    fn upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("compile_commands.json");
        let mut db = CompileDatabase::load(&path).unwrap();
        assert!(db.is_empty());

        let e = entry("/srv/repo/a.c", &["gcc", "-c", "/srv/repo/a.c"]);
        assert!(!db.upsert(e.clone()));
        assert!(db.upsert(e.clone()));
        assert_eq!(db.len(), 1);
        db.save().unwrap();

        let mut reloaded = CompileDatabase::load(&path).unwrap();
        reloaded.upsert(e.clone());
        assert_eq!(reloaded.entries(), &[e]);
    }

    #[test]
    fn upsert_replaces_by_resolved_file() {
        let mut db = CompileDatabase::empty("/tmp/unused.json");
        db.upsert(entry("a.c", &["gcc", "-DOLD"]));
        db.upsert(entry("/srv/repo/a.c", &["gcc", "-DNEW"]));
        assert_eq!(db.len(), 1);
        assert_eq!(db.entries()[0].arguments, vec!["gcc", "-DNEW"]);
    }

    #[test]
    fn remove_files_drops_matching_entries() {
        let mut db = CompileDatabase::empty("/tmp/unused.json");
        db.upsert(entry("/srv/repo/a.c", &["gcc"]));
        db.upsert(entry("/srv/repo/b.c", &["gcc"]));
        let gone: HashSet<PathBuf> = [PathBuf::from("/srv/repo/a.c")].into_iter().collect();
        assert_eq!(db.remove_files(&gone), 1);
        assert!(db.find(Path::new("/srv/repo/b.c")).is_some());
        assert!(db.find(Path::new("/srv/repo/a.c")).is_none());
    }

    #[test]
    fn corrupt_database_resets_when_lenient() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("compile_commands.json");
        std::fs::write(&path, "[{broken").unwrap();
        assert!(CompileDatabase::load(&path).is_err());
        assert!(CompileDatabase::load_or_reset(&path).is_empty());
    }
}
