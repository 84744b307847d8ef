//! Small path and shell helpers shared by the core modules.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Header extensions; files with these never get their own compile entry.
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inl"];

/// Translation-unit extensions considered when looking for a header's sibling.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "m", "mm"];

/// Quote a value for a POSIX shell command line.
pub fn quote(value: &str) -> String {
    shell_escape::escape(Cow::Borrowed(value)).into_owned()
}

/// Split a shell-quoted command line into arguments.
///
/// Falls back to whitespace splitting when quoting is unbalanced, which
/// happens with hand-edited databases.
pub fn tokenize_command(command: &str) -> Vec<String> {
    match shell_words::split(command) {
        Ok(words) => words,
        Err(_) => command.split_whitespace().map(str::to_string).collect(),
    }
}

/// Join arguments back into a shell-quoted command line.
pub fn join_command(arguments: &[String]) -> String {
    shell_words::join(arguments)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_relative_top = matches!(
                    out.components().next_back(),
                    Some(Component::ParentDir) | None
                );
                if at_relative_top {
                    if !path.has_root() {
                        out.push("..");
                    }
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Make a path absolute against the working directory and normalize it.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_lexically(path));
    }
    Ok(normalize_lexically(&std::path::absolute(path)?))
}

/// Drop leading slashes so an absolute path can be re-rooted with `join`.
pub fn strip_leading_slash(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Render a path the way the repository host spells it.
pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether the path names a header.
pub fn is_header(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| HEADER_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the path names a translation unit.
pub fn is_source(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
}

/// Indent every line of text by a fixed prefix.
pub fn indent_lines(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
