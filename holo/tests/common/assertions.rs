use std::path::Path;

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}

pub fn assert_path_exists(path: &Path) {
    assert!(path.exists(), "Expected path to exist: {}", path.display());
}

pub fn assert_read_only(path: &Path) {
    let meta = std::fs::metadata(path)
        .unwrap_or_else(|e| panic!("Expected {} to exist: {e}", path.display()));
    assert!(
        meta.permissions().readonly(),
        "Expected {} to be read-only",
        path.display()
    );
}
