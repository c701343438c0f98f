//! Working-directory and project-root path resolution.

use std::path::{Path, PathBuf};

/// Walk up from `start` looking for the nearest ancestor directory that
/// contains `marker` (e.g. `package.json`). Returns the directory, not the
/// marker file itself.
#[must_use]
pub fn search_up(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if current.join(marker).is_file() {
            return Some(current.to_path_buf());
        }
        dir = current.parent();
    }
    None
}

/// Resolve a (possibly relative) child path against `root`. Absolute paths
/// are returned unchanged.
#[must_use]
pub fn normalize_child_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_up_finds_nearest_marker() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a/package.json"), "{}").unwrap();

        let found = search_up(&nested, "package.json").unwrap();
        assert_eq!(found, dir.path().join("a"));
    }

    #[test]
    fn test_search_up_missing_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(search_up(dir.path(), "definitely-not-here.xyz"), None);
    }

    #[test]
    fn test_normalize_child_path() {
        let root = Path::new("/project");
        assert_eq!(
            normalize_child_path(root, Path::new("lib/index.js")),
            PathBuf::from("/project/lib/index.js")
        );
        assert_eq!(
            normalize_child_path(root, Path::new("/other/index.js")),
            PathBuf::from("/other/index.js")
        );
    }
}
