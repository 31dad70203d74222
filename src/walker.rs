use crate::errors::Result;
use crate::filters::FilterSet;
use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Depth-first traversal of the tree below a root directory.
///
/// Hidden entries (names starting with `.`) are skipped, and hidden
/// directories are pruned without being descended into. The root itself is
/// never emitted, and surviving files must pass the [`FilterSet`].
pub struct TreeWalker {
    root: PathBuf,
    filters: FilterSet,
}

impl TreeWalker {
    /// Creates a new `TreeWalker` rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, filters: FilterSet) -> Self {
        Self {
            root: root.into(),
            filters,
        }
    }

    /// The traversal root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the tree, handing every candidate file to `emit`.
    ///
    /// `emit` returns `false` when the receiving side has gone away, which
    /// stops the walk early. Any error while listing a directory aborts the
    /// walk and is returned to the caller.
    ///
    /// # Returns
    ///
    /// The number of paths emitted.
    pub fn walk<F>(&self, mut emit: F) -> Result<usize>
    where
        F: FnMut(PathBuf) -> bool,
    {
        let mut builder = WalkBuilder::new(&self.root);
        // Only our own rules apply: no gitignore, no built-in hidden filter.
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| !is_hidden(entry));

        let mut emitted = 0;
        for entry in builder.build() {
            let entry = entry?;
            if entry.depth() == 0 || entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            let path = entry.into_path();
            if !self.filters.accepts(&path) {
                trace!(path = %path.display(), "filtered out");
                continue;
            }
            if !emit(path) {
                break;
            }
            emitted += 1;
        }
        Ok(emitted)
    }
}

/// Hidden below the root; the root is exempt even if its own name is hidden.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect(walker: &TreeWalker) -> Vec<String> {
        let mut found = Vec::new();
        walker
            .walk(|p| {
                let rel = p
                    .strip_prefix(walker.root())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                found.push(rel);
                true
            })
            .unwrap();
        found
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join(".git/config"), "foo").unwrap();
        fs::write(root.join(".env"), "foo").unwrap();
        fs::write(root.join("README.md"), "foo").unwrap();
        fs::write(root.join("src/lib.rs"), "foo").unwrap();
        fs::write(root.join("src/nested/mod.rs"), "foo").unwrap();
        fs::write(root.join("src/nested/.hidden.rs"), "foo").unwrap();
        fs::write(root.join("vendor/dep.rs"), "foo").unwrap();
        dir
    }

    #[test]
    fn test_hidden_entries_are_skipped() {
        let dir = fixture();
        let walker = TreeWalker::new(dir.path(), FilterSet::default());
        let found = collect(&walker);
        assert_eq!(
            found,
            vec!["README.md", "src/lib.rs", "src/nested/mod.rs", "vendor/dep.rs"]
        );
        assert!(found.iter().all(|p| !p.contains(".git")));
    }

    #[test]
    fn test_filters_are_applied() {
        let dir = fixture();
        let walker = TreeWalker::new(dir.path(), FilterSet::new(&["*.rs"], &["vendor"]));
        assert_eq!(collect(&walker), vec!["src/lib.rs", "src/nested/mod.rs"]);
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".config");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("settings.toml"), "x").unwrap();
        let walker = TreeWalker::new(&root, FilterSet::default());
        assert_eq!(collect(&walker), vec!["settings.toml"]);
    }

    #[test]
    fn test_early_stop_when_receiver_is_gone() {
        let dir = fixture();
        let walker = TreeWalker::new(dir.path(), FilterSet::default());
        let emitted = walker.walk(|_| false).unwrap();
        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let walker = TreeWalker::new(dir.path().join("missing"), FilterSet::default());
        assert!(walker.walk(|_| true).is_err());
    }
}
