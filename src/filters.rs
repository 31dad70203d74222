use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;
use tracing::debug;

/// A single include or exclude pattern.
///
/// A path matches when the glob matches or when the raw pattern text is a
/// substring of it. A pattern that is not a valid glob still matches by
/// substring.
#[derive(Debug, Clone)]
struct PathPattern {
    raw: String,
    glob: Option<GlobMatcher>,
}

impl PathPattern {
    fn new(raw: &str) -> Self {
        // `*` must not cross directory separators, as with shell globs.
        let glob = match GlobBuilder::new(raw).literal_separator(true).build() {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                debug!(pattern = raw, error = %e, "not a valid glob, matching by substring only");
                None
            }
        };
        Self {
            raw: raw.to_string(),
            glob,
        }
    }

    fn matches(&self, text: &str) -> bool {
        if let Some(glob) = &self.glob {
            if glob.is_match(text) {
                return true;
            }
        }
        text.contains(self.raw.as_str())
    }
}

/// The traversal filter set: ordered include and exclude patterns.
///
/// Built once per run and consulted once for each discovered file.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    includes: Vec<PathPattern>,
    excludes: Vec<PathPattern>,
}

impl FilterSet {
    /// Creates a filter set from raw include and exclude patterns.
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Self {
        Self {
            includes: includes.iter().map(|p| PathPattern::new(p.as_ref())).collect(),
            excludes: excludes.iter().map(|p| PathPattern::new(p.as_ref())).collect(),
        }
    }

    /// Includes are checked against the base name only.
    pub fn is_included(&self, path: &Path) -> bool {
        if self.includes.is_empty() {
            return true;
        }
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        self.includes.iter().any(|p| p.matches(&name))
    }

    /// Excludes are checked against the full path.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let full = path.to_string_lossy();
        self.excludes.iter().any(|p| p.matches(&full))
    }

    /// Returns `true` if `path` survives both the include and exclude rules.
    pub fn accepts(&self, path: &Path) -> bool {
        self.is_included(path) && !self.is_excluded(path)
    }
}
