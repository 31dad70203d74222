use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in `sweep`.
///
/// Only two kinds of error are fatal to a run: a bad configuration (including
/// an uncompilable pattern) and a traversal failure. Everything else is
/// raised for a single file or repository and reported by the stage that
/// caught it.
#[derive(Error, Debug)]
pub enum Error {
    /// An error related to file system I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that occurred during regex compilation.
    #[error("Pattern compilation failed: {0}")]
    Regex(#[from] regex::Error),

    /// An error that occurred while parsing a YAML configuration file.
    #[error("Config parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A general configuration-related error.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the `ignore` crate while walking the tree.
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// An error that occurred while building the worker thread pool.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The rewritten temporary file could not be renamed over the original.
    #[error("Tempfile error: {0}")]
    TempFile(#[from] tempfile::PathPersistError),

    /// An error related to JSON serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The path exists but is not a regular file.
    #[error("not a regular file: {}", path.display())]
    NotRegularFile { path: PathBuf },

    /// Content sniffing classified the file as binary.
    #[error("skipping non-text file: {}", path.display())]
    BinaryContent { path: PathBuf },

    /// Commit mode requires the file to live inside a repository.
    #[error(
        "{} is not in a git repository; not touching it (use --force to override)",
        path.display()
    )]
    NotARepository { path: PathBuf },

    /// Commit mode requires a clean checkout for the file.
    #[error(
        "{} has uncommitted changes; not touching it (use --force to override)",
        path.display()
    )]
    DirtyCheckout { path: PathBuf },

    /// A version-control command failed.
    #[error("`{command}` failed: {message}")]
    Vcs { command: String, message: String },

    /// The post-processing hook exited unsuccessfully.
    #[error("post-processing `{command}` failed: {message}")]
    PostProcess { command: String, message: String },

    /// A pipeline stage exited without reporting completion.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl Error {
    /// Returns `true` for the commit-mode refusals that leave a file untouched.
    pub fn is_policy_refusal(&self) -> bool {
        matches!(self, Error::NotARepository { .. } | Error::DirtyCheckout { .. })
    }
}

/// A convenient type alias for `Result<T, sweep::errors::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Config(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_refusals() {
        let refused = Error::DirtyCheckout { path: PathBuf::from("a.txt") };
        assert!(refused.is_policy_refusal());
        assert!(Error::NotARepository { path: PathBuf::from("a.txt") }.is_policy_refusal());
        assert!(!Error::from("bad").is_policy_refusal());
        assert!(refused.to_string().contains("--force"));
    }
}
