//! Version-control capability used by the commit safety net.
//!
//! ```text
//! Replacer / CommitCoordinator --> dyn Repository --> GitCli --> git (serialized)
//! ```
//!
//! Every query fails closed: if `git` cannot be run, a path is reported as
//! "not a repository" or "not clean", never as safe to touch.

use crate::errors::{Error, Result};
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// How many directories, starting at the path itself, are inspected when
/// looking for a repository root.
pub const MAX_ANCESTOR_DEPTH: usize = 10;

/// The name of the metadata directory that marks a repository root.
pub const METADATA_DIR: &str = ".git";

/// The operations the pipeline needs from a version-control system.
///
/// Implementations must be safe to call from many workers at once.
pub trait Repository: Send + Sync {
    /// Is `path` inside a version-controlled tree?
    fn is_repository(&self, path: &Path) -> bool {
        self.find_root(path).is_some()
    }

    /// The nearest ancestor of `path` holding the metadata directory.
    fn find_root(&self, path: &Path) -> Option<PathBuf>;

    /// `true` only if the status report for `path` is empty.
    fn is_clean(&self, path: &Path) -> bool;

    /// Records the current state of `path` in its repository's index.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not in a repository or staging fails.
    fn stage(&self, path: &Path) -> Result<()>;

    /// Creates a commit on the current branch of the repository at `root`.
    fn commit(&self, root: &Path, message: &str) -> Result<()>;
}

/// [`Repository`] backed by the `git` command line.
///
/// All invocations are serialized through an internal lock so that no two
/// `git` processes race on the same index.
pub struct GitCli {
    lock: Mutex<()>,
    max_depth: usize,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_ANCESTOR_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            lock: Mutex::new(()),
            max_depth,
        }
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        // Guards no data; a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `git` in `cwd` and returns its trimmed stdout.
    fn git_command(args: &[&str], cwd: &Path) -> Result<String> {
        let command = format!("git {}", args.join(" "));
        debug!(cwd = %cwd.display(), "{command}");
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| Error::Vcs {
                command: command.clone(),
                message: format!("failed to execute git: {e}"),
            })?;

        if !output.status.success() {
            return Err(Error::Vcs {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Repository for GitCli {
    fn find_root(&self, path: &Path) -> Option<PathBuf> {
        find_root_within(path, self.max_depth)
    }

    fn is_clean(&self, path: &Path) -> bool {
        let _guard = self.serialize();
        let Some(root) = self.find_root(path) else {
            return false;
        };
        let status = relative_arg(path, &root).and_then(|target| {
            Self::git_command(&["status", "--porcelain", "--", &target], &root)
        });
        match status {
            Ok(status) => status.is_empty(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to check git status");
                false
            }
        }
    }

    fn stage(&self, path: &Path) -> Result<()> {
        let _guard = self.serialize();
        let root = self.find_root(path).ok_or_else(|| Error::NotARepository {
            path: path.to_path_buf(),
        })?;
        let target = relative_arg(path, &root)?;
        Self::git_command(&["add", "--all", "--", &target], &root)?;
        Ok(())
    }

    fn commit(&self, root: &Path, message: &str) -> Result<()> {
        let _guard = self.serialize();
        if self.find_root(root).is_none() {
            return Err(Error::NotARepository {
                path: root.to_path_buf(),
            });
        }
        Self::git_command(&["commit", "--quiet", "-m", message], root)?;
        Ok(())
    }
}

/// Searches `path` and its ancestors, `max_depth` directories in total, for
/// the metadata directory. The filesystem root itself is never considered.
pub fn find_root_within(path: &Path, max_depth: usize) -> Option<PathBuf> {
    let absolute = absolute_clean(path).ok()?;
    absolute
        .ancestors()
        .take(max_depth)
        .take_while(|dir| dir.parent().is_some())
        .find(|dir| dir.join(METADATA_DIR).exists())
        .map(Path::to_path_buf)
}

/// `path` made absolute with `.` and `..` folded away lexically.
///
/// Symlinks are not resolved, so the result stays comparable with paths the
/// walker produces.
pub fn absolute_clean(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

/// `path` relative to `root`, as an argument for `git`.
fn relative_arg(path: &Path, root: &Path) -> Result<String> {
    let absolute = absolute_clean(path)?;
    let relative = absolute.strip_prefix(root).unwrap_or(&absolute);
    match relative.to_str() {
        Some("") => Ok(".".to_string()),
        Some(s) => Ok(s.to_string()),
        None => Err(Error::Vcs {
            command: "git".to_string(),
            message: format!("path is not valid UTF-8: {}", path.display()),
        }),
    }
}
