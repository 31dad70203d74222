use crate::vcs::Repository;
use flume::Receiver;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Batches "file modified" notifications into one commit per repository.
///
/// Commits are only issued once the notification queue has closed, so a
/// repository is committed at most once per run and never before the last
/// rewrite beneath it.
pub struct CommitCoordinator {
    vcs: Arc<dyn Repository>,
    enabled: bool,
    message: String,
}

/// Statistics from a coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Distinct repositories that had at least one staged file.
    pub repositories: usize,
    /// Commits that succeeded.
    pub committed: usize,
    /// Commits that failed.
    pub failed: usize,
}

impl CommitCoordinator {
    /// Creates a coordinator. With `enabled` unset it only drains its queue.
    pub fn new(vcs: Arc<dyn Repository>, enabled: bool, message: String) -> Self {
        Self {
            vcs,
            enabled,
            message,
        }
    }

    /// The commit message used for a run replacing `pattern` with `replacement`.
    pub fn message_for(pattern: &str, replacement: &str) -> String {
        format!("sweep: replaced '{pattern}' with '{replacement}'")
    }

    /// Drains `dirty` until every sender is gone, then commits each root once.
    pub fn run(self, dirty: Receiver<PathBuf>) -> CommitStats {
        let mut roots = BTreeSet::new();
        for path in dirty.iter() {
            match self.vcs.find_root(&path) {
                Some(root) => {
                    roots.insert(root);
                }
                None => warn!(path = %path.display(), "modified file has no repository root"),
            }
        }

        let mut stats = CommitStats {
            repositories: roots.len(),
            ..Default::default()
        };
        if !self.enabled {
            return stats;
        }

        for root in &roots {
            match self.vcs.commit(root, &self.message) {
                Ok(()) => {
                    info!(repo = %root.display(), "committed changes");
                    stats.committed += 1;
                }
                Err(e) => {
                    error!(repo = %root.display(), error = %e, "failed to commit changes");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}
