//! The concurrent find-and-replace pipeline.
//!
//! ```text
//!               files             reports
//! TreeWalker ---------> Worker xN ---------> Printer
//! (this thread)   |          |
//!                 |          | dirty         CommitCoordinator
//!                 |          +-------------> (one commit per repo)
//! ```
//!
//! Shutdown runs strictly in stage order: the file queue closes once the
//! walk returns; the report queue closes once every worker has reported
//! done; the dirty queue closes once the printer has reported done. The run
//! returns after the coordinator reports done. No queue is ever closed while
//! a producer may still write to it, and commits only happen after every
//! rewrite of the run has been attempted.

use crate::committer::{CommitCoordinator, CommitStats};
use crate::config::Settings;
use crate::errors::{Error, Result};
use crate::filters::FilterSet;
use crate::output_formatter::{OutputFormatter, PrintMode, Printer};
use crate::replacer::{Replacer, RewriteOptions, RewriteOutcome};
use crate::scanner::{MatchReport, Matcher};
use crate::vcs::Repository;
use crate::walker::TreeWalker;
use flume::{Receiver, Sender};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

/// Capacity of every inter-stage queue.
pub const QUEUE_CAPACITY: usize = 1000;

/// Per-run counters shared by the workers.
#[derive(Debug, Default)]
struct Counters {
    scanned: AtomicUsize,
    skipped: AtomicUsize,
    matched: AtomicUsize,
    rewritten: AtomicUsize,
    refused: AtomicUsize,
    failed: AtomicUsize,
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidate files emitted by the walker.
    pub walked: usize,
    /// Files that were read to the end.
    pub scanned: usize,
    /// Files skipped before scanning (unreadable, not regular, binary).
    pub skipped: usize,
    /// Files with at least one matching line.
    pub matched: usize,
    /// Files whose new content is in place.
    pub rewritten: usize,
    /// Files left untouched by the commit-mode safety checks.
    pub refused: usize,
    /// Files whose rewrite failed.
    pub failed: usize,
    /// Match reports written by the printer.
    pub printed: usize,
    pub commits: CommitStats,
}

/// A configured run, ready to execute.
pub struct Pipeline {
    settings: Arc<Settings>,
    matcher: Arc<Matcher>,
    vcs: Arc<dyn Repository>,
}

impl Pipeline {
    /// Validates `settings` and compiles the pattern.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or invalid pattern or zero workers.
    pub fn new(settings: Settings, vcs: Arc<dyn Repository>) -> Result<Self> {
        settings.validate()?;
        let matcher = Matcher::new(
            &settings.pattern,
            settings.replacement.as_deref(),
            settings.replace_empty,
        )?;
        Ok(Self {
            settings: Arc::new(settings),
            matcher: Arc::new(matcher),
            vcs,
        })
    }

    /// Runs the whole pipeline, writing match reports to `out`.
    ///
    /// Per-file and per-repository failures are logged and counted; only a
    /// traversal failure is returned as an error, and only after every
    /// stage has shut down.
    pub fn run<W>(&self, out: W) -> Result<(RunSummary, W)>
    where
        W: Write + Send + 'static,
    {
        let settings = &self.settings;
        let workers = settings.workers;

        let (file_tx, file_rx) = flume::bounded::<PathBuf>(QUEUE_CAPACITY);
        let (report_tx, report_rx) = flume::bounded::<MatchReport>(QUEUE_CAPACITY);
        let (dirty_tx, dirty_rx) = flume::bounded::<PathBuf>(QUEUE_CAPACITY);
        let (worker_done_tx, worker_done_rx) = flume::bounded::<()>(workers);
        let (printer_done_tx, printer_done_rx) = flume::bounded::<()>(1);
        let (committer_done_tx, committer_done_rx) = flume::bounded::<()>(1);

        let counters = Arc::new(Counters::default());
        let cancelled = Arc::new(AtomicBool::new(false));
        let replacer = Arc::new(Replacer::new(
            self.matcher.clone(),
            self.vcs.clone(),
            RewriteOptions {
                commit: settings.commit,
                force: settings.force,
                post_process: settings.post_process.clone(),
            },
        ));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sweep-worker-{i}"))
            .build()?;
        for _ in 0..workers {
            let worker = Worker {
                files: file_rx.clone(),
                reports: report_tx.clone(),
                dirty: dirty_tx.clone(),
                matcher: self.matcher.clone(),
                replacer: replacer.clone(),
                rewrite: !settings.dry_run && self.matcher.replaces(),
                counters: counters.clone(),
                cancelled: cancelled.clone(),
            };
            let done = worker_done_tx.clone();
            pool.spawn(move || {
                worker.run();
                let _ = done.send(());
            });
        }
        drop(file_rx);
        drop(worker_done_tx);

        let mode = if settings.sort {
            PrintMode::Sorted
        } else {
            PrintMode::Streaming
        };
        let formatter = OutputFormatter::new(settings.format, settings.color, self.matcher.clone());
        let printer = Printer::new(settings.root.clone(), mode, formatter, out);
        let printer_handle = thread::Builder::new()
            .name("sweep-printer".to_string())
            .spawn(move || {
                let result = printer.run(report_rx);
                let _ = printer_done_tx.send(());
                result
            })?;

        let coordinator = CommitCoordinator::new(
            self.vcs.clone(),
            settings.commit,
            settings.commit_message(),
        );
        let committer_handle = thread::Builder::new()
            .name("sweep-committer".to_string())
            .spawn(move || {
                let stats = coordinator.run(dirty_rx);
                let _ = committer_done_tx.send(());
                stats
            })?;

        let walker = TreeWalker::new(
            settings.root.clone(),
            FilterSet::new(&settings.includes, &settings.excludes),
        );
        let walked = walker.walk(|path| file_tx.send(path).is_ok());
        if let Err(e) = &walked {
            error!(
                root = %settings.root.display(),
                error = %e,
                "traversal failed, draining queued files"
            );
            cancelled.store(true, Ordering::SeqCst);
        }
        drop(file_tx);

        await_tokens(&worker_done_rx, workers, "worker")?;
        drop(report_tx);
        await_tokens(&printer_done_rx, 1, "printer")?;
        drop(dirty_tx);
        await_tokens(&committer_done_rx, 1, "commit coordinator")?;

        let printed = printer_handle
            .join()
            .map_err(|_| Error::Pipeline("printer panicked".to_string()))?;
        let commits = committer_handle
            .join()
            .map_err(|_| Error::Pipeline("commit coordinator panicked".to_string()))?;

        let walked = walked?;
        let (printed, out) = printed?;
        let summary = RunSummary {
            walked,
            scanned: counters.scanned.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            matched: counters.matched.load(Ordering::Relaxed),
            rewritten: counters.rewritten.load(Ordering::Relaxed),
            refused: counters.refused.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            printed,
            commits,
        };
        info!(
            walked = summary.walked,
            matched = summary.matched,
            rewritten = summary.rewritten,
            refused = summary.refused,
            failed = summary.failed,
            commits = summary.commits.committed,
            "run complete"
        );
        Ok((summary, out))
    }
}

/// Blocks until `count` completion tokens have arrived for `stage`.
fn await_tokens(done: &Receiver<()>, count: usize, stage: &str) -> Result<()> {
    for _ in 0..count {
        done.recv()
            .map_err(|_| Error::Pipeline(format!("{stage} exited without completing")))?;
    }
    debug!(stage, count, "stage finished");
    Ok(())
}

/// One member of the worker pool.
struct Worker {
    files: Receiver<PathBuf>,
    reports: Sender<MatchReport>,
    dirty: Sender<PathBuf>,
    matcher: Arc<Matcher>,
    replacer: Arc<Replacer>,
    rewrite: bool,
    counters: Arc<Counters>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    /// Processes files until the queue is closed and drained.
    fn run(self) {
        for path in self.files.iter() {
            if self.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            self.process(path);
        }
    }

    fn process(&self, path: PathBuf) {
        let report = match self.matcher.scan_file(&path) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        self.counters.scanned.fetch_add(1, Ordering::Relaxed);
        if report.is_empty() {
            return;
        }
        self.counters.matched.fetch_add(1, Ordering::Relaxed);

        if self.rewrite {
            match self.replacer.rewrite(&path) {
                Ok(outcome) => {
                    self.counters.rewritten.fetch_add(1, Ordering::Relaxed);
                    if outcome == RewriteOutcome::Staged && self.dirty.send(path.clone()).is_err() {
                        warn!(
                            path = %path.display(),
                            "commit coordinator is gone, change will not be committed"
                        );
                    }
                }
                Err(e) if e.is_policy_refusal() => {
                    warn!(path = %path.display(), error = %e, "not rewriting file");
                    self.counters.refused.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to rewrite file");
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if self.reports.send(report).is_err() {
            debug!(path = %path.display(), "printer is gone, dropping report");
        }
    }
}
