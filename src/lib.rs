//! `sweep` is a library for recursive, concurrent find-and-replace over a file tree.
//!
//! It provides the core logic for the `sweep` command-line tool but can also be
//! used as a standalone library. The main components are:
//!
//! - `TreeWalker`: depth-first traversal that skips hidden entries and applies
//!   include/exclude filters.
//! - `Matcher`: the compiled pattern, used to scan files line by line into
//!   `MatchReport`s and to compute replacements.
//! - `Replacer`: the rewrite engine, which swaps a transformed copy of a file
//!   into place atomically and, in commit mode, stages it.
//! - `Printer`: serializes match reports to a single output stream.
//! - `CommitCoordinator`: issues one commit per touched repository at the end.
//! - `Pipeline`: wires the stages together with bounded queues and shuts them
//!   down in order.
//!
//! Version control is reached through the `Repository` trait; `GitCli` is the
//! production implementation.

pub mod cli;
pub mod committer;
pub mod config;
pub mod errors;
pub mod filters;
pub mod logging;
pub mod output_formatter;
pub mod pipeline;
pub mod replacer;
pub mod scanner;
pub mod vcs;
pub mod walker;

// Re-export main types for easier access by library users.
pub use committer::CommitCoordinator;
pub use config::Settings;
pub use errors::{Error, Result};
pub use output_formatter::{OutputFormat, OutputFormatter, Printer};
pub use pipeline::{Pipeline, RunSummary};
pub use replacer::Replacer;
pub use scanner::{MatchReport, Matcher};
pub use vcs::{GitCli, Repository};
pub use walker::TreeWalker;
