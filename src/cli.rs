use crate::output_formatter::OutputFormat;
use clap::{ArgAction, Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Recursive find-and-replace with an opt-in git safety net.
///
/// `sweep` walks a directory tree, prints every line matching a regular
/// expression, and optionally rewrites the matches in place. With
/// `--commit` it only touches files in clean git checkouts and commits
/// each touched repository once at the end.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Recursive, concurrent find-and-replace",
    long_about = "sweep - search a tree for a regex and optionally replace it.

QUICK EXAMPLES:
  sweep 'TODO\\(\\w+\\)'                      # Search the current directory
  sweep 'old_name' 'new_name' --dry-run      # Preview a rename
  sweep 'v(\\d+)' 'version $1' --include '*.md'
  sweep 'foo' 'bar' --commit --post-proc 'gofmt -w'"
)]
pub struct Args {
    /// The regular expression to search for.
    pub pattern: String,

    /// The replacement text. May reference capture groups (`$1`, `${name}`).
    pub replacement: Option<String>,

    /// The directory to start in.
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// The number of parallel worker threads. Defaults to twice the number of logical CPUs.
    #[arg(short, long, env = "SWEEP_WORKERS", value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: Option<u32>,

    /// Only process files whose name matches this glob or contains this text. Repeatable.
    #[arg(long = "include", value_name = "GLOB")]
    pub includes: Vec<String>,

    /// Skip paths matching this glob or containing this text. Repeatable.
    #[arg(long = "exclude", value_name = "GLOB")]
    pub excludes: Vec<String>,

    /// Report matches without modifying any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Require clean git checkouts and commit each touched repository once.
    #[arg(long)]
    pub commit: bool,

    /// Rewrite even outside a repository or in a dirty checkout when `--commit` is set.
    #[arg(long)]
    pub force: bool,

    /// A command run on each rewritten temp file before it replaces the original.
    #[arg(long = "post-proc", value_name = "COMMAND")]
    pub post_proc: Option<String>,

    /// Print results sorted by path instead of as they are found.
    #[arg(long)]
    pub sort: bool,

    /// Allow replacing matches with an empty string.
    #[arg(long)]
    pub replace_empty: bool,

    /// The output format for match reports.
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// When to color the output.
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a YAML file with default options.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// When to emit ANSI colors.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorChoice {
    /// Color when standard output is a terminal.
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    /// Resolves the choice for one output stream; `Auto` colors terminals only.
    pub fn enabled_for<S: IsTerminal>(self, stream: &S) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => stream.is_terminal(),
        }
    }
}

/// Parses command-line arguments and returns the populated `Args` struct.
pub fn parse_args() -> Args {
    Args::parse()
}
