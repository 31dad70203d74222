//! The main entry point for the `sweep` command-line application.
//!
//! This file is responsible for parsing command-line arguments, resolving the
//! run configuration, and handing it to the `sweep` pipeline.

use anyhow::Context;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use sweep::cli;
use sweep::config::{ConfigLoader, FileConfig, Settings};
use sweep::logging::{LogConfig, init_logging};
use sweep::{GitCli, Pipeline};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = cli::parse_args();

    let file_config = match &args.config {
        Some(path) => {
            let resolved = ConfigLoader::find_config(path, &args.dir)?;
            ConfigLoader::load(&resolved)
                .with_context(|| format!("failed to load config file {}", resolved.display()))?
        }
        None => FileConfig::default(),
    };
    let settings = Settings::from_args(&args, file_config)?;

    // Reports go to stdout and logs to stderr; each stream decides its own colors.
    colored::control::set_override(settings.color);
    let log_ansi = args.color.enabled_for(&io::stderr());
    init_logging(&LogConfig::from_verbosity(args.verbose, args.quiet, log_ansi))?;

    let root = settings.root.clone();
    let pipeline = Pipeline::new(settings, Arc::new(GitCli::new()))?;
    pipeline
        .run(io::stdout())
        .with_context(|| format!("failed to process {}", root.display()))?;
    Ok(())
}
