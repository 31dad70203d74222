//! Logging infrastructure using the `tracing` ecosystem.
//!
//! ```text
//! init_logging(&LogConfig)
//!        |
//!        v
//!   fmt layer -> stderr (match reports own stdout)
//!   EnvFilter  (RUST_LOG overrides the CLI level)
//! ```

use crate::errors::{Error, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the logging system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    level: Level,
    ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            ansi: false,
        }
    }
}

impl LogConfig {
    /// Maps `-q` and the `-v` count to a level: quiet is `ERROR`, the
    /// default is `WARN`, and each `-v` steps down towards `TRACE`.
    pub fn from_verbosity(verbose: u8, quiet: bool, ansi: bool) -> Self {
        let level = if quiet {
            Level::ERROR
        } else {
            match verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };
        Self { level, ansi }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// The `EnvFilter` directive for this level, scoped to this crate so
    /// dependencies stay quiet.
    pub fn directive(&self) -> String {
        format!(
            "{}={}",
            env!("CARGO_CRATE_NAME"),
            self.level.to_string().to_ascii_lowercase()
        )
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))
}
