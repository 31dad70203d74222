use crate::cli::Args;
use crate::committer::CommitCoordinator;
use crate::errors::{Error, Result};
use crate::output_formatter::OutputFormat;
use crate::replacer::PostProcess;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Directory under the home directory searched for config files.
const HOME_CONFIG_DIR: &str = ".sweep";

/// Optional defaults loaded from a YAML file.
///
/// ```yaml
/// include: ['*.go']
/// exclude: [vendor, testdata]
/// workers: 8
/// post_proc: gofmt -w
/// sort: true
/// format: text
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub workers: Option<usize>,
    pub post_proc: Option<String>,
    pub sort: Option<bool>,
    pub format: Option<OutputFormat>,
}

/// The fully resolved configuration of one run.
///
/// Built once at startup and shared read-only by every pipeline stage.
#[derive(Debug, Clone)]
pub struct Settings {
    pub pattern: String,
    pub replacement: Option<String>,
    pub root: PathBuf,
    pub workers: usize,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub dry_run: bool,
    pub commit: bool,
    pub force: bool,
    pub post_process: Option<PostProcess>,
    pub sort: bool,
    pub replace_empty: bool,
    pub color: bool,
    pub format: OutputFormat,
}

impl Settings {
    /// Search-only settings for `pattern` under `root`, everything else default.
    pub fn new(pattern: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: None,
            root: root.into(),
            workers: Self::default_workers(),
            includes: Vec::new(),
            excludes: Vec::new(),
            dry_run: false,
            commit: false,
            force: false,
            post_process: None,
            sort: false,
            replace_empty: false,
            color: false,
            format: OutputFormat::Text,
        }
    }

    /// Twice the number of logical CPUs: workers spend much of their time
    /// blocked on I/O.
    pub fn default_workers() -> usize {
        num_cpus::get() * 2
    }

    /// Merges command-line arguments over an optional config file.
    ///
    /// Scalar options from the command line win; include and exclude lists
    /// are concatenated with the file's entries first.
    pub fn from_args(args: &Args, file: FileConfig) -> Result<Self> {
        let mut includes = file.include;
        includes.extend(args.includes.iter().cloned());
        let mut excludes = file.exclude;
        excludes.extend(args.excludes.iter().cloned());

        let post_proc = args.post_proc.clone().or(file.post_proc);
        let color = args.color.enabled_for(&std::io::stdout());

        let settings = Self {
            pattern: args.pattern.clone(),
            replacement: args.replacement.clone(),
            root: args.dir.clone(),
            workers: args
                .workers
                .map(|w| w as usize)
                .or(file.workers)
                .unwrap_or_else(Self::default_workers),
            includes,
            excludes,
            dry_run: args.dry_run,
            commit: args.commit,
            force: args.force,
            post_process: post_proc.as_deref().and_then(PostProcess::parse),
            sort: args.sort || file.sort.unwrap_or(false),
            replace_empty: args.replace_empty,
            color,
            format: args.format.or(file.format).unwrap_or_default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects configurations that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(Error::Config("pattern must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The commit message for this run.
    pub fn commit_message(&self) -> String {
        CommitCoordinator::message_for(
            &self.pattern,
            self.replacement.as_deref().unwrap_or_default(),
        )
    }
}

/// A utility for locating and loading config files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Finds the configuration file by searching in a prioritized list of locations.
    ///
    /// The search order is:
    /// 1. The absolute path provided in `config_path`, if it exists.
    /// 2. A path relative to the current directory.
    /// 3. A path relative to the `working_dir`.
    /// 4. Inside the `~/.sweep` directory.
    pub fn find_config(config_path: &Path, working_dir: &Path) -> Result<PathBuf> {
        if config_path.is_absolute() && config_path.exists() {
            return Ok(config_path.to_path_buf());
        }
        if config_path.exists() {
            return Ok(config_path.to_path_buf());
        }

        let mut candidates = vec![working_dir.join(config_path)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(HOME_CONFIG_DIR).join(config_path));
        }
        if let Some(found) = candidates.iter().find(|c| c.exists()) {
            return Ok(found.clone());
        }

        let cwd = env::current_dir().unwrap_or_default();
        let mut tried = vec![cwd.join(config_path).display().to_string()];
        tried.extend(candidates.iter().map(|c| c.display().to_string()));
        Err(format!(
            "Config file '{}' not found. Searched in:\n  - {}",
            config_path.display(),
            tried.join("\n  - ")
        )
        .into())
    }

    /// Loads a `FileConfig` from a YAML file.
    pub fn load(path: &Path) -> Result<FileConfig> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}
