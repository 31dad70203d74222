use crate::errors::{Error, Result};
use crate::scanner::{Matcher, split_terminator};
use crate::vcs::Repository;
use std::fs::{self, File, Permissions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::Builder;
use tracing::{debug, warn};

/// Suffix of the hidden sibling that holds a file's rewritten content.
pub const TEMP_SUFFIX: &str = ".sweep";

/// An external command run on each rewritten temp file before it is swapped in.
///
/// The command line is split on whitespace and the temp file path is
/// appended as the final argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcess {
    program: String,
    args: Vec<String>,
}

impl PostProcess {
    /// Parses a command line such as `gofmt -w`. Returns `None` if it is blank.
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Runs the command on `path`. A non-zero exit is an error carrying the
    /// command's combined output.
    pub fn run(&self, path: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()?;
        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stdout).into_owned();
            message.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::PostProcess {
                command: format!("{} {}", self.program, self.args.join(" ")).trim().to_string(),
                message: format!("{}: {}", output.status, message.trim()),
            });
        }
        Ok(())
    }
}

/// Options controlling how the [`Replacer`] treats each file.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Require a clean checkout and stage every rewrite.
    pub commit: bool,
    /// Skip the repository and clean-checkout checks.
    pub force: bool,
    /// Optional formatter-style hook run on the temp file.
    pub post_process: Option<PostProcess>,
}

/// What happened to a rewritten file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The new content is in place; nothing was staged.
    Written,
    /// The new content is in place and staged in its repository.
    Staged,
}

/// The rewrite engine: replaces a file's content with a transformed copy.
///
/// The copy is built in a hidden sibling and renamed over the original, so
/// a reader sees either the old or the new content, never a partial file.
pub struct Replacer {
    matcher: Arc<Matcher>,
    vcs: Arc<dyn Repository>,
    options: RewriteOptions,
}

impl Replacer {
    pub fn new(matcher: Arc<Matcher>, vcs: Arc<dyn Repository>, options: RewriteOptions) -> Self {
        Self {
            matcher,
            vcs,
            options,
        }
    }

    /// Rewrites `path`, applying the substitution to every matching line.
    ///
    /// The process is as follows:
    /// 1. In commit mode, refuse files outside a repository or in a dirty
    ///    checkout unless forced.
    /// 2. Stream the original into a hidden sibling with the same mode.
    /// 3. Run the post-process hook, if any. Its failure is only logged.
    /// 4. Rename the sibling over the original.
    /// 5. In commit mode, stage the file.
    pub fn rewrite(&self, path: &Path) -> Result<RewriteOutcome> {
        let in_repository = self.check_policy(path)?;

        let original = File::open(path)?;
        let permissions = file_permissions(path);
        let parent = parent_dir(path);
        let prefix = temp_prefix(path);
        let temp_file = Builder::new()
            .prefix(&prefix)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)?;

        {
            let mut reader = BufReader::new(original);
            let mut writer = BufWriter::new(temp_file.as_file());
            self.transform(&mut reader, &mut writer)?;
            writer.flush()?;
        }
        if let Some(permissions) = permissions {
            fs::set_permissions(temp_file.path(), permissions)?;
        }
        let temp_path = temp_file.into_temp_path();

        if let Some(hook) = &self.options.post_process {
            if let Err(e) = hook.run(&temp_path) {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "post-processing failed, keeping rewritten content"
                );
            }
        }

        temp_path.persist(path)?;
        debug!(path = %path.display(), "rewrote file");

        if !self.options.commit {
            return Ok(RewriteOutcome::Written);
        }
        if !in_repository {
            warn!(path = %path.display(), "rewritten outside any repository, not staging");
            return Ok(RewriteOutcome::Written);
        }
        self.vcs.stage(path)?;
        Ok(RewriteOutcome::Staged)
    }

    /// Applies the commit-mode checks. Returns whether `path` is in a repository.
    fn check_policy(&self, path: &Path) -> Result<bool> {
        if !self.options.commit {
            return Ok(false);
        }
        let in_repository = self.vcs.is_repository(path);
        if self.options.force {
            if !in_repository {
                warn!(path = %path.display(), "forcing rewrite outside a repository");
            }
            return Ok(in_repository);
        }
        if !in_repository {
            return Err(Error::NotARepository {
                path: path.to_path_buf(),
            });
        }
        if !self.vcs.is_clean(path) {
            return Err(Error::DirtyCheckout {
                path: path.to_path_buf(),
            });
        }
        Ok(true)
    }

    /// Copies `reader` to `writer`, substituting on matching lines and
    /// keeping every line terminator as it was.
    fn transform<R: BufRead, W: Write>(&self, reader: &mut R, writer: &mut W) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let (line, terminator) = split_terminator(&buf);
            if self.matcher.is_match(line) {
                writer.write_all(&self.matcher.replace_line(line))?;
            } else {
                writer.write_all(line)?;
            }
            writer.write_all(terminator)?;
        }
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `.name.` so the temp file is a hidden sibling named after the original.
fn temp_prefix(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{name}.")
}

/// The original's permissions, or a default when they cannot be read.
fn file_permissions(path: &Path) -> Option<Permissions> {
    fs::metadata(path)
        .map(|metadata| metadata.permissions())
        .ok()
        .or_else(default_permissions)
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory repository: every path under `root` is tracked, `dirty`
    /// paths report changes, and staging is recorded.
    struct FakeRepo {
        root: PathBuf,
        dirty: HashSet<PathBuf>,
        staged: Mutex<Vec<PathBuf>>,
    }

    impl FakeRepo {
        fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                dirty: HashSet::new(),
                staged: Mutex::new(Vec::new()),
            }
        }
    }

    impl Repository for FakeRepo {
        fn find_root(&self, path: &Path) -> Option<PathBuf> {
            path.starts_with(&self.root).then(|| self.root.clone())
        }
        fn is_clean(&self, path: &Path) -> bool {
            !self.dirty.contains(path)
        }
        fn stage(&self, path: &Path) -> Result<()> {
            self.staged.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
        fn commit(&self, _root: &Path, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    fn replacer(repo: Arc<FakeRepo>, options: RewriteOptions) -> Replacer {
        let matcher = Arc::new(Matcher::new("foo", Some("bar"), false).unwrap());
        Replacer::new(matcher, repo, options)
    }

    #[test]
    fn test_rewrite_only_touches_matching_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "one\r\ntwo\nxfoox\nfoo foo").unwrap();

        let repo = Arc::new(FakeRepo::new(temp_dir.path()));
        let outcome = replacer(repo, RewriteOptions::default()).rewrite(&path).unwrap();

        assert_eq!(outcome, RewriteOutcome::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\r\ntwo\nxbarx\nbar bar");
    }

    #[test]
    fn test_no_temp_file_is_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "foo\n").unwrap();

        let repo = Arc::new(FakeRepo::new(temp_dir.path()));
        replacer(repo, RewriteOptions::default()).rewrite(&path).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_is_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.sh");
        fs::write(&path, "echo foo\n").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o751)).unwrap();

        let repo = Arc::new(FakeRepo::new(temp_dir.path()));
        replacer(repo, RewriteOptions::default()).rewrite(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o751);
        assert_eq!(fs::read_to_string(&path).unwrap(), "echo bar\n");
    }

    #[test]
    fn test_dirty_checkout_is_refused_unless_forced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "foo\n").unwrap();

        let mut repo = FakeRepo::new(temp_dir.path());
        repo.dirty.insert(path.clone());
        let repo = Arc::new(repo);

        let options = RewriteOptions {
            commit: true,
            ..Default::default()
        };
        let err = replacer(repo.clone(), options.clone()).rewrite(&path).unwrap_err();
        assert!(matches!(err, Error::DirtyCheckout { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo\n");
        assert!(repo.staged.lock().unwrap().is_empty());

        let forced = RewriteOptions {
            force: true,
            ..options
        };
        let outcome = replacer(repo.clone(), forced).rewrite(&path).unwrap();
        assert_eq!(outcome, RewriteOutcome::Staged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "bar\n");
        assert_eq!(*repo.staged.lock().unwrap(), vec![path]);
    }

    #[test]
    fn test_outside_repository_is_refused_unless_forced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "foo\n").unwrap();
        let repo = Arc::new(FakeRepo::new(&temp_dir.path().join("elsewhere")));

        let options = RewriteOptions {
            commit: true,
            ..Default::default()
        };
        let err = replacer(repo.clone(), options.clone()).rewrite(&path).unwrap_err();
        assert!(err.is_policy_refusal());
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo\n");

        let forced = RewriteOptions {
            force: true,
            ..options
        };
        let outcome = replacer(repo.clone(), forced).rewrite(&path).unwrap();
        assert_eq!(outcome, RewriteOutcome::Written);
        assert!(repo.staged.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_post_process_keeps_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "foo\n").unwrap();

        let repo = Arc::new(FakeRepo::new(temp_dir.path()));
        let options = RewriteOptions {
            post_process: PostProcess::parse("false"),
            ..Default::default()
        };
        replacer(repo, options).rewrite(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "bar\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_post_process_output_is_swapped_in() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        let formatted = temp_dir.path().join("formatted.txt");
        fs::write(&path, "foo\n").unwrap();
        fs::write(&formatted, "formatted\n").unwrap();

        // `cp <formatted> <temp>` stands in for an in-place formatter.
        let repo = Arc::new(FakeRepo::new(temp_dir.path()));
        let options = RewriteOptions {
            post_process: PostProcess::parse(&format!("cp {}", formatted.display())),
            ..Default::default()
        };
        replacer(repo, options).rewrite(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "formatted\n");
    }

    #[test]
    fn test_post_process_parsing() {
        assert_eq!(PostProcess::parse("   "), None);
        let hook = PostProcess::parse("gofmt  -w").unwrap();
        assert_eq!(hook.program, "gofmt");
        assert_eq!(hook.args, vec!["-w".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_concurrent_reader_never_sees_partial_content() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.txt");
        let with_foo: String = (0..5000).map(|i| format!("line {i} foo\n")).collect();
        let with_bar = with_foo.replace("foo", "bar");
        fs::write(&path, &with_foo).unwrap();

        let repo = Arc::new(FakeRepo::new(temp_dir.path()));
        let forward = replacer(repo.clone(), RewriteOptions::default());
        let back = Replacer::new(
            Arc::new(Matcher::new("bar", Some("foo"), false).unwrap()),
            repo,
            RewriteOptions::default(),
        );

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let done = done.clone();
            let path = path.clone();
            let (old, new) = (with_foo.clone(), with_bar.clone());
            thread::spawn(move || {
                let mut reads = 0usize;
                loop {
                    let seen = fs::read_to_string(&path).unwrap();
                    assert!(seen == old || seen == new, "partial content after {reads} reads");
                    reads += 1;
                    if done.load(Ordering::SeqCst) {
                        return reads;
                    }
                }
            })
        };

        for _ in 0..25 {
            forward.rewrite(&path).unwrap();
            back.rewrite(&path).unwrap();
        }
        done.store(true, Ordering::SeqCst);

        assert!(reader.join().unwrap() > 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), with_foo);
    }

    #[test]
    fn test_temp_name_is_hidden_sibling() {
        assert_eq!(temp_prefix(Path::new("src/main.rs")), ".main.rs.");
        assert_eq!(parent_dir(Path::new("main.rs")), PathBuf::from("."));
    }
}
