use crate::errors::{Error, Result};
use regex::bytes::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// How many leading bytes are sampled to classify extensionless files.
pub const SNIFF_LEN: usize = 512;

/// The compiled pattern and optional replacement shared by every worker.
///
/// Matching works on raw bytes so that lines which are not valid UTF-8 can
/// still be matched and rewritten without loss.
#[derive(Debug)]
pub struct Matcher {
    regex: Regex,
    replacement: Option<Vec<u8>>,
}

/// A single matching line inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRecord {
    /// The 1-based line number.
    pub number: u64,
    #[serde(flatten)]
    pub kind: LineMatch,
}

/// What was recorded for a matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LineMatch {
    /// Search-only mode: the line as read.
    Found { line: String },
    /// Replace mode: the line as read and the line after substitution.
    Replaced { before: String, after: String },
}

/// All matching lines of one file, in ascending line order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub path: PathBuf,
    pub lines: Vec<LineRecord>,
}

impl MatchReport {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Matcher {
    /// Compiles `pattern` and decides whether a replacement is in effect.
    ///
    /// An empty replacement means "no replacement" unless `replace_empty`
    /// is set, in which case matches are replaced with nothing.
    pub fn new(pattern: &str, replacement: Option<&str>, replace_empty: bool) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::Config("pattern must not be empty".to_string()));
        }
        let regex = Regex::new(pattern)?;
        let replacement = match replacement.unwrap_or_default() {
            "" if !replace_empty => None,
            r => Some(r.as_bytes().to_vec()),
        };
        Ok(Self { regex, replacement })
    }

    /// Returns `true` if a replacement is in effect for this run.
    pub fn replaces(&self) -> bool {
        self.replacement.is_some()
    }

    pub fn is_match(&self, line: &[u8]) -> bool {
        self.regex.is_match(line)
    }

    /// The byte ranges of every non-overlapping match in `line`.
    pub fn find_spans(&self, line: &[u8]) -> Vec<(usize, usize)> {
        self.regex.find_iter(line).map(|m| (m.start(), m.end())).collect()
    }

    /// Substitutes every non-overlapping match in `line`.
    ///
    /// Capture group references (`$1`, `${name}`) in the replacement are
    /// expanded. Without a replacement the line is returned unchanged.
    pub fn replace_line<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        match &self.replacement {
            Some(replacement) => self.regex.replace_all(line, replacement.as_slice()),
            None => Cow::Borrowed(line),
        }
    }

    /// Scans `reader` line by line and records every matching line.
    ///
    /// Line numbers count every line, matching or not.
    pub fn scan<R: BufRead>(&self, mut reader: R) -> io::Result<Vec<LineRecord>> {
        let mut records = Vec::new();
        let mut buf = Vec::new();
        let mut number = 0u64;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            number += 1;
            let (line, _) = split_terminator(&buf);
            if !self.is_match(line) {
                continue;
            }
            let kind = if self.replaces() {
                LineMatch::Replaced {
                    before: String::from_utf8_lossy(line).into_owned(),
                    after: String::from_utf8_lossy(&self.replace_line(line)).into_owned(),
                }
            } else {
                LineMatch::Found {
                    line: String::from_utf8_lossy(line).into_owned(),
                }
            };
            records.push(LineRecord { number, kind });
        }
        Ok(records)
    }

    /// Opens and scans a single file.
    ///
    /// Non-regular files and files classified as binary are rejected with
    /// [`Error::NotRegularFile`] and [`Error::BinaryContent`].
    pub fn scan_file(&self, path: &Path) -> Result<MatchReport> {
        let mut file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(Error::NotRegularFile {
                path: path.to_path_buf(),
            });
        }
        if !is_text(path, &mut file)? {
            return Err(Error::BinaryContent {
                path: path.to_path_buf(),
            });
        }
        let lines = self.scan(BufReader::new(file))?;
        Ok(MatchReport {
            path: path.to_path_buf(),
            lines,
        })
    }
}

/// Splits a raw line into its content and its terminator (`\n`, `\r\n` or none).
pub fn split_terminator(raw: &[u8]) -> (&[u8], &[u8]) {
    let content_len = if raw.ends_with(b"\r\n") {
        raw.len() - 2
    } else if raw.ends_with(b"\n") {
        raw.len() - 1
    } else {
        raw.len()
    };
    raw.split_at(content_len)
}

/// Classifies a file as text or binary.
///
/// A file with an extension is assumed to be text without reading it. For
/// other files the first [`SNIFF_LEN`] bytes are sampled and the read
/// position is restored afterwards.
pub fn is_text<R: Read + Seek>(path: &Path, reader: &mut R) -> io::Result<bool> {
    if path.extension().is_some() {
        return Ok(true);
    }
    let mut sample = Vec::with_capacity(SNIFF_LEN);
    reader.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut sample)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(looks_like_text(&sample))
}

/// No NUL bytes and valid UTF-8, tolerating a sequence cut off by the sample.
fn looks_like_text(sample: &[u8]) -> bool {
    if sample.contains(&0) {
        return false;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
