use crate::errors::Result;
use crate::scanner::{LineMatch, MatchReport, Matcher};
use colored::Colorize;
use flume::Receiver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Defines the possible output formats for match reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// A human-readable block per file.
    #[default]
    Text,
    /// One JSON object per file, one per line.
    Json,
}

/// Formats a single [`MatchReport`] into its printable form.
pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
    matcher: Arc<Matcher>,
}

impl OutputFormatter {
    /// Creates a new `OutputFormatter`.
    ///
    /// # Arguments
    ///
    /// * `format` - The `OutputFormat` to use.
    /// * `color` - Whether to emit ANSI colors. Decided once at startup.
    /// * `matcher` - Used to highlight the matched text in each line.
    pub fn new(format: OutputFormat, color: bool, matcher: Arc<Matcher>) -> Self {
        Self {
            format,
            color,
            matcher,
        }
    }

    /// Formats `report` with its path shown as `display_path`.
    pub fn format_report(&self, display_path: &str, report: &MatchReport) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(self.format_text(display_path, report)),
            OutputFormat::Json => self.format_json(display_path, report),
        }
    }

    fn format_text(&self, display_path: &str, report: &MatchReport) -> String {
        let mut output = String::new();
        output.push_str(&self.paint(display_path, Paint::Path));
        output.push('\n');

        for record in &report.lines {
            let number = self.paint(&record.number.to_string(), Paint::LineNumber);
            match &record.kind {
                LineMatch::Found { line } => {
                    output.push_str(&format!("{number}: {}\n", self.highlight(line)));
                }
                LineMatch::Replaced { before, after } => {
                    output.push_str(&format!("{number}:\n"));
                    output.push_str(&format!(
                        "{}{}\n",
                        self.paint("-", Paint::Removed),
                        self.highlight(before)
                    ));
                    output.push_str(&format!(
                        "{}{}\n",
                        self.paint("+", Paint::Added),
                        self.paint(after, Paint::Added)
                    ));
                }
            }
        }
        output.push('\n');
        output
    }

    fn format_json(&self, display_path: &str, report: &MatchReport) -> Result<String> {
        #[derive(Serialize)]
        struct JsonReport<'a> {
            path: &'a str,
            lines: &'a [crate::scanner::LineRecord],
        }

        let mut line = serde_json::to_string(&JsonReport {
            path: display_path,
            lines: &report.lines,
        })?;
        line.push('\n');
        Ok(line)
    }

    /// Colors every match in `line`.
    fn highlight(&self, line: &str) -> String {
        if !self.color {
            return line.to_string();
        }
        let mut output = String::with_capacity(line.len());
        let mut last = 0;
        for (start, end) in self.matcher.find_spans(line.as_bytes()) {
            output.push_str(&String::from_utf8_lossy(&line.as_bytes()[last..start]));
            let found = String::from_utf8_lossy(&line.as_bytes()[start..end]);
            output.push_str(&self.paint(&found, Paint::Removed));
            last = end;
        }
        output.push_str(&String::from_utf8_lossy(&line.as_bytes()[last..]));
        output
    }

    fn paint(&self, text: &str, paint: Paint) -> String {
        if !self.color {
            return text.to_string();
        }
        match paint {
            Paint::Path => text.magenta().to_string(),
            Paint::LineNumber => text.green().to_string(),
            Paint::Removed => text.red().bold().to_string(),
            Paint::Added => text.green().bold().to_string(),
        }
    }
}

#[derive(Clone, Copy)]
enum Paint {
    Path,
    LineNumber,
    Removed,
    Added,
}

/// How the [`Printer`] orders its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    /// Print each report as soon as it arrives.
    Streaming,
    /// Buffer everything and print in path order once the queue closes.
    Sorted,
}

/// The single writer of match reports.
///
/// Reports arrive from many workers; the printer owns the output so that
/// no two reports ever interleave.
pub struct Printer<W: Write> {
    root: PathBuf,
    mode: PrintMode,
    formatter: OutputFormatter,
    out: W,
}

impl<W: Write> Printer<W> {
    pub fn new(
        root: impl Into<PathBuf>,
        mode: PrintMode,
        formatter: OutputFormatter,
        out: W,
    ) -> Self {
        Self {
            root: root.into(),
            mode,
            formatter,
            out,
        }
    }

    /// Consumes reports until every sender is gone, then flushes.
    ///
    /// # Returns
    ///
    /// The number of reports printed and the underlying writer.
    pub fn run(mut self, reports: Receiver<MatchReport>) -> Result<(usize, W)> {
        let mut buffered: BTreeMap<String, String> = BTreeMap::new();
        let mut printed = 0;

        for report in reports.iter() {
            let display_path = relative_display(&self.root, &report.path);
            let block = self.formatter.format_report(&display_path, &report)?;
            match self.mode {
                PrintMode::Streaming => {
                    self.out.write_all(block.as_bytes())?;
                    printed += 1;
                }
                PrintMode::Sorted => {
                    buffered.insert(display_path, block);
                }
            }
        }

        for block in buffered.values() {
            self.out.write_all(block.as_bytes())?;
            printed += 1;
        }
        self.out.flush()?;
        Ok((printed, self.out))
    }
}

/// `path` relative to `root`, or as given if it is not below `root`.
pub fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::LineRecord;

    fn matcher(replacement: Option<&str>) -> Arc<Matcher> {
        Arc::new(Matcher::new("foo", replacement, false).unwrap())
    }

    fn report(path: &str, lines: Vec<LineRecord>) -> MatchReport {
        MatchReport {
            path: PathBuf::from(path),
            lines,
        }
    }

    fn found(number: u64, line: &str) -> LineRecord {
        LineRecord {
            number,
            kind: LineMatch::Found {
                line: line.to_string(),
            },
        }
    }

    #[test]
    fn test_text_format_search_mode() {
        let formatter = OutputFormatter::new(OutputFormat::Text, false, matcher(None));
        let out = formatter
            .format_report("src/a.rs", &report("/r/src/a.rs", vec![found(2, "a foo")]))
            .unwrap();
        assert_eq!(out, "src/a.rs\n2: a foo\n\n");
    }

    #[test]
    fn test_text_format_replace_mode() {
        let formatter = OutputFormatter::new(OutputFormat::Text, false, matcher(Some("bar")));
        let record = LineRecord {
            number: 3,
            kind: LineMatch::Replaced {
                before: "xfoox".to_string(),
                after: "xbarx".to_string(),
            },
        };
        let out = formatter.format_report("a.txt", &report("a.txt", vec![record])).unwrap();
        assert_eq!(out, "a.txt\n3:\n-xfoox\n+xbarx\n\n");
    }

    #[test]
    fn test_color_highlights_matches() {
        colored::control::set_override(true);
        let formatter = OutputFormatter::new(OutputFormat::Text, true, matcher(None));
        let highlighted = formatter.highlight("a foo b foo");
        assert!(highlighted.contains("\u{1b}["));
        assert!(highlighted.starts_with("a "));
    }

    #[test]
    fn test_json_format_is_one_line_per_report() {
        let formatter = OutputFormatter::new(OutputFormat::Json, false, matcher(None));
        let out = formatter
            .format_report("a.txt", &report("a.txt", vec![found(1, "foo")]))
            .unwrap();
        assert_eq!(out, "{\"path\":\"a.txt\",\"lines\":[{\"number\":1,\"line\":\"foo\"}]}\n");
    }

    #[test]
    fn test_sorted_mode_orders_by_relative_path() {
        let (tx, rx) = flume::bounded(10);
        for name in ["/root/b.txt", "/root/a/z.txt", "/root/a.txt"] {
            tx.send(report(name, vec![found(1, "foo")])).unwrap();
        }
        drop(tx);

        let formatter = OutputFormatter::new(OutputFormat::Text, false, matcher(None));
        let printer = Printer::new("/root", PrintMode::Sorted, formatter, Vec::new());
        let (printed, out) = printer.run(rx).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(printed, 3);
        let headers: Vec<&str> = out.lines().filter(|l| l.ends_with(".txt")).collect();
        assert_eq!(headers, vec!["a.txt", "a/z.txt", "b.txt"]);
    }

    #[test]
    fn test_streaming_mode_keeps_arrival_order() {
        let (tx, rx) = flume::bounded(10);
        for name in ["/root/b.txt", "/root/a.txt"] {
            tx.send(report(name, vec![found(1, "foo")])).unwrap();
        }
        drop(tx);

        let formatter = OutputFormatter::new(OutputFormat::Text, false, matcher(None));
        let printer = Printer::new("/root", PrintMode::Streaming, formatter, Vec::new());
        let (_, out) = printer.run(rx).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.find("b.txt").unwrap() < out.find("a.txt").unwrap());
    }
}
