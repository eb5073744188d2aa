//! Test entry discovery and parsing.
//!
//! Entry files (`*.t`) are C sources of a restricted shape: block comments
//! carrying harness directives, `TEST(name);` registration lines, and blank
//! lines — nothing else. Directives inside a comment block use the same
//! frame grammar as the serial line, with LF endings:
//!
//! ```text
//! /*
//! $fixture setup_disk
//! :stdin ---
//! hello
//! ---
//! */
//! TEST(echo_hello);
//! ```
//!
//! A block whose text contains a line starting with `copyright` (any case)
//! is discarded wholesale, so license headers do not need escaping.
//! Directive messages accumulate across consecutive blocks and attach to
//! the next `TEST` line.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use regex::Regex;
use tokio_util::codec::Decoder;

use crate::protocol::{Message, MessageCodec, LF};
use crate::{HarnessError, Result};

/// Directive names a test entry may carry.
pub const VALID_DIRECTIVES: [&str; 5] = [
    "stdin",
    "fixture",
    "check",
    "disable_echo_on_check",
    "shutdown",
];

/// One registered guest test and its directives, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
    /// Guest test function name.
    pub name: String,
    /// Directive messages attached to the test.
    pub messages: Vec<Message>,
}

/// All discovered entry files and their merged, validated entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    /// Entry files in discovery order.
    pub files: Vec<PathBuf>,
    /// Entries in definition order; a redefinition keeps the first position.
    pub entries: Vec<TestEntry>,
}

/// Discover, parse, merge, and validate all entries under `src_path`.
///
/// # Errors
///
/// Returns [`HarnessError::Entries`] for unreadable files, malformed entry
/// file lines, unparsable directive text, or unknown directive names.
pub fn load_suite(src_path: &Path) -> Result<Suite> {
    let files = discover_entry_files(src_path)?;
    let mut entries: Vec<TestEntry> = Vec::new();

    for path in &files {
        let text = std::fs::read_to_string(path)
            .map_err(|err| HarnessError::Entries(format!("{}: {err}", path.display())))?;
        let parsed = parse_entries(&text)
            .map_err(|err| HarnessError::Entries(format!("{}: {err}", path.display())))?;

        for entry in parsed {
            if let Some(existing) = entries.iter_mut().find(|e| e.name == entry.name) {
                existing.messages = entry.messages;
            } else {
                entries.push(entry);
            }
        }
    }

    validate_entries(&entries)?;
    Ok(Suite { files, entries })
}

/// Expand `<src_path>/**/*.t`, alphabetically.
///
/// # Errors
///
/// Returns [`HarnessError::Entries`] when the pattern cannot be built or a
/// matched path cannot be read.
pub fn discover_entry_files(src_path: &Path) -> Result<Vec<PathBuf>> {
    let pattern = src_path.join("**/*.t");
    let pattern = pattern.to_string_lossy();

    let mut files = Vec::new();
    let matches = glob::glob(&pattern)
        .map_err(|err| HarnessError::Entries(format!("bad entry pattern: {err}")))?;
    for path in matches {
        let path =
            path.map_err(|err| HarnessError::Entries(format!("unreadable entry path: {err}")))?;
        files.push(path);
    }
    Ok(files)
}

/// Parse one entry file's text into entries.
///
/// # Errors
///
/// Returns [`HarnessError::Entries`] for a line that is neither a `TEST`
/// registration, a comment delimiter, nor blank, and for directive text the
/// framer cannot fully consume.
pub fn parse_entries(text: &str) -> Result<Vec<TestEntry>> {
    let test_line = compile(r"^TEST\(([A-Za-z0-9_]+)\);$")?;
    let copyright = compile(r"(?im)^copyright")?;

    let mut scanner = EntryScanner::new();
    for line in text.lines() {
        scanner.feed(line, &test_line, &copyright)?;
    }
    Ok(scanner.entries)
}

/// Render the C registration table for the kernel build.
///
/// One `#include` per entry file, then the `test_entries[]` array with a
/// null sentinel.
#[must_use]
pub fn render_entry_table(suite: &Suite) -> String {
    let mut out = String::new();
    for file in &suite.files {
        let _ = writeln!(out, "#include \"{}\"", file.display());
    }
    out.push('\n');
    out.push_str("struct test_entry test_entries[] = {\n");
    for entry in &suite.entries {
        let _ = writeln!(out, "  TEST_ENTRY({}),", entry.name);
    }
    out.push_str("  TEST_ENTRY_NULL,\n};\n");
    out
}

/// Reject entries carrying unknown directive names.
fn validate_entries(entries: &[TestEntry]) -> Result<()> {
    for entry in entries {
        let invalid: Vec<&str> = entry
            .messages
            .iter()
            .map(|message| message.name.as_str())
            .filter(|name| !VALID_DIRECTIVES.contains(name))
            .collect();

        if !invalid.is_empty() {
            return Err(HarnessError::Entries(format!(
                "TEST({}) has invalid messages: {invalid:?}",
                entry.name
            )));
        }
    }
    Ok(())
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|err| HarnessError::Entries(format!("entry pattern {pattern:?} invalid: {err}")))
}

enum ScanState {
    Function,
    Comment,
}

/// Line-by-line two-state scanner for one entry file.
struct EntryScanner {
    state: ScanState,
    comment: String,
    pending: Vec<Message>,
    entries: Vec<TestEntry>,
}

impl EntryScanner {
    fn new() -> Self {
        Self {
            state: ScanState::Function,
            comment: String::new(),
            pending: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str, test_line: &Regex, copyright: &Regex) -> Result<()> {
        match self.state {
            ScanState::Function => self.on_function(line, test_line),
            ScanState::Comment => self.on_comment(line, copyright),
        }
    }

    fn on_function(&mut self, line: &str, test_line: &Regex) -> Result<()> {
        if let Some(captures) = test_line.captures(line) {
            self.entries.push(TestEntry {
                name: captures[1].to_owned(),
                messages: std::mem::take(&mut self.pending),
            });
            return Ok(());
        }

        match line {
            "/*" => {
                self.state = ScanState::Comment;
                Ok(())
            }
            "" => Ok(()),
            other => Err(HarnessError::Entries(format!(
                "unexpected line {other:?}"
            ))),
        }
    }

    fn on_comment(&mut self, line: &str, copyright: &Regex) -> Result<()> {
        if line != "*/" {
            self.comment.push_str(line);
            self.comment.push('\n');
            return Ok(());
        }

        if copyright.is_match(&self.comment) {
            self.comment.clear();
        }

        let mut buf = BytesMut::from(self.comment.as_bytes());
        let mut codec = MessageCodec::new(LF);
        while let Some(message) = codec.decode(&mut buf)? {
            self.pending.push(message);
        }
        if !buf.is_empty() {
            return Err(HarnessError::Entries(format!(
                "unparsed directive text {:?}",
                String::from_utf8_lossy(&buf)
            )));
        }

        self.comment.clear();
        self.state = ScanState::Function;
        Ok(())
    }
}
