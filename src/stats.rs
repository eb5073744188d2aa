//! Pass/fail bookkeeping and product output.
//!
//! Guest test output and the end-of-suite summary are product output, not
//! diagnostics, so they flow through one explicit writer instead of the
//! logging layer. The writer is generic to keep the whole surface testable
//! against an in-memory buffer.

use std::io::Write;

use tracing::debug;

use crate::Result;

/// Recorder for test verdicts plus the passthrough output stream.
#[derive(Debug)]
pub struct Statistics<W: Write> {
    writer: W,
    passed: u32,
    failures: Vec<(String, String)>,
}

impl<W: Write> Statistics<W> {
    /// Create a recorder writing product output to `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            passed: 0,
            failures: Vec::new(),
        }
    }

    /// Record a pass. A test driven through several check scripts records
    /// once per script.
    pub fn succeed(&mut self, name: &str) {
        debug!(test = name, "pass recorded");
        self.passed += 1;
    }

    /// Record a failure with its reason.
    pub fn fail(&mut self, name: &str, reason: &str) {
        debug!(test = name, reason, "failure recorded");
        self.failures.push((name.to_owned(), reason.to_owned()));
    }

    /// Write guest output verbatim, no trailing newline added.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarnessError::Io`] when the writer fails.
    pub fn print_output(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write the end-of-suite summary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarnessError::Io`] when the writer fails.
    pub fn report(&mut self) -> Result<()> {
        writeln!(self.writer)?;
        for (name, reason) in &self.failures {
            writeln!(self.writer, "FAIL {name}: {reason}")?;
        }
        let total = self.passed + u32::try_from(self.failures.len()).unwrap_or(u32::MAX);
        writeln!(self.writer, "{total} tests, {} failures", self.failures.len())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Whether no failure has been recorded.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}
