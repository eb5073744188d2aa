//! Suite orchestration.
//!
//! Drives each entry through a session: fixture scripts first, then the
//! guest execution, then verdict handling with optional check scripts.
//! Collaborator scripts (`<source_path>/fixture/<name>` and
//! `<source_path>/check/<name>`) run with the session work area as their
//! working directory and receive `TEST_NAME`, `BUILD_PATH`, `ROOT_PATH`,
//! and `SOURCE_PATH` in the environment.
//!
//! A session that is no longer ready after a test, or a test carrying the
//! `shutdown` directive, causes a respawn before the next test. Fixture
//! failures abort the whole suite; check failures are ordinary recorded
//! failures.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::entries::{self, Suite};
use crate::protocol::Message;
use crate::session::{Response, Session};
use crate::stats::Statistics;
use crate::{HarnessError, Result};

/// Filesystem roots handed to collaborator scripts.
#[derive(Debug, Clone)]
pub struct SuitePaths {
    /// Directory scanned for `*.t` entry files.
    pub src_path: PathBuf,
    /// Project root exported as `ROOT_PATH`.
    pub root_path: PathBuf,
    /// Script root exported as `SOURCE_PATH`; holds `fixture/` and `check/`.
    pub source_path: PathBuf,
}

/// One entry being driven through a session.
pub struct TestRun<'a, W: Write> {
    name: &'a str,
    messages: &'a [Message],
    paths: &'a SuitePaths,
    stats: &'a mut Statistics<W>,
}

impl<'a, W: Write> TestRun<'a, W> {
    /// Bind an entry to the shared paths and recorder.
    pub fn new(
        name: &'a str,
        messages: &'a [Message],
        paths: &'a SuitePaths,
        stats: &'a mut Statistics<W>,
    ) -> Self {
        Self {
            name,
            messages,
            paths,
            stats,
        }
    }

    /// Fixtures, execution, verdict.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Fixture`] when a fixture script fails,
    /// [`HarnessError::Entries`] for an invalid script name, or an I/O
    /// error from running a check script.
    pub async fn run(&mut self, session: &mut Session) -> Result<()> {
        info!(test = self.name, "running test");
        let work_dir = session.work_dir().to_path_buf();

        self.prepare_fixtures(&work_dir).await?;
        let response = session.exec_run(self.name, self.stdin_data()).await?;
        self.handle_response(&work_dir, &response).await
    }

    /// Whether this entry demands a fresh session afterwards.
    #[must_use]
    pub fn shutdown_required(&self) -> bool {
        self.messages.iter().any(|m| m.name == "shutdown")
    }

    fn disabled_echo_on_check(&self) -> bool {
        self.messages.iter().any(|m| m.name == "disable_echo_on_check")
    }

    fn stdin_data(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.name == "stdin")
            .and_then(|m| m.body.as_deref())
    }

    async fn prepare_fixtures(&self, work_dir: &Path) -> Result<()> {
        for message in self.messages.iter().filter(|m| m.name == "fixture") {
            self.dispatch_fixture(work_dir, message.body_text()).await?;
        }
        Ok(())
    }

    async fn handle_response(&mut self, work_dir: &Path, response: &Response) -> Result<()> {
        let output = &response.output;
        if output.name != "echo" {
            warn!(name = %output.name, "unknown message");
            return Ok(());
        }

        match response.result.name.as_str() {
            "success" => self.stats.succeed(self.name),
            "failure" => self.stats.fail(self.name, response.result.body_text()),
            "check" => {
                self.check_evidence(work_dir, response).await?;
                if self.disabled_echo_on_check() {
                    return Ok(());
                }
            }
            other => warn!(name = %other, "unknown message"),
        }

        self.stats.print_output(output.body_text())?;
        Ok(())
    }

    async fn check_evidence(&mut self, work_dir: &Path, response: &Response) -> Result<()> {
        let names: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.name == "check")
            .map(|m| m.body_text().to_owned())
            .collect();

        if names.is_empty() {
            self.stats.fail(self.name, "($check not found)");
            return Ok(());
        }

        for name in &names {
            self.dispatch_check(work_dir, name, response.output.body_text())
                .await?;
        }
        Ok(())
    }

    async fn dispatch_fixture(&self, work_dir: &Path, name: &str) -> Result<()> {
        validate_script_name(name)?;
        let script = self.paths.source_path.join("fixture").join(name);

        let mut command = Command::new(&script);
        self.collaborator_env(&mut command)?;
        let status = command
            .current_dir(work_dir)
            .status()
            .await
            .map_err(|err| {
                HarnessError::Fixture(format!("{} failed to start: {err}", script.display()))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(HarnessError::Fixture(format!(
                "fixture error: {}",
                script.display()
            )))
        }
    }

    async fn dispatch_check(&mut self, work_dir: &Path, name: &str, evidence: &str) -> Result<()> {
        validate_script_name(name)?;
        let script = self.paths.source_path.join("check").join(name);

        let mut command = Command::new(&script);
        self.collaborator_env(&mut command)?;
        let mut child = command
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                HarnessError::Io(format!("{} failed to start: {err}", script.display()))
            })?;

        // The guest's UART doubles newlines into CRLF; scripts get plain LF.
        let normalized = evidence.replace("\r\n", "\n");
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(normalized.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;

        if output.status.success() {
            self.stats.succeed(self.name);
        } else {
            self.stats.fail(self.name, "(on check)");
        }
        self.stats
            .print_output(&String::from_utf8_lossy(&output.stdout))?;
        self.stats
            .print_output(&String::from_utf8_lossy(&output.stderr))?;
        Ok(())
    }

    fn collaborator_env(&self, command: &mut Command) -> Result<()> {
        let build_path = std::env::current_dir()?;
        command
            .env("TEST_NAME", self.name)
            .env("BUILD_PATH", build_path)
            .env("ROOT_PATH", &self.paths.root_path)
            .env("SOURCE_PATH", &self.paths.source_path);
        Ok(())
    }
}

/// Load the suite, boot a session, run every entry, report, tear down.
///
/// Returns whether every recorded verdict was a pass.
///
/// # Errors
///
/// Returns entry loading/validation errors, session boot errors, and any
/// fixture or I/O failure raised while driving tests. The session is closed
/// on every path once it was created.
pub async fn run_suite(
    config: Arc<HarnessConfig>,
    paths: &SuitePaths,
    kernel: &Path,
) -> Result<bool> {
    let suite = entries::load_suite(&paths.src_path)?;
    info!(
        files = suite.files.len(),
        tests = suite.entries.len(),
        "suite loaded"
    );

    let mut stats = Statistics::new(std::io::stdout());
    let mut session = Session::create(Arc::clone(&config), kernel).await?;
    if let Err(err) = session.run().await {
        session.close().await;
        return Err(err);
    }

    let mut slot = Some(session);
    let outcome = drive_entries(&config, paths, kernel, &suite, &mut slot, &mut stats).await;
    if let Some(session) = slot.take() {
        session.close().await;
    }
    outcome?;
    Ok(stats.all_passed())
}

async fn drive_entries<W: Write>(
    config: &Arc<HarnessConfig>,
    paths: &SuitePaths,
    kernel: &Path,
    suite: &Suite,
    slot: &mut Option<Session>,
    stats: &mut Statistics<W>,
) -> Result<()> {
    for (index, entry) in suite.entries.iter().enumerate() {
        let Some(session) = slot.as_mut() else { break };

        let mut test = TestRun::new(&entry.name, &entry.messages, paths, stats);
        test.run(session).await?;

        let respawn_needed = !session.ready() || test.shutdown_required();
        let more_tests = index + 1 < suite.entries.len();
        if respawn_needed && more_tests {
            if let Some(old) = slot.take() {
                *slot = Some(Session::respawn(Arc::clone(config), kernel, old).await?);
            }
        }
    }

    stats.report()?;
    Ok(())
}

/// Collaborator script names come from directive bodies; constrain them to
/// a single path component.
fn validate_script_name(name: &str) -> Result<()> {
    let pattern = Regex::new(r"\A[A-Za-z0-9_]+\z")
        .map_err(|err| HarnessError::Entries(format!("script name pattern invalid: {err}")))?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(HarnessError::Entries(format!(
            "invalid script name: {name:?}"
        )))
    }
}
