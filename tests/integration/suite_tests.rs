//! End-to-end suite runs through the runner against the mock guest.
//!
//! Each test lays out a miniature project: entry files under `src/`,
//! collaborator scripts under `scripts/fixture` and `scripts/check`, and a
//! kernel stand-in selecting the mock behavior.

use std::fs;
use std::path::Path;

use roost::runner::{run_suite, SuitePaths};
use roost::HarnessError;

use super::test_helpers::{behavior_kernel, mock_config, write_script};

struct Project {
    root: tempfile::TempDir,
    paths: SuitePaths,
}

impl Project {
    /// Lay out `src/`, `scripts/fixture/`, and `scripts/check/`.
    fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let src = root.path().join("src");
        let scripts = root.path().join("scripts");
        fs::create_dir_all(&src).expect("mkdir src");
        fs::create_dir_all(scripts.join("fixture")).expect("mkdir fixture");
        fs::create_dir_all(scripts.join("check")).expect("mkdir check");

        let paths = SuitePaths {
            src_path: src,
            root_path: root.path().to_path_buf(),
            source_path: scripts,
        };
        Self { root, paths }
    }

    fn add_entries(&self, name: &str, text: &str) {
        fs::write(self.paths.src_path.join(name), text).expect("write entries");
    }

    fn add_fixture(&self, name: &str, body: &str) {
        write_script(&self.paths.source_path.join("fixture"), name, body);
    }

    fn add_check(&self, name: &str, body: &str) {
        write_script(&self.paths.source_path.join("check"), name, body);
    }

    fn root(&self) -> &Path {
        self.root.path()
    }
}

/// Plain passing entries produce an all-pass suite.
#[tokio::test]
async fn responsive_suite_passes() {
    let project = Project::new();
    project.add_entries("basic.t", "TEST(alpha);\n\nTEST(beta);\n");
    let kernel = behavior_kernel(project.root(), "responsive");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(all_passed);
}

/// Fixture scripts run before the test with the documented environment.
#[tokio::test]
async fn fixture_runs_with_the_collaborator_environment() {
    let project = Project::new();
    project.add_entries("with_fixture.t", "/*\n$fixture record_env\n*/\nTEST(alpha);\n");
    project.add_fixture(
        "record_env",
        "#!/bin/sh\nprintf '%s' \"$TEST_NAME\" > \"$ROOT_PATH/fixture.name\"\n",
    );
    let kernel = behavior_kernel(project.root(), "responsive");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(all_passed);
    let recorded = fs::read_to_string(project.root().join("fixture.name")).expect("marker file");
    assert_eq!(recorded, "alpha", "TEST_NAME must reach the fixture");
}

/// A fixture failure aborts the whole suite with a fixture error.
#[tokio::test]
async fn failing_fixture_aborts_the_suite() {
    let project = Project::new();
    project.add_entries("with_fixture.t", "/*\n$fixture explode\n*/\nTEST(alpha);\n");
    project.add_fixture("explode", "#!/bin/sh\nexit 1\n");
    let kernel = behavior_kernel(project.root(), "responsive");
    let config = mock_config(4, 10);

    let result = run_suite(config, &project.paths, &kernel).await;

    match result {
        Err(HarnessError::Fixture(msg)) => assert!(
            msg.contains("explode"),
            "error must name the script, got: {msg}"
        ),
        other => panic!("expected Err(HarnessError::Fixture), got: {other:?}"),
    }
}

/// A check script that accepts the evidence records a pass.
#[tokio::test]
async fn passing_check_records_a_pass() {
    let project = Project::new();
    project.add_entries("with_check.t", "/*\n$check accept\n*/\nTEST(alpha);\n");
    project.add_check("accept", "#!/bin/sh\ngrep -q evidence\n");
    let kernel = behavior_kernel(project.root(), "checking");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(all_passed);
}

/// Check scripts read the evidence with LF line endings.
#[tokio::test]
async fn check_receives_normalized_evidence() {
    let project = Project::new();
    project.add_entries("with_check.t", "/*\n$check exact\n*/\nTEST(alpha);\n");
    project.add_check(
        "exact",
        "#!/bin/sh\nread line\n[ \"$line\" = \"evidence line\" ]\n",
    );
    let kernel = behavior_kernel(project.root(), "checking");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(all_passed, "CRLF evidence must arrive as plain LF");
}

/// A check script that rejects the evidence records a failure.
#[tokio::test]
async fn failing_check_records_a_failure() {
    let project = Project::new();
    project.add_entries("with_check.t", "/*\n$check reject\n*/\nTEST(alpha);\n");
    project.add_check("reject", "#!/bin/sh\nexit 1\n");
    let kernel = behavior_kernel(project.root(), "checking");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(!all_passed);
}

/// A check verdict without a `$check` directive is a recorded failure.
#[tokio::test]
async fn missing_check_directive_records_a_failure() {
    let project = Project::new();
    project.add_entries("no_check.t", "TEST(alpha);\n");
    let kernel = behavior_kernel(project.root(), "checking");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(!all_passed);
}

/// A failure verdict from the guest fails the suite without aborting it.
#[tokio::test]
async fn guest_failure_verdict_fails_the_suite() {
    let project = Project::new();
    project.add_entries("failing.t", "TEST(alpha);\n\nTEST(beta);\n");
    let kernel = behavior_kernel(project.root(), "failing");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("both tests must still run");

    assert!(!all_passed);
}

/// A `$shutdown` directive forces a respawn; the test after it still passes.
#[tokio::test]
async fn shutdown_directive_respawns_between_tests() {
    let project = Project::new();
    project.add_entries(
        "restart.t",
        "/*\n$shutdown\n*/\nTEST(alpha);\n\nTEST(beta);\n",
    );
    let kernel = behavior_kernel(project.root(), "responsive");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(all_passed, "the respawned session must serve the second test");
}

/// The stdin directive travels from the entry file to the guest.
#[tokio::test]
async fn stdin_directive_reaches_the_guest() {
    let project = Project::new();
    // The blank line keeps the payload's trailing newline inside the body.
    project.add_entries(
        "stdin.t",
        "/*\n:stdin ---\nmarco\n\n---\n*/\nTEST(alpha);\n",
    );
    let kernel = behavior_kernel(project.root(), "parrot");
    let config = mock_config(4, 10);

    let all_passed = run_suite(config, &project.paths, &kernel)
        .await
        .expect("suite run");

    assert!(all_passed);
}

/// An unknown directive stops the run before any session is booted.
#[tokio::test]
async fn invalid_directive_fails_before_boot() {
    let project = Project::new();
    project.add_entries("bad.t", "/*\n$explode now\n*/\nTEST(alpha);\n");
    let kernel = behavior_kernel(project.root(), "responsive");
    let config = mock_config(4, 10);

    let result = run_suite(config, &project.paths, &kernel).await;

    assert!(
        matches!(result, Err(HarnessError::Entries(_))),
        "validation must fail first, got: {result:?}"
    );
}
