//! Ephemeral per-session work area.
//!
//! Each session gets a private temp directory holding the serial rendezvous
//! socket and a freshly provisioned scratch disk image for the guest's SD
//! card. Provisioning shells out to the configured image and format tools;
//! any tool failure aborts session construction, because a guest booted
//! against a broken disk makes fixture and check behavior meaningless.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::DiskConfig;
use crate::{HarnessError, Result};

/// Socket file name inside the work area.
const SOCKET_NAME: &str = "sock";

/// Disk image file name inside the work area.
const DISK_NAME: &str = "disk.img";

/// Temp directory with the rendezvous socket path and scratch disk image.
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    /// Create the directory and provision the disk image.
    ///
    /// Runs `image_tool create -f raw <disk> <size>` followed by
    /// `format_tool -B <block_size> <disk>`. Tool stdout is silenced;
    /// stderr passes through for operator visibility.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Resource`] when the directory cannot be
    /// created or either tool fails to spawn or exits non-zero.
    pub async fn provision(disk: &DiskConfig) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("roost")
            .tempdir()
            .map_err(|err| HarnessError::Resource(format!("temp dir creation failed: {err}")))?;
        let area = Self { dir };
        let disk_path = area.disk_path();

        run_tool(
            &disk.image_tool,
            Command::new(&disk.image_tool)
                .args(["create", "-f", "raw"])
                .arg(&disk_path)
                .arg(&disk.size),
        )
        .await?;

        run_tool(
            &disk.format_tool,
            Command::new(&disk.format_tool)
                .arg("-B")
                .arg(disk.block_size.to_string())
                .arg(&disk_path),
        )
        .await?;

        debug!(dir = %area.dir.path().display(), "work area provisioned");
        Ok(area)
    }

    /// Work area directory; collaborator scripts run with this as cwd.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path where the guest listener binds and the emulator connects.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join(SOCKET_NAME)
    }

    /// Path of the scratch disk image attached to the guest.
    #[must_use]
    pub fn disk_path(&self) -> PathBuf {
        self.dir.path().join(DISK_NAME)
    }

    /// Remove the directory. Best effort: failures are logged, not raised.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), error = %err, "work area removal failed");
        }
    }
}

/// Run one provisioning tool to completion.
async fn run_tool(tool: &str, command: &mut Command) -> Result<()> {
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|err| HarnessError::Resource(format!("{tool} failed to spawn: {err}")))?
        .wait()
        .await
        .map_err(|err| HarnessError::Resource(format!("{tool} did not run to completion: {err}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(HarnessError::Resource(format!("{tool} exited with {status}")))
    }
}
