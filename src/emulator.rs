//! Emulator process supervision.
//!
//! Spawns the configured QEMU system emulator with the guest kernel, the
//! scratch SD image, and the serial line pointed at the session's unix
//! socket. The child's stdio is a pty slave so the monitor stays reachable;
//! a console pump services it in the background, discarding whatever the
//! emulator prints and carrying the `quit` command on shutdown.
//!
//! The serial argument makes the emulator CONNECT to the socket path, so
//! the listener must already be bound when the process starts. The launch
//! path re-checks that the path exists as a socket before spawning and
//! refuses to start the child otherwise.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::pump::{chunk_channel, run_pump, ChunkSender, ConsolePty};
use crate::resource::WorkArea;
use crate::{HarnessError, Result};

/// Poll interval while waiting for the rendezvous socket to appear.
const SOCKET_POLL: Duration = Duration::from_millis(10);

/// Upper bound on the rendezvous wait. The listener is bound before launch,
/// so in practice the first poll succeeds; the cap guards against a caller
/// wiring the paths wrong.
const SOCKET_WAIT_CAP: Duration = Duration::from_secs(10);

/// A running emulator child plus its console pump.
#[derive(Debug)]
pub struct EmulatorDriver {
    child: Child,
    console_tx: ChunkSender,
    console_task: JoinHandle<()>,
    console_cancel: CancellationToken,
}

impl EmulatorDriver {
    /// Wait for the serial socket, then spawn the emulator and its console
    /// pump.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Emulator`] when the socket never appears,
    /// pty allocation fails, or the child cannot be spawned.
    pub async fn launch(
        config: &HarnessConfig,
        kernel: &Path,
        area: &WorkArea,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let socket_path = area.socket_path();
        wait_for_socket(&socket_path).await?;

        let (console, slave) = ConsolePty::open()?;
        let slave_stdin = slave.try_clone().map_err(|err| {
            HarnessError::Emulator(format!("console slave duplication failed: {err}"))
        })?;

        let mut command = Command::new(&config.qemu.binary);
        command
            .arg("-M")
            .arg(&config.qemu.machine)
            .arg("-m")
            .arg(&config.qemu.memory)
            .arg("-nographic")
            .arg("-kernel")
            .arg(kernel)
            .arg("-serial")
            .arg(format!("unix:{}", socket_path.display()))
            .arg("-drive")
            .arg(format!(
                "if=sd,file={},format=raw",
                area.disk_path().display()
            ))
            .stdin(Stdio::from(slave_stdin))
            .stdout(Stdio::from(slave))
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|err| {
            HarnessError::Emulator(format!("{} failed to spawn: {err}", config.qemu.binary))
        })?;
        info!(
            pid = child.id(),
            binary = %config.qemu.binary,
            kernel = %kernel.display(),
            "emulator started"
        );

        let (console_tx, console_rx) = chunk_channel();
        let (discard_tx, discard_rx) = chunk_channel();
        // Console output carries no protocol; dropping the receiver makes
        // the pump discard reads while the write side stays serviced.
        drop(discard_rx);

        let console_cancel = cancel.child_token();
        let console_task = tokio::spawn(run_pump(
            console,
            console_rx,
            discard_tx,
            console_cancel.clone(),
        ));

        Ok(Self {
            child,
            console_tx,
            console_task,
            console_cancel,
        })
    }

    /// Ask the emulator to quit, then enforce the grace period.
    ///
    /// Sends `quit` to the monitor, waits up to `grace` for a natural exit,
    /// and force-kills on overrun. Always reaps the child and winds down the
    /// console pump. Best effort: failures are logged, never raised.
    pub async fn shutdown(mut self, grace: Duration) {
        if self.console_tx.send(Bytes::from_static(b"quit\n")).is_err() {
            debug!("console pump already terminated");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(exit)) => {
                info!(?exit, "emulator exited");
            }
            Ok(Err(err)) => {
                warn!(%err, "error waiting for emulator");
            }
            Err(_) => {
                warn!("emulator did not exit within grace period, forcing kill");
                if let Err(err) = self.child.kill().await {
                    warn!(%err, "failed to force-kill emulator");
                }
            }
        }

        self.console_cancel.cancel();
        if let Err(err) = self.console_task.await {
            debug!(%err, "console pump join failed");
        }
    }
}

/// Wait until `path` exists and is a unix socket.
async fn wait_for_socket(path: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let deadline = tokio::time::Instant::now() + SOCKET_WAIT_CAP;
    loop {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.file_type().is_socket() {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::Emulator(format!(
                "serial socket {} never appeared",
                path.display()
            )));
        }
        tokio::time::sleep(SOCKET_POLL).await;
    }
}
