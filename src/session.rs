//! Guest session lifecycle.
//!
//! A session owns everything one booted guest needs: the ephemeral work
//! area, the serial listener and its pump task, the emulator child with its
//! console pump, and the message endpoint. Degraded sessions are never
//! repaired in place — [`Session::close`] consumes the session and
//! [`Session::respawn`] boots a fresh one, which is why `close` takes
//! `self` by value.
//!
//! Unresponsiveness is a result, not an error: when the guest misses the
//! execution deadline (or its stream dies), [`Session::exec_run`] returns a
//! synthesized failure carrying whatever unparsed bytes the endpoint had
//! accumulated, and the session is marked not ready.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::emulator::EmulatorDriver;
use crate::protocol::{GuestEndpoint, Message};
use crate::pump::{chunk_channel, run_pump, ChunkReceiver, ChunkSender};
use crate::resource::WorkArea;
use crate::{HarnessError, Result};

/// First message an idle, healthy guest sends.
const READY_NAME: &str = "please";

/// Result name used when synthesizing an unresponsive failure.
const FAILURE_NAME: &str = "failure";

/// Output name the guest uses for captured test output.
const ECHO_NAME: &str = "echo";

/// Body of a synthesized unresponsive failure.
const UNRESPONSIVE_REASON: &str = "(unresponsive)";

/// Outcome of one guest test execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Verdict frame: `success`, `failure`, or `check`.
    pub result: Message,
    /// Captured output frame, normally named `echo`.
    pub output: Message,
}

/// One booted guest and its plumbing.
#[derive(Debug)]
pub struct Session {
    id: String,
    config: Arc<HarnessConfig>,
    kernel: PathBuf,
    area: WorkArea,
    endpoint: Option<GuestEndpoint>,
    driver: Option<EmulatorDriver>,
    guest_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    ready: bool,
}

impl Session {
    /// Validate the kernel image and provision the work area.
    ///
    /// The guest is not started yet; call [`Session::run`] next.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when the kernel image does not
    /// exist, or [`HarnessError::Resource`] when provisioning fails.
    pub async fn create(config: Arc<HarnessConfig>, kernel: impl Into<PathBuf>) -> Result<Self> {
        let kernel = kernel.into();
        if !kernel.is_file() {
            return Err(HarnessError::Config(format!(
                "kernel image {} not found",
                kernel.display()
            )));
        }

        let area = WorkArea::provision(&config.disk).await?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            config,
            kernel,
            area,
            endpoint: None,
            driver: None,
            guest_task: None,
            cancel: CancellationToken::new(),
            ready: false,
        })
    }

    /// Bind the serial listener, start both pumps, launch the emulator, and
    /// perform the readiness handshake.
    ///
    /// The listener is bound before the emulator is spawned because the
    /// emulator connects to the socket path as a client. A handshake that
    /// times out or yields anything but the idle marker leaves the session
    /// not ready without raising.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Emulator`] when the session is already
    /// running, the listener cannot be bound, or the emulator fails to
    /// launch.
    pub async fn run(&mut self) -> Result<()> {
        if self.driver.is_some() {
            return Err(HarnessError::Emulator("session already running".into()));
        }

        let socket_path = self.area.socket_path();
        let listener = UnixListener::bind(&socket_path).map_err(|err| {
            HarnessError::Emulator(format!("bind {} failed: {err}", socket_path.display()))
        })?;

        let (to_guest_tx, to_guest_rx) = chunk_channel();
        let (from_guest_tx, from_guest_rx) = chunk_channel();
        self.endpoint = Some(GuestEndpoint::new(to_guest_tx, from_guest_rx));
        self.guest_task = Some(tokio::spawn(run_guest_pump(
            listener,
            to_guest_rx,
            from_guest_tx,
            self.cancel.child_token(),
        )));

        let driver =
            EmulatorDriver::launch(&self.config, &self.kernel, &self.area, &self.cancel).await?;
        self.driver = Some(driver);

        self.check_is_ready(self.config.timeouts.boot()).await;
        info!(session_id = %self.id, ready = self.ready, "session started");
        Ok(())
    }

    /// Whether the guest last reported itself idle and healthy.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Work area directory; collaborator scripts run with this as cwd.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.area.dir()
    }

    /// Execute one guest test and collect its outcome.
    ///
    /// Sends `$run <name>` followed by the optional stdin payload, then
    /// waits for the output and result frames under the execution deadline.
    /// On success the readiness check runs once more so the caller can see
    /// whether the guest returned to its idle loop. A deadline miss or a
    /// dead stream yields a synthesized `failure (unresponsive)` response —
    /// never an error — and marks the session not ready.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Protocol`] when the session was never
    /// started or the send side of the stream is already closed.
    pub async fn exec_run(&mut self, name: &str, stdin_data: Option<&str>) -> Result<Response> {
        let deadline = self.config.timeouts.exec();
        let Some(endpoint) = self.endpoint.as_mut() else {
            return Err(HarnessError::Protocol("session is not running".into()));
        };

        endpoint.send_line(&format!("$run {name}"))?;
        if let Some(data) = stdin_data {
            endpoint.push_raw(data)?;
        }
        debug!(session_id = %self.id, test = name, "test dispatched");

        let outcome = tokio::time::timeout(deadline, receive_exchange(endpoint)).await;
        match outcome {
            Ok(Ok((output, result))) => {
                self.check_is_ready(deadline).await;
                Ok(Response { result, output })
            }
            Ok(Err(err)) => {
                warn!(session_id = %self.id, test = name, %err, "guest stream failed mid-test");
                Ok(self.unresponsive_response())
            }
            Err(_) => {
                warn!(session_id = %self.id, test = name, "guest missed the execution deadline");
                Ok(self.unresponsive_response())
            }
        }
    }

    /// Tear everything down, best effort.
    ///
    /// Safe to call however far `run` got: asks the emulator to quit (grace
    /// period, then kill), cancels and joins the guest pump, and releases
    /// the work area.
    pub async fn close(self) {
        let Self {
            id,
            config,
            area,
            endpoint,
            driver,
            guest_task,
            cancel,
            ..
        } = self;

        drop(endpoint);
        if let Some(driver) = driver {
            driver.shutdown(config.timeouts.shutdown_grace()).await;
        }
        cancel.cancel();
        if let Some(task) = guest_task {
            if let Err(err) = task.await {
                debug!(session_id = %id, %err, "guest pump join failed");
            }
        }
        area.release();
        debug!(session_id = %id, "session closed");
    }

    /// Replace a degraded session with a fresh one.
    ///
    /// # Errors
    ///
    /// Returns any error from creating or starting the replacement.
    pub async fn respawn(
        config: Arc<HarnessConfig>,
        kernel: impl Into<PathBuf>,
        old: Session,
    ) -> Result<Session> {
        info!(session_id = %old.id, "respawning session");
        old.close().await;

        let mut fresh = Session::create(config, kernel).await?;
        if let Err(err) = fresh.run().await {
            fresh.close().await;
            return Err(err);
        }
        Ok(fresh)
    }

    /// Receive one message and record whether it is the idle marker.
    async fn check_is_ready(&mut self, deadline: Duration) {
        let Some(endpoint) = self.endpoint.as_mut() else {
            self.ready = false;
            return;
        };

        match tokio::time::timeout(deadline, endpoint.recv()).await {
            Ok(Ok(message)) => {
                self.ready = message.name == READY_NAME;
                if !self.ready {
                    warn!(
                        session_id = %self.id,
                        name = %message.name,
                        "expected idle marker, got something else"
                    );
                }
            }
            Ok(Err(err)) => {
                self.ready = false;
                warn!(session_id = %self.id, %err, "stream failed during readiness check");
            }
            Err(_) => {
                self.ready = false;
                warn!(session_id = %self.id, "readiness check timed out");
            }
        }
    }

    /// Build the stand-in response for a guest that stopped answering.
    fn unresponsive_response(&mut self) -> Response {
        self.ready = false;
        let unparsed = self
            .endpoint
            .as_ref()
            .map_or_else(String::new, GuestEndpoint::unparsed_text);
        Response {
            result: Message::with_body(FAILURE_NAME, UNRESPONSIVE_REASON),
            output: Message::with_body(ECHO_NAME, unparsed),
        }
    }
}

/// Accept the emulator's single serial connection, then pump it.
async fn run_guest_pump(
    listener: UnixListener,
    outbound: ChunkReceiver,
    inbound: ChunkSender,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        () = cancel.cancelled() => {
            debug!("guest listener cancelled before accept");
            return;
        }
        accepted = listener.accept() => match accepted {
            Ok((stream, _addr)) => stream,
            Err(err) => {
                warn!(%err, "serial accept failed");
                return;
            }
        }
    };

    debug!("emulator connected to serial socket");
    run_pump(stream, outbound, inbound, cancel).await;
}

/// Receive the output frame, then the result frame.
async fn receive_exchange(endpoint: &mut GuestEndpoint) -> Result<(Message, Message)> {
    let output = endpoint.recv().await?;
    let result = endpoint.recv().await?;
    Ok((output, result))
}
