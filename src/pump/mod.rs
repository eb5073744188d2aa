//! Generic duplex stream pump.
//!
//! A pump is ONE background task multiplexing both transfer directions of a
//! single bidirectional byte stream. It parks on readiness and on its
//! command channel, so it consumes no CPU while idle:
//!
//! - inbound: whenever the stream is readable, read one chunk (at most
//!   [`READ_CHUNK_BYTES`]) and forward it to the inbound channel;
//! - outbound: whenever chunks are pending and the stream is writable,
//!   write the front chunk, re-queueing any unwritten tail so byte order is
//!   preserved;
//! - wake-up: enqueueing on the outbound channel is itself the wake-up; the
//!   select loop observes the arrival and starts watching writability.
//!
//! End of stream (`Ok(0)`), a read/write error (connection reset, hangup),
//! or cancellation ends the task cleanly. Errors are terminal for the pump:
//! the stream's owner decides whether to respawn the whole session.
//!
//! Submodules:
//! - `pty`: [`ConsolePty`] — non-blocking pseudo-terminal endpoint for the
//!   emulator console, usable as a [`Duplex`].

pub mod pty;

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use pty::ConsolePty;

/// Maximum bytes moved per read readiness cycle.
pub const READ_CHUNK_BYTES: usize = 4096;

/// Sender half of a pump byte channel.
pub type ChunkSender = mpsc::UnboundedSender<Bytes>;

/// Receiver half of a pump byte channel.
pub type ChunkReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Create an unbounded chunk channel pair.
#[must_use]
pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::unbounded_channel()
}

/// Readiness-driven bidirectional byte stream.
///
/// Each operation combines one readiness wait with one non-blocking transfer
/// attempt. The combination matters: for file descriptors with edge-cached
/// readiness the `WouldBlock` result must clear the cached state before the
/// next wait, which only the implementation holding the guard can do.
/// Futures returned here must be cancel-safe: dropping them between
/// readiness and the transfer attempt must not lose bytes.
pub trait Duplex: Send + Sync {
    /// Wait until readable, then read once into `buf`. `Ok(0)` means the
    /// peer closed the stream.
    fn read_chunk<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + 'a>>;

    /// Wait until writable, then write once from `chunk`. The write may be
    /// partial; the returned count says how much was accepted.
    fn write_chunk<'a>(
        &'a self,
        chunk: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + 'a>>;
}

impl Duplex for UnixStream {
    fn read_chunk<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                self.readable().await?;
                match self.try_read(buf) {
                    Ok(n) => return Ok(n),
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(err),
                }
            }
        })
    }

    fn write_chunk<'a>(
        &'a self,
        chunk: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                self.writable().await?;
                match self.try_write(chunk) {
                    Ok(n) => return Ok(n),
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(err),
                }
            }
        })
    }
}

/// Drive one stream until end of input, error, or cancellation.
///
/// `outbound` carries caller-enqueued chunks toward the stream; `inbound`
/// carries stream reads toward the caller. If the inbound receiver has been
/// dropped, reads are discarded and the write side stays serviced — the
/// emulator console works exactly this way.
pub async fn run_pump<S: Duplex>(
    stream: S,
    mut outbound: ChunkReceiver,
    inbound: ChunkSender,
    cancel: CancellationToken,
) {
    let mut pending: VecDeque<Bytes> = VecDeque::new();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let mut queue_open = true;

    loop {
        // Cheap refcount clone; the select arms must not borrow `pending`.
        let head = pending.front().cloned();

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("pump cancelled");
                break;
            }

            queued = outbound.recv(), if queue_open => match queued {
                Some(chunk) => pending.push_back(chunk),
                None => queue_open = false,
            },

            written = write_head(&stream, head.as_ref()) => match written {
                Ok(n) => {
                    if let Some(front) = pending.front_mut() {
                        if n >= front.len() {
                            pending.pop_front();
                        } else {
                            let rest = front.slice(n..);
                            *front = rest;
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, "pump write failed");
                    break;
                }
            },

            read = stream.read_chunk(&mut buf) => match read {
                Ok(0) => {
                    debug!("pump stream reached end of input");
                    break;
                }
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    if inbound.send(chunk).is_err() {
                        trace!(bytes = n, "inbound receiver gone; discarding chunk");
                    }
                }
                Err(err) => {
                    debug!(error = %err, "pump read failed");
                    break;
                }
            },
        }
    }
}

/// Write the queue head if there is one; otherwise stay pending so the
/// select loop ignores the write arm until a chunk arrives.
async fn write_head<S: Duplex>(stream: &S, head: Option<&Bytes>) -> io::Result<usize> {
    match head {
        Some(chunk) => stream.write_chunk(chunk).await,
        None => std::future::pending().await,
    }
}
